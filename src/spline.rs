// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Spherical spline basis functions (Wang & Dahlen, 1995).
//!
//! Each basis function is a compactly supported bump centered on a grid
//! point. Its shape depends only on the angular distance `delta` from the
//! center, normalized by the half-width `db` of the support:
//!
//! ```text
//! r   = delta / db
//! dif = r - 1
//!
//! outside       dif > 1              f = 0
//! outer ring    0 <= dif <= 1        f = ((-dif/4 + 3/4) dif - 3/4) dif + 1/4
//! inner circle  -1 + eps < dif < 0   f = (3r/4 - 3/2) r^2 + 1
//! center        dif <= -1 + eps      f = 1
//! ```
//!
//! Output columns, in order: `f`, `df/dphi`, `df/dtheta`, `laplacian(f)`, `|grad f|`.

use ndarray::{Array1, Array2};

use crate::core::{GeoPoint, MAX_SCALE};
use crate::error::{Result, TomoError};

/// Maximum number of output columns.
pub const MAX_COLUMNS: usize = 5;

/// Column holding the Laplacian.
const LAPLACIAN: usize = 3;

/// Region of the spline support a query point falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Beyond the support; contributes nothing.
    Outside,
    /// Cubic piece, `0 <= dif <= 1`.
    OuterRing,
    /// Quadratic piece, `-1 + eps < dif < 0`.
    InnerCircle,
    /// On the center point, where the derivatives are singular.
    Center,
}

/// Number of query points in each region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegionCounts {
    /// Points outside the support.
    pub outside: usize,
    /// Points in the outer ring.
    pub outer_ring: usize,
    /// Points in the inner circle.
    pub inner_circle: usize,
    /// Points on the center.
    pub center: usize,
}

impl RegionCounts {
    fn add(&mut self, region: Region) {
        match region {
            Region::Outside => self.outside += 1,
            Region::OuterRing => self.outer_ring += 1,
            Region::InnerCircle => self.inner_circle += 1,
            Region::Center => self.center += 1,
        }
    }

    /// Sum over all four regions.
    pub fn total(&self) -> usize {
        self.outside + self.outer_ring + self.inner_circle + self.center
    }
}

/// Support geometry shared by every basis function of one scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplineGeometry {
    /// Scale `q`.
    pub scale: u32,
    /// Icosahedral subdivision angle in radians.
    pub base: f64,
    /// Support half-width `base / 2^q` in radians.
    pub db: f64,
    /// Tolerance deciding whether a point sits on the center.
    pub zeps: f64,
}

impl SplineGeometry {
    /// Geometry for scale `q`.
    ///
    /// # Errors
    /// Returns `InvalidScale` if `scale > 10`.
    pub fn new(scale: u32) -> Result<Self> {
        if scale > MAX_SCALE {
            return Err(TomoError::InvalidScale(scale));
        }
        let c72 = 72.0_f64.to_radians().cos();
        let base = (c72 / (1.0 - c72)).acos();
        let nf = f64::from(1u32 << scale);
        Ok(SplineGeometry {
            scale,
            base,
            db: base / nf,
            // empirical tolerance
            zeps: 1e-3 * base,
        })
    }

    /// Angular radius (radians) beyond which every basis function is zero.
    pub fn support_radius(&self) -> f64 {
        2.0 * self.db
    }

    /// Region for a normalized offset `dif = delta / db - 1`. `None` for NaN.
    pub fn classify(&self, dif: f64) -> Option<Region> {
        if dif > 1.0 {
            Some(Region::Outside)
        } else if (0.0..=1.0).contains(&dif) {
            Some(Region::OuterRing)
        } else if dif > -1.0 + self.zeps && dif < 0.0 {
            Some(Region::InnerCircle)
        } else if dif <= -1.0 + self.zeps {
            Some(Region::Center)
        } else {
            None
        }
    }
}

/// Query points pre-converted to spherical angles, shared by every basis
/// function evaluated over them.
#[derive(Debug, Clone)]
pub struct QueryPoints {
    phi: Vec<f64>,
    cos_theta: Vec<f64>,
    sin_theta: Vec<f64>,
}

impl QueryPoints {
    /// Convert longitude/latitude arrays (degrees).
    ///
    /// Values are not range checked; non-finite values surface later as a
    /// partition failure.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the arrays differ in length.
    pub fn new(lons: &[f64], lats: &[f64]) -> Result<Self> {
        if lons.len() != lats.len() {
            return Err(TomoError::ShapeMismatch {
                expected: vec![lons.len()],
                got: vec![lats.len()],
            });
        }
        Ok(Self::convert(lons.iter().copied(), lats.iter().copied()))
    }

    /// Convert a slice of points.
    pub fn from_points(points: &[GeoPoint]) -> Self {
        Self::convert(points.iter().map(|p| p.lon), points.iter().map(|p| p.lat))
    }

    fn convert(lons: impl Iterator<Item = f64>, lats: impl Iterator<Item = f64>) -> Self {
        let phi = lons.map(f64::to_radians).collect();
        let (cos_theta, sin_theta) = lats
            .map(|lat| {
                let th = (90.0 - lat).to_radians();
                (th.cos(), th.sin())
            })
            .unzip();
        QueryPoints {
            phi,
            cos_theta,
            sin_theta,
        }
    }

    /// Number of points.
    pub fn len(&self) -> usize {
        self.phi.len()
    }

    /// True if there are no points.
    pub fn is_empty(&self) -> bool {
        self.phi.is_empty()
    }
}

struct Partition {
    r: Vec<f64>,
    cos_delta: Vec<f64>,
    regions: Vec<Region>,
    counts: RegionCounts,
}

/// One spherical spline basis function.
#[derive(Debug, Clone, Copy)]
pub struct SphericalSplineBasis {
    center: GeoPoint,
    geometry: SplineGeometry,
    phi0: f64,
    cos_th0: f64,
    sin_th0: f64,
}

impl SphericalSplineBasis {
    /// Basis function centered at `center` with scale `q`.
    ///
    /// # Errors
    /// Returns `InvalidScale` if `scale > 10`.
    pub fn new(center: GeoPoint, scale: u32) -> Result<Self> {
        Ok(Self::with_geometry(center, SplineGeometry::new(scale)?))
    }

    /// Basis function with precomputed geometry.
    pub fn with_geometry(center: GeoPoint, geometry: SplineGeometry) -> Self {
        let th0 = center.theta();
        SphericalSplineBasis {
            center,
            geometry,
            phi0: center.phi(),
            cos_th0: th0.cos(),
            sin_th0: th0.sin(),
        }
    }

    /// The center point.
    pub fn center(&self) -> GeoPoint {
        self.center
    }

    /// The support geometry.
    pub fn geometry(&self) -> &SplineGeometry {
        &self.geometry
    }

    /// Count the query points falling in each region.
    ///
    /// # Errors
    /// Returns `RegionPartition` if some point could not be classified.
    pub fn partition(&self, points: &QueryPoints) -> Result<RegionCounts> {
        Ok(self.partition_points(points)?.counts)
    }

    /// Basis value at every query point.
    ///
    /// Equivalent to the first column of [`SphericalSplineBasis::evaluate`],
    /// without the derivative work.
    ///
    /// # Errors
    /// Returns `RegionPartition` if some point could not be classified.
    pub fn values(&self, points: &QueryPoints) -> Result<Array1<f64>> {
        let part = self.partition_points(points)?;
        Ok(part
            .regions
            .iter()
            .zip(part.r.iter())
            .map(|(&region, &r)| value(region, r))
            .collect())
    }

    /// Basis value and derivatives at every query point.
    ///
    /// Returns an `(n, cols)` array. `cols == 1` yields only the value.
    ///
    /// # Errors
    /// Returns `InvalidColumns` unless `1 <= cols <= 5`, and `RegionPartition`
    /// if some point could not be classified.
    pub fn evaluate(&self, points: &QueryPoints, cols: usize) -> Result<Array2<f64>> {
        if cols == 0 || cols > MAX_COLUMNS {
            return Err(TomoError::InvalidColumns(cols));
        }
        let part = self.partition_points(points)?;
        let n = points.len();
        let mut out = Array2::zeros((n, cols));

        if cols == 1 {
            for (i, (&region, &r)) in part.regions.iter().zip(part.r.iter()).enumerate() {
                out[[i, 0]] = value(region, r);
            }
            return Ok(out);
        }

        let db = self.geometry.db;
        let dq = 1.0 / db;
        for i in 0..n {
            let r = part.r[i];
            let row = match part.regions[i] {
                Region::Outside | Region::Center => continue,
                Region::OuterRing => {
                    let dif = r - 1.0;
                    let slope = -0.75 + 1.5 * dif - 0.75 * dif * dif;
                    let (dadp, dadt, cot) = self.arc_gradient(points, i, part.cos_delta[i]);
                    let delta = r * db;
                    [
                        value(Region::OuterRing, r),
                        dq * slope * dadp,
                        dq * slope * dadt,
                        dq * (3.0 - 1.5 * r + cot * slope),
                        0.75 * db.powi(-3) * (2.0 * db - delta).powi(2),
                    ]
                }
                Region::InnerCircle => {
                    let slope = -3.0 * r + 2.25 * r * r;
                    let (dadp, dadt, cot) = self.arc_gradient(points, i, part.cos_delta[i]);
                    let delta = r * db;
                    [
                        value(Region::InnerCircle, r),
                        dq * slope * dadp,
                        dq * slope * dadt,
                        dq * (-3.0 + 4.5 * r + cot * slope),
                        0.75 * db.powi(-3) * (4.0 * db - 3.0 * delta) * delta,
                    ]
                }
            };
            for (c, v) in row.iter().take(cols).enumerate() {
                out[[i, c]] = *v;
            }
        }

        if part.counts.center > 0 {
            // The derivatives are singular on the center itself; borrow the
            // Laplacian of the closest regular sample instead.
            let d2val = if cols > LAPLACIAN {
                part.regions
                    .iter()
                    .zip(part.r.iter())
                    .enumerate()
                    .filter(|(_, (region, _))| **region != Region::Center)
                    .min_by(|a, b| a.1 .1.total_cmp(b.1 .1))
                    .map(|(i, _)| out[[i, LAPLACIAN]])
                    .unwrap_or(-3.0 * dq - 3.0 * dq * dq)
            } else {
                0.0
            };
            for (i, &region) in part.regions.iter().enumerate() {
                if region == Region::Center {
                    out[[i, 0]] = 1.0;
                    if cols > LAPLACIAN {
                        out[[i, LAPLACIAN]] = d2val;
                    }
                }
            }
        }

        Ok(out)
    }

    fn partition_points(&self, points: &QueryPoints) -> Result<Partition> {
        let n = points.len();
        let db = self.geometry.db;
        let mut r = Vec::with_capacity(n);
        let mut cos_delta = Vec::with_capacity(n);
        let mut regions = Vec::with_capacity(n);
        let mut counts = RegionCounts::default();

        for i in 0..n {
            let c = (self.cos_th0 * points.cos_theta[i]
                + self.sin_th0 * points.sin_theta[i] * (self.phi0 - points.phi[i]).cos())
            .clamp(-1.0, 1.0);
            let ri = c.acos() / db;
            let region = self.geometry.classify(ri - 1.0);
            if let Some(region) = region {
                counts.add(region);
            }
            r.push(ri);
            cos_delta.push(c);
            regions.push(region);
        }

        if counts.total() != n {
            return Err(TomoError::RegionPartition {
                total: n,
                classified: counts.total(),
            });
        }
        let regions = regions
            .into_iter()
            .collect::<Option<Vec<Region>>>()
            .ok_or(TomoError::RegionPartition {
                total: n,
                classified: counts.total(),
            })?;

        Ok(Partition {
            r,
            cos_delta,
            regions,
            counts,
        })
    }

    /// `(d delta / d phi, d delta / d theta, cot delta)` at query point `i`.
    fn arc_gradient(&self, points: &QueryPoints, i: usize, cos_delta: f64) -> (f64, f64, f64) {
        let sin_delta = (1.0 - cos_delta * cos_delta).sqrt();
        let dph = points.phi[i] - self.phi0;
        let dadp = self.sin_th0 * points.sin_theta[i] * dph.sin() / sin_delta;
        let dadt = (self.cos_th0 * points.sin_theta[i]
            - points.cos_theta[i] * self.sin_th0 * dph.cos())
            / sin_delta;
        (dadp, dadt, cos_delta / sin_delta)
    }
}

fn value(region: Region, r: f64) -> f64 {
    match region {
        Region::Outside => 0.0,
        Region::OuterRing => {
            let dif = r - 1.0;
            ((-0.25 * dif + 0.75) * dif - 0.75) * dif + 0.25
        }
        Region::InnerCircle => (0.75 * r - 1.5) * r * r + 1.0,
        Region::Center => 1.0,
    }
}

/// Evaluate one basis function at lon/lat points (degrees).
///
/// Convenience wrapper over [`SphericalSplineBasis::evaluate`].
///
/// # Errors
/// See [`SphericalSplineBasis::evaluate`].
pub fn spline_values(
    center: GeoPoint,
    scale: u32,
    lons: &[f64],
    lats: &[f64],
    cols: usize,
) -> Result<Array2<f64>> {
    let points = QueryPoints::new(lons, lats)?;
    SphericalSplineBasis::new(center, scale)?.evaluate(&points, cols)
}
