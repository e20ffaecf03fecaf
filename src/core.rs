// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use crate::error::{Result, TomoError};

/// Largest supported spline scale.
pub const MAX_SCALE: u32 = 10;

/// A point on the Earth's surface in geographic degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    /// Latitude in degrees, in [-90, 90].
    pub lat: f64,
    /// Longitude in degrees (unrestricted).
    pub lon: f64,
}

impl GeoPoint {
    /// Create a validated point.
    ///
    /// # Errors
    /// Returns an error if either value is not finite or the latitude is outside [-90, 90].
    pub fn new(lat: f64, lon: f64) -> Result<Self> {
        if !lat.is_finite() || !lon.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(TomoError::InvalidCoordinate { lat, lon });
        }
        Ok(GeoPoint { lat, lon })
    }

    /// Co-latitude in radians.
    pub fn theta(&self) -> f64 {
        (90.0 - self.lat).to_radians()
    }

    /// Longitude in radians.
    pub fn phi(&self) -> f64 {
        self.lon.to_radians()
    }
}

/// A set of stations (sources or receivers) stored as paired coordinate arrays.
#[derive(Debug, Clone)]
pub struct Stations {
    lats: Vec<f64>,
    lons: Vec<f64>,
}

impl Stations {
    /// Build a station set from latitude and longitude arrays.
    ///
    /// # Errors
    /// Returns an error if the arrays differ in length or contain an invalid coordinate.
    pub fn new(lats: Vec<f64>, lons: Vec<f64>) -> Result<Self> {
        if lats.len() != lons.len() {
            return Err(TomoError::ShapeMismatch {
                expected: vec![lats.len()],
                got: vec![lons.len()],
            });
        }
        for (&lat, &lon) in lats.iter().zip(lons.iter()) {
            GeoPoint::new(lat, lon)?;
        }
        Ok(Stations { lats, lons })
    }

    /// Number of stations.
    pub fn len(&self) -> usize {
        self.lats.len()
    }

    /// True if there are no stations.
    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }

    /// The station at `index`.
    pub fn point(&self, index: usize) -> GeoPoint {
        GeoPoint {
            lat: self.lats[index],
            lon: self.lons[index],
        }
    }

    /// Iterate over all stations in order.
    pub fn iter(&self) -> impl Iterator<Item = GeoPoint> + '_ {
        self.lats
            .iter()
            .zip(self.lons.iter())
            .map(|(&lat, &lon)| GeoPoint { lat, lon })
    }

    /// Keep only the first `n` stations.
    pub fn truncated(&self, n: usize) -> Stations {
        let n = n.min(self.len());
        Stations {
            lats: self.lats[..n].to_vec(),
            lons: self.lons[..n].to_vec(),
        }
    }
}

/// Spline center points sharing one scale parameter.
#[derive(Debug, Clone)]
pub struct SplineCenters {
    lats: Vec<f64>,
    lons: Vec<f64>,
    scale: u32,
}

impl SplineCenters {
    /// Create a set of spline centers.
    ///
    /// # Parameters
    /// - `lats`, `lons`: center coordinates in degrees (same length)
    /// - `scale`: spline scale `q` in 0..=10; support half-width halves with each step
    ///
    /// # Errors
    /// Returns an error on mismatched lengths, invalid coordinates, or an out-of-range scale.
    pub fn new(lats: Vec<f64>, lons: Vec<f64>, scale: u32) -> Result<Self> {
        if scale > MAX_SCALE {
            return Err(TomoError::InvalidScale(scale));
        }
        let stations = Stations::new(lats, lons)?;
        Ok(SplineCenters {
            lats: stations.lats,
            lons: stations.lons,
            scale,
        })
    }

    /// Number of centers (one basis function each).
    pub fn len(&self) -> usize {
        self.lats.len()
    }

    /// True if there are no centers.
    pub fn is_empty(&self) -> bool {
        self.lats.is_empty()
    }

    /// Shared spline scale.
    pub fn scale(&self) -> u32 {
        self.scale
    }

    /// The center of basis function `index`.
    pub fn center(&self, index: usize) -> GeoPoint {
        GeoPoint {
            lat: self.lats[index],
            lon: self.lons[index],
        }
    }

    /// Center latitudes in degrees.
    pub fn lats(&self) -> &[f64] {
        &self.lats
    }

    /// Center longitudes in degrees.
    pub fn lons(&self) -> &[f64] {
        &self.lons
    }
}

/// Velocity used to turn spline path integrals into travel-time sensitivity.
#[derive(Debug, Clone, PartialEq)]
pub enum Velocity {
    /// One velocity for every spline.
    Uniform(f64),
    /// One velocity per spline center.
    PerCenter(Vec<f64>),
}

impl Velocity {
    /// Check that the velocity is usable with `num_centers` splines.
    ///
    /// # Errors
    /// Returns an error if a per-center array has the wrong length or any value is
    /// not positive and finite.
    pub fn validate(&self, num_centers: usize) -> Result<()> {
        match self {
            Velocity::Uniform(v) => check_velocity(0, *v),
            Velocity::PerCenter(values) => {
                if values.len() != num_centers {
                    return Err(TomoError::ShapeMismatch {
                        expected: vec![num_centers],
                        got: vec![values.len()],
                    });
                }
                values
                    .iter()
                    .enumerate()
                    .try_for_each(|(index, &v)| check_velocity(index, v))
            }
        }
    }

    /// Velocity for spline `index`.
    pub fn at(&self, index: usize) -> f64 {
        match self {
            Velocity::Uniform(v) => *v,
            Velocity::PerCenter(values) => values[index],
        }
    }
}

fn check_velocity(index: usize, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(TomoError::InvalidVelocity { index, value });
    }
    Ok(())
}

/// Row ordering of source-receiver pairs: `row = source * n_receivers + receiver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RayIndex {
    /// Number of sources (events).
    pub num_sources: usize,
    /// Number of receivers (stations).
    pub num_receivers: usize,
}

impl RayIndex {
    /// Create the index for the given source and receiver counts.
    pub fn new(num_sources: usize, num_receivers: usize) -> Self {
        RayIndex {
            num_sources,
            num_receivers,
        }
    }

    /// Total number of rays.
    pub fn num_rays(&self) -> usize {
        self.num_sources * self.num_receivers
    }

    /// Row for a (source, receiver) pair.
    pub fn row(&self, source: usize, receiver: usize) -> usize {
        source * self.num_receivers + receiver
    }

    /// Inverse of [`RayIndex::row`].
    pub fn split(&self, row: usize) -> (usize, usize) {
        (row / self.num_receivers, row % self.num_receivers)
    }

    /// Number of rows covered by the first `events` sources.
    pub fn rows_for_events(&self, events: usize) -> usize {
        events.min(self.num_sources) * self.num_receivers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geo_point_rejects_bad_latitude() {
        assert!(GeoPoint::new(90.0, 400.0).is_ok());
        assert!(matches!(
            GeoPoint::new(91.0, 0.0),
            Err(TomoError::InvalidCoordinate { .. })
        ));
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn geo_point_angles() {
        let p = GeoPoint::new(0.0, 180.0).unwrap();
        assert!((p.theta() - std::f64::consts::FRAC_PI_2).abs() < 1e-15);
        assert!((p.phi() - std::f64::consts::PI).abs() < 1e-15);
    }

    #[test]
    fn stations_length_mismatch() {
        let result = Stations::new(vec![0.0, 1.0], vec![0.0]);
        assert!(matches!(result, Err(TomoError::ShapeMismatch { .. })));
    }

    #[test]
    fn spline_centers_scale_limit() {
        assert!(SplineCenters::new(vec![0.0], vec![0.0], 10).is_ok());
        assert!(matches!(
            SplineCenters::new(vec![0.0], vec![0.0], 11),
            Err(TomoError::InvalidScale(11))
        ));
    }

    #[test]
    fn velocity_validation() {
        assert!(Velocity::Uniform(3500.0).validate(4).is_ok());
        assert!(matches!(
            Velocity::Uniform(0.0).validate(4),
            Err(TomoError::InvalidVelocity { index: 0, .. })
        ));
        assert!(matches!(
            Velocity::PerCenter(vec![1.0, 2.0]).validate(3),
            Err(TomoError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            Velocity::PerCenter(vec![1.0, -2.0, 3.0]).validate(3),
            Err(TomoError::InvalidVelocity { index: 1, .. })
        ));
        assert_eq!(Velocity::PerCenter(vec![1.0, 2.0]).at(1), 2.0);
    }

    #[test]
    fn ray_index_ordering() {
        let idx = RayIndex::new(3, 4);
        assert_eq!(idx.num_rays(), 12);
        assert_eq!(idx.row(2, 1), 9);
        assert_eq!(idx.split(9), (2, 1));
        for row in 0..idx.num_rays() {
            let (s, r) = idx.split(row);
            assert_eq!(idx.row(s, r), row);
        }
        assert_eq!(idx.rows_for_events(2), 8);
        assert_eq!(idx.rows_for_events(10), 12);
    }
}
