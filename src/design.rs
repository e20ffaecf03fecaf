// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Instant;

use ndarray::parallel::prelude::*;
use ndarray::{s, Array1, Array2, Array3, ArrayView2, Axis};
use tracing::{debug, info};

use crate::core::{GeoPoint, RayIndex, SplineCenters, Stations, Velocity};
use crate::error::{Result, TomoError};
use crate::geodesic::{GeodesicSampler, MIN_SAMPLES};
use crate::spline::{QueryPoints, SphericalSplineBasis, SplineGeometry};

/// Default number of samples along each ray.
pub const DEFAULT_NPTS: usize = 1000;

/// Sampled ray paths for every source-receiver pair.
#[derive(Debug, Clone)]
pub struct RayPaths {
    /// Waypoints, shape `(rays, npts, 2)`; the last axis is `[lat, lon]`.
    points: Array3<f64>,
    /// Geodesic length of each ray in meters.
    lengths: Array1<f64>,
    index: RayIndex,
}

impl RayPaths {
    /// The waypoint tensor, shape `(rays, npts, 2)` with `[lat, lon]` on the last axis.
    pub fn points(&self) -> &Array3<f64> {
        &self.points
    }

    /// Geodesic length of every ray in meters.
    pub fn lengths(&self) -> &Array1<f64> {
        &self.lengths
    }

    /// Row ordering of the rays.
    pub fn index(&self) -> RayIndex {
        self.index
    }

    /// Samples per ray.
    pub fn npts(&self) -> usize {
        self.points.shape()[1]
    }

    /// Rectangle-rule integration weight of each ray (`length / npts`).
    pub fn weights(&self) -> Array1<f64> {
        let npts = self.npts() as f64;
        self.lengths.mapv(|len| len / npts)
    }

    /// Every waypoint of every ray, flattened ray-major.
    ///
    /// # Errors
    /// Propagates a shape error from [`QueryPoints::new`].
    pub fn query_points(&self) -> Result<QueryPoints> {
        let lats: Vec<f64> = self.points.slice(s![.., .., 0]).iter().copied().collect();
        let lons: Vec<f64> = self.points.slice(s![.., .., 1]).iter().copied().collect();
        QueryPoints::new(&lons, &lats)
    }
}

/// Sensitivity matrix relating spline coefficients to ray travel times.
///
/// Rows follow [`RayIndex`] ordering, columns follow spline-center order.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    g: Array2<f64>,
    index: RayIndex,
}

impl DesignMatrix {
    /// Wrap an existing matrix, checking it against the ray ordering.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the row count does not equal the number of
    /// rays, or `NonFiniteEntry` if any entry is NaN or infinite.
    pub fn from_array(g: Array2<f64>, index: RayIndex) -> Result<Self> {
        if g.nrows() != index.num_rays() {
            return Err(TomoError::ShapeMismatch {
                expected: vec![index.num_rays(), g.ncols()],
                got: g.shape().to_vec(),
            });
        }
        check_finite(g.view())?;
        Ok(DesignMatrix { g, index })
    }

    /// The dense matrix.
    pub fn matrix(&self) -> &Array2<f64> {
        &self.g
    }

    /// Consume and return the dense matrix.
    pub fn into_array(self) -> Array2<f64> {
        self.g
    }

    /// Row ordering.
    pub fn index(&self) -> RayIndex {
        self.index
    }

    /// Number of rays.
    pub fn nrows(&self) -> usize {
        self.g.nrows()
    }

    /// Number of splines.
    pub fn ncols(&self) -> usize {
        self.g.ncols()
    }

    /// Keep only the rows belonging to the first `events` sources.
    pub fn truncate_events(&self, events: usize) -> DesignMatrix {
        let events = events.min(self.index.num_sources);
        let rows = self.index.rows_for_events(events);
        DesignMatrix {
            g: self.g.slice(s![..rows, ..]).to_owned(),
            index: RayIndex::new(events, self.index.num_receivers),
        }
    }
}

fn check_finite(g: ArrayView2<f64>) -> Result<()> {
    match g.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), _)) => Err(TomoError::NonFiniteEntry { row, col }),
        None => Ok(()),
    }
}

/// Builds the design matrix `G` for every source-receiver ray.
///
/// `G[i, j]` is the rectangle-rule line integral of basis function `j`
/// along ray `i`, divided by the velocity of spline `j`.
pub struct DesignMatrixBuilder {
    sources: Stations,
    receivers: Stations,
    centers: SplineCenters,
    velocity: Velocity,
    npts: usize,
    num_threads: Option<usize>,
}

impl DesignMatrixBuilder {
    /// Create a builder for the given geometry.
    ///
    /// # Errors
    /// Returns an error if the velocity does not fit the number of centers.
    pub fn new(
        sources: Stations,
        receivers: Stations,
        centers: SplineCenters,
        velocity: Velocity,
    ) -> Result<Self> {
        velocity.validate(centers.len())?;
        Ok(DesignMatrixBuilder {
            sources,
            receivers,
            centers,
            velocity,
            npts: DEFAULT_NPTS,
            num_threads: None,
        })
    }

    /// Set the number of samples per ray (builder method). Default is 1000.
    ///
    /// # Errors
    /// Returns `InvalidSampleCount` if `npts < 3`.
    pub fn with_npts(mut self, npts: usize) -> Result<Self> {
        if npts < MIN_SAMPLES {
            return Err(TomoError::InvalidSampleCount(npts));
        }
        self.npts = npts;
        Ok(self)
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Row ordering of the rays.
    pub fn ray_index(&self) -> RayIndex {
        RayIndex::new(self.sources.len(), self.receivers.len())
    }

    /// The spline centers.
    pub fn centers(&self) -> &SplineCenters {
        &self.centers
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    fn pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.get_num_threads())
            .build()
            .map_err(|e| TomoError::Other(e.to_string()))
    }

    /// Sample every source-receiver ray.
    ///
    /// # Errors
    /// Returns an error if a ray cannot be sampled.
    pub fn ray_paths(&self) -> Result<RayPaths> {
        self.pool()?.install(|| self.sample_rays())
    }

    fn sample_rays(&self) -> Result<RayPaths> {
        let index = self.ray_index();
        let npts = self.npts;
        let sampler = GeodesicSampler::new();

        let rays = (0..index.num_rays())
            .into_par_iter()
            .map(|row| -> Result<(Vec<GeoPoint>, f64)> {
                let (src, rec) = index.split(row);
                let from = self.sources.point(src);
                let to = self.receivers.point(rec);
                Ok((sampler.waypoints(from, to, npts)?, sampler.distance(from, to)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut points = Array3::zeros((index.num_rays(), npts, 2));
        let mut lengths = Array1::zeros(index.num_rays());
        for (i, (path, length)) in rays.into_iter().enumerate() {
            for (k, p) in path.iter().enumerate() {
                points[[i, k, 0]] = p.lat;
                points[[i, k, 1]] = p.lon;
            }
            lengths[i] = length;
        }
        debug!(rays = index.num_rays(), npts, "sampled ray paths");
        Ok(RayPaths {
            points,
            lengths,
            index,
        })
    }

    /// Assemble the design matrix.
    ///
    /// Each basis function is evaluated once over the waypoints of all rays
    /// together; columns are filled in parallel.
    ///
    /// # Errors
    /// Returns `RegionPartition` if a basis evaluation fails, or
    /// `NonFiniteEntry` if the assembled matrix contains NaN or infinity.
    pub fn build(&self) -> Result<DesignMatrix> {
        let start = Instant::now();
        let pool = self.pool()?;
        let g = pool.install(|| -> Result<Array2<f64>> {
            let paths = self.sample_rays()?;
            self.assemble(&paths)
        })?;
        self.finish(g, start)
    }

    /// Assemble the design matrix from rays already sampled by
    /// [`DesignMatrixBuilder::ray_paths`].
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if `paths` was not sampled for this builder's
    /// stations and sample count, plus any error of [`DesignMatrixBuilder::build`].
    pub fn build_from_paths(&self, paths: &RayPaths) -> Result<DesignMatrix> {
        let index = self.ray_index();
        if paths.index() != index || paths.npts() != self.npts {
            return Err(TomoError::ShapeMismatch {
                expected: vec![index.num_rays(), self.npts],
                got: vec![paths.index().num_rays(), paths.npts()],
            });
        }
        let start = Instant::now();
        let g = self.pool()?.install(|| self.assemble(paths))?;
        self.finish(g, start)
    }

    fn finish(&self, g: Array2<f64>, start: Instant) -> Result<DesignMatrix> {
        info!(
            rays = g.nrows(),
            splines = g.ncols(),
            npts = self.npts,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "assembled design matrix"
        );
        DesignMatrix::from_array(g, self.ray_index())
    }

    fn assemble(&self, paths: &RayPaths) -> Result<Array2<f64>> {
        let num_rays = paths.index().num_rays();
        let npts = paths.npts();
        let query = paths.query_points()?;
        let weights = paths.weights();
        let geometry = SplineGeometry::new(self.centers.scale())?;

        let mut g = Array2::zeros((num_rays, self.centers.len()));
        g.axis_iter_mut(Axis(1))
            .into_par_iter()
            .enumerate()
            .try_for_each(|(j, mut column)| -> Result<()> {
                let basis = SphericalSplineBasis::with_geometry(self.centers.center(j), geometry);
                let values = basis
                    .values(&query)?
                    .into_shape((num_rays, npts))
                    .map_err(|e| TomoError::Other(format!("shape error: {}", e)))?;
                let slowness = 1.0 / self.velocity.at(j);
                for (i, ray) in values.outer_iter().enumerate() {
                    column[i] = ray.sum() * weights[i] * slowness;
                }
                Ok(())
            })?;
        Ok(g)
    }
}

/// Build `G` from plain coordinate arrays (degrees).
///
/// # Errors
/// Returns `ShapeMismatch` on inconsistent array lengths and any error of
/// [`DesignMatrixBuilder::build`].
#[allow(clippy::too_many_arguments)]
pub fn calc_g(
    slats: &[f64],
    slons: &[f64],
    rlats: &[f64],
    rlons: &[f64],
    qlats: &[f64],
    qlons: &[f64],
    velocity: Velocity,
    npts: usize,
    scale: u32,
) -> Result<DesignMatrix> {
    let sources = Stations::new(slats.to_vec(), slons.to_vec())?;
    let receivers = Stations::new(rlats.to_vec(), rlons.to_vec())?;
    let centers = SplineCenters::new(qlats.to_vec(), qlons.to_vec(), scale)?;
    DesignMatrixBuilder::new(sources, receivers, centers, velocity)?
        .with_npts(npts)?
        .build()
}
