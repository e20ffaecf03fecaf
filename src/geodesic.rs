// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::sync::OnceLock;

use geographiclib_rs::{DirectGeodesic, Geodesic, InverseGeodesic};

use crate::core::GeoPoint;
use crate::error::{Result, TomoError};

/// Minimum number of points along a ray (both endpoints plus one interior point).
pub const MIN_SAMPLES: usize = 3;

static WGS84: OnceLock<Geodesic> = OnceLock::new();

/// Shared WGS84 ellipsoid context. Built on first use.
fn wgs84() -> &'static Geodesic {
    WGS84.get_or_init(Geodesic::wgs84)
}

/// Samples geodesic (great-circle on the WGS84 ellipsoid) paths between points.
///
/// The sampler is a thin handle on a process-wide ellipsoid context and is
/// cheap to copy; it carries no state between calls.
#[derive(Clone, Copy)]
pub struct GeodesicSampler {
    geod: &'static Geodesic,
}

impl Default for GeodesicSampler {
    fn default() -> Self {
        GeodesicSampler::new()
    }
}

impl GeodesicSampler {
    /// Create a sampler on the WGS84 ellipsoid.
    pub fn new() -> Self {
        GeodesicSampler { geod: wgs84() }
    }

    /// Geodesic distance between two points in meters.
    pub fn distance(&self, from: GeoPoint, to: GeoPoint) -> f64 {
        self.geod.inverse(from.lat, from.lon, to.lat, to.lon)
    }

    /// Return `npts` points from `from` to `to`, equally spaced by arc length.
    ///
    /// The first and last points are the inputs themselves; interior points
    /// lie on the geodesic at `k * s12 / (npts - 1)` from the start.
    ///
    /// # Errors
    /// Returns `InvalidSampleCount` if `npts < 3`.
    pub fn waypoints(&self, from: GeoPoint, to: GeoPoint, npts: usize) -> Result<Vec<GeoPoint>> {
        if npts < MIN_SAMPLES {
            return Err(TomoError::InvalidSampleCount(npts));
        }
        let (s12, azi1, _azi2, _a12): (f64, f64, f64, f64) =
            self.geod.inverse(from.lat, from.lon, to.lat, to.lon);
        let step = s12 / (npts - 1) as f64;

        let mut points = Vec::with_capacity(npts);
        points.push(from);
        for k in 1..npts - 1 {
            let (lat, lon): (f64, f64) = self.geod.direct(from.lat, from.lon, azi1, k as f64 * step);
            points.push(GeoPoint { lat, lon });
        }
        points.push(to);
        Ok(points)
    }
}
