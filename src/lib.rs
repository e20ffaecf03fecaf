// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

//! Ray-path tomography on the sphere with spherical spline basis functions.
//!
//! Travel-time residuals between sources and receivers are modelled as line
//! integrals of a slowness perturbation along WGS84 geodesics. The
//! perturbation is expanded in compactly supported spherical splines
//! (Wang & Dahlen, 1995) centered on a hierarchical grid. The library builds
//! the design matrix in parallel, solves the damped least-squares problem for
//! a sweep of damping values, and evaluates the basis on a map grid for
//! plotting.

#![warn(missing_docs)]

/// Stations, spline centers, velocities and ray indexing.
pub mod core;
/// Design matrix construction by geodesic ray integration.
pub mod design;
/// Error types for the library.
pub mod error;
/// Basis fields on a map grid and model expansion.
pub mod field;
/// WGS84 geodesic sampling.
pub mod geodesic;
/// Text, `.npy` and `.mat` loaders and writers.
pub mod io;
/// Damped least-squares inversion.
pub mod solver;
/// Spherical spline basis functions.
pub mod spline;

pub use crate::core::{GeoPoint, RayIndex, SplineCenters, Stations, Velocity};
pub use crate::design::{calc_g, DesignMatrix, DesignMatrixBuilder, RayPaths};
pub use crate::error::{Result, TomoError};
pub use crate::field::{MapExtent, MapGrid, SensitivityField};
pub use crate::geodesic::GeodesicSampler;
pub use crate::solver::{log_spaced, DampedSolution, LCurvePoint, RegularizedSolver};
pub use crate::spline::{spline_values, QueryPoints, SphericalSplineBasis};
