// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::fmt;

/// Errors that can occur while sampling rays, evaluating splines, assembling
/// the design matrix, solving the inverse problem, or doing I/O.
#[derive(Debug)]
pub enum TomoError {
    /// Too few points requested along a ray path (must be >= 3).
    InvalidSampleCount(usize),
    /// Spline scale outside the supported range 0..=10.
    InvalidScale(u32),
    /// Requested number of spline output columns outside 1..=5.
    InvalidColumns(usize),
    /// A latitude/longitude pair is out of range or not finite.
    InvalidCoordinate {
        /// Latitude in degrees.
        lat: f64,
        /// Longitude in degrees.
        lon: f64,
    },
    /// Velocity value is not positive and finite.
    InvalidVelocity {
        /// The index of the invalid value.
        index: usize,
        /// The invalid value.
        value: f64,
    },
    /// Query points were not covered exactly once by the four spline regions.
    RegionPartition {
        /// Total number of query points.
        total: usize,
        /// Number of points that landed in some region.
        classified: usize,
    },
    /// Paired coordinate arrays (or array and shape) have inconsistent lengths.
    ShapeMismatch {
        /// The expected shape.
        expected: Vec<usize>,
        /// The actual shape encountered.
        got: Vec<usize>,
    },
    /// Measurement vector length does not match the design matrix row count.
    DimensionMismatch {
        /// Rows in the design matrix.
        rows: usize,
        /// Length of the measurement vector.
        got: usize,
    },
    /// The assembled design matrix contains a NaN or infinite entry.
    NonFiniteEntry {
        /// Row (ray) index.
        row: usize,
        /// Column (spline) index.
        col: usize,
    },
    /// The damped normal equations could not be factored.
    SingularMatrix {
        /// Damping value of the failed system.
        lambda: f64,
    },
    /// Damping value is negative or not finite.
    InvalidDamping(f64),
    /// Plotting grid dimensions or extent are invalid.
    InvalidGrid(String),
    /// Unsupported data type in file.
    UnsupportedDtype(String),
    /// Unsupported file format (unrecognized extension).
    UnsupportedFileFormat(String),
    /// Expected MAT variable not found in file.
    MatVariableNotFound {
        /// The variable name that was requested.
        expected: String,
        /// The variable names that are available.
        available: Vec<String>,
    },
    /// A text input file could not be parsed.
    Parse {
        /// 1-based line number.
        line: usize,
        /// Explanation of the failure.
        reason: String,
    },
    /// I/O error occurred.
    IoError(std::io::Error),
    /// Other error with a descriptive message.
    Other(String),
}

impl fmt::Display for TomoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TomoError::InvalidSampleCount(n) => {
                write!(f, "invalid sample count: {} (must be >= 3)", n)
            }
            TomoError::InvalidScale(q) => {
                write!(f, "invalid spline scale: {} (must be in 0..=10)", q)
            }
            TomoError::InvalidColumns(cols) => {
                write!(f, "invalid spline output columns: {} (must be in 1..=5)", cols)
            }
            TomoError::InvalidCoordinate { lat, lon } => {
                write!(f, "invalid coordinate: lat {} lon {}", lat, lon)
            }
            TomoError::InvalidVelocity { index, value } => {
                write!(
                    f,
                    "invalid velocity at index {}: {} (must be positive and finite)",
                    index, value
                )
            }
            TomoError::RegionPartition { total, classified } => {
                write!(
                    f,
                    "datapoints have not been partitioned properly: {} of {} classified",
                    classified, total
                )
            }
            TomoError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {:?}, got {:?}", expected, got)
            }
            TomoError::DimensionMismatch { rows, got } => {
                write!(
                    f,
                    "dimension mismatch: design matrix has {} rows, measurement vector has {}",
                    rows, got
                )
            }
            TomoError::NonFiniteEntry { row, col } => {
                write!(f, "non-finite design matrix entry at [{}, {}]", row, col)
            }
            TomoError::SingularMatrix { lambda } => {
                write!(f, "singular normal equations for damping {}", lambda)
            }
            TomoError::InvalidDamping(lambda) => {
                write!(
                    f,
                    "invalid damping: {} (must be non-negative and finite)",
                    lambda
                )
            }
            TomoError::InvalidGrid(msg) => write!(f, "invalid grid: {}", msg),
            TomoError::UnsupportedDtype(dtype) => {
                write!(f, "unsupported dtype: {}", dtype)
            }
            TomoError::UnsupportedFileFormat(ext) => {
                write!(f, "unsupported file format: {}", ext)
            }
            TomoError::MatVariableNotFound {
                expected,
                available,
            } => {
                write!(
                    f,
                    "MAT variable '{}' not found; available variables: {:?}",
                    expected, available
                )
            }
            TomoError::Parse { line, reason } => {
                write!(f, "parse error on line {}: {}", line, reason)
            }
            TomoError::IoError(e) => write!(f, "I/O error: {}", e),
            TomoError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for TomoError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TomoError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for TomoError {
    fn from(e: std::io::Error) -> Self {
        TomoError::IoError(e)
    }
}

/// Convenience type alias for Results with TomoError.
pub type Result<T> = std::result::Result<T, TomoError>;
