// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::time::Instant;

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;
use tracing::{debug, info};

use crate::design::DesignMatrix;
use crate::error::{Result, TomoError};

/// Generate `n` values evenly spaced in log10 between `lo` and `hi` inclusive.
///
/// # Errors
/// Returns `InvalidDamping` if either bound is not positive and finite, or
/// `Other` if `n == 0`.
pub fn log_spaced(lo: f64, hi: f64, n: usize) -> Result<Vec<f64>> {
    for bound in [lo, hi] {
        if !bound.is_finite() || bound <= 0.0 {
            return Err(TomoError::InvalidDamping(bound));
        }
    }
    match n {
        0 => Err(TomoError::Other("log_spaced needs at least one value".to_string())),
        1 => Ok(vec![lo]),
        _ => {
            let (a, b) = (lo.log10(), hi.log10());
            let step = (b - a) / (n - 1) as f64;
            Ok((0..n)
                .map(|k| match k {
                    0 => lo,
                    k if k == n - 1 => hi,
                    k => 10f64.powf(a + step * k as f64),
                })
                .collect())
        }
    }
}

/// Normal equations `GtG m = Gtd`, formed once and reused for every damping value.
#[derive(Debug, Clone)]
pub struct NormalEquations {
    gtg: DMatrix<f64>,
    gtd: DVector<f64>,
}

impl NormalEquations {
    /// Form `GtG` and `Gtd`.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if `d` does not have one entry per row of `g`.
    pub fn new(g: ArrayView2<f64>, d: ArrayView1<f64>) -> Result<Self> {
        if d.len() != g.nrows() {
            return Err(TomoError::DimensionMismatch {
                rows: g.nrows(),
                got: d.len(),
            });
        }
        let gtg = g.t().dot(&g);
        let gtd = g.t().dot(&d);
        let n = gtg.nrows();
        Ok(NormalEquations {
            gtg: DMatrix::from_fn(n, n, |i, j| gtg[[i, j]]),
            gtd: DVector::from_iterator(n, gtd.iter().copied()),
        })
    }

    /// Number of unknowns.
    pub fn len(&self) -> usize {
        self.gtd.len()
    }

    /// True if there are no unknowns.
    pub fn is_empty(&self) -> bool {
        self.gtd.is_empty()
    }

    /// Solve `(GtG + lambda^2 I) m = Gtd`.
    ///
    /// # Errors
    /// Returns `InvalidDamping` for a negative or non-finite `lambda`, and
    /// `SingularMatrix` if the damped system is not numerically positive definite.
    pub fn solve(&self, lambda: f64) -> Result<Array1<f64>> {
        if !lambda.is_finite() || lambda < 0.0 {
            return Err(TomoError::InvalidDamping(lambda));
        }
        let n = self.len();
        let mut a = self.gtg.clone();
        for i in 0..n {
            a[(i, i)] += lambda * lambda;
        }
        let scale = (0..n).map(|i| a[(i, i)]).fold(0.0_f64, f64::max);

        let chol: Cholesky<f64, Dyn> =
            Cholesky::new(a).ok_or(TomoError::SingularMatrix { lambda })?;

        // Undamped only: a pivot this small relative to the diagonal means
        // GtG is rank deficient up to rounding. Any lambda > 0 keeps the
        // system positive definite.
        if lambda == 0.0 {
            let l = chol.l_dirty();
            let tiny = f64::EPSILON * n as f64 * scale;
            if (0..n).any(|i| l[(i, i)] * l[(i, i)] <= tiny) {
                return Err(TomoError::SingularMatrix { lambda });
            }
        }

        let m = chol.solve(&self.gtd);
        Ok(m.iter().copied().collect())
    }
}

/// One point on the L-curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LCurvePoint {
    /// Damping value.
    pub lambda: f64,
    /// `||dm||`.
    pub solution_norm: f64,
    /// `||G dm - d||`.
    pub residual_norm: f64,
}

/// Coefficient vectors for every damping value, in sweep order.
#[derive(Debug, Clone)]
pub struct DampedSolution {
    lambdas: Vec<f64>,
    coefficients: Array2<f64>,
}

impl DampedSolution {
    /// Assemble from parallel lambda/solution lists.
    ///
    /// # Errors
    /// Returns `ShapeMismatch` if the list lengths differ or the solutions
    /// do not all have the same length.
    pub fn new(lambdas: Vec<f64>, solutions: Vec<Array1<f64>>) -> Result<Self> {
        if lambdas.len() != solutions.len() {
            return Err(TomoError::ShapeMismatch {
                expected: vec![lambdas.len()],
                got: vec![solutions.len()],
            });
        }
        let n = solutions.first().map_or(0, |m| m.len());
        let mut coefficients = Array2::zeros((lambdas.len(), n));
        for (k, m) in solutions.iter().enumerate() {
            if m.len() != n {
                return Err(TomoError::ShapeMismatch {
                    expected: vec![n],
                    got: vec![m.len()],
                });
            }
            coefficients.row_mut(k).assign(m);
        }
        Ok(DampedSolution {
            lambdas,
            coefficients,
        })
    }

    /// Damping values in sweep order.
    pub fn lambdas(&self) -> &[f64] {
        &self.lambdas
    }

    /// All coefficient vectors, one row per damping value.
    pub fn coefficients(&self) -> &Array2<f64> {
        &self.coefficients
    }

    /// Number of damping values.
    pub fn len(&self) -> usize {
        self.lambdas.len()
    }

    /// True if the sweep was empty.
    pub fn is_empty(&self) -> bool {
        self.lambdas.is_empty()
    }

    /// Coefficients for exactly `lambda`, if it was part of the sweep.
    pub fn get(&self, lambda: f64) -> Option<ArrayView1<'_, f64>> {
        self.lambdas
            .iter()
            .position(|&l| l == lambda)
            .map(|k| self.coefficients.row(k))
    }

    /// Iterate over `(lambda, dm)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (f64, ArrayView1<'_, f64>)> {
        self.lambdas
            .iter()
            .copied()
            .zip(self.coefficients.outer_iter())
    }

    /// Solution and residual norms for each damping value.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if `g` and `d` disagree, or `ShapeMismatch`
    /// if `g` does not have one column per coefficient.
    pub fn l_curve(&self, g: ArrayView2<f64>, d: ArrayView1<f64>) -> Result<Vec<LCurvePoint>> {
        if d.len() != g.nrows() {
            return Err(TomoError::DimensionMismatch {
                rows: g.nrows(),
                got: d.len(),
            });
        }
        if g.ncols() != self.coefficients.ncols() {
            return Err(TomoError::ShapeMismatch {
                expected: vec![g.nrows(), self.coefficients.ncols()],
                got: g.shape().to_vec(),
            });
        }
        Ok(self
            .iter()
            .map(|(lambda, m)| {
                let residual = g.dot(&m) - d;
                LCurvePoint {
                    lambda,
                    solution_norm: m.dot(&m).sqrt(),
                    residual_norm: residual.dot(&residual).sqrt(),
                }
            })
            .collect())
    }
}

/// Tikhonov-damped least-squares solver swept over a set of damping values.
pub struct RegularizedSolver {
    lambdas: Vec<f64>,
    events: Option<usize>,
    num_threads: Option<usize>,
}

impl RegularizedSolver {
    /// Create a solver for the given damping values.
    ///
    /// # Errors
    /// Returns `InvalidDamping` if any value is negative or not finite.
    pub fn new(lambdas: Vec<f64>) -> Result<Self> {
        if let Some(&bad) = lambdas.iter().find(|l| !l.is_finite() || **l < 0.0) {
            return Err(TomoError::InvalidDamping(bad));
        }
        Ok(RegularizedSolver {
            lambdas,
            events: None,
            num_threads: None,
        })
    }

    /// Use only the rays of the first `events` sources (builder method).
    pub fn with_events(mut self, events: usize) -> Self {
        self.events = Some(events);
        self
    }

    /// Set the number of worker threads (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// Damping values in sweep order.
    pub fn lambdas(&self) -> &[f64] {
        &self.lambdas
    }

    /// Solve for every damping value.
    ///
    /// If an event limit is set, `g` and `d` are first cut to the rows of
    /// those events.
    ///
    /// # Errors
    /// Returns `DimensionMismatch` if `d` does not match `g`, and
    /// `SingularMatrix` if any damped system cannot be solved.
    pub fn solve(&self, g: &DesignMatrix, d: ArrayView1<f64>) -> Result<DampedSolution> {
        if d.len() != g.nrows() {
            return Err(TomoError::DimensionMismatch {
                rows: g.nrows(),
                got: d.len(),
            });
        }
        match self.events {
            Some(events) => {
                let reduced = g.truncate_events(events);
                let rows = reduced.nrows();
                debug!(events, rows, "truncated to leading events");
                self.solve_array(reduced.matrix().view(), d.slice(s![..rows]))
            }
            None => self.solve_array(g.matrix().view(), d),
        }
    }

    /// Solve for every damping value using a bare matrix.
    ///
    /// # Errors
    /// See [`RegularizedSolver::solve`].
    pub fn solve_array(&self, g: ArrayView2<f64>, d: ArrayView1<f64>) -> Result<DampedSolution> {
        let start = Instant::now();
        let normal = NormalEquations::new(g, d)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.get_num_threads())
            .build()
            .map_err(|e| TomoError::Other(e.to_string()))?;

        let solutions = pool.install(|| {
            self.lambdas
                .par_iter()
                .map(|&lambda| normal.solve(lambda))
                .collect::<Result<Vec<_>>>()
        })?;
        info!(
            unknowns = normal.len(),
            dampings = self.lambdas.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "solved damped least squares"
        );
        DampedSolution::new(self.lambdas.clone(), solutions)
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }
}
