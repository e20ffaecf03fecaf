// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use ndarray::{Array1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spline_tomo::core::{GeoPoint, SplineCenters, Stations, Velocity};
use spline_tomo::design::{DesignMatrix, DesignMatrixBuilder};
use spline_tomo::field::{MapExtent, MapGrid, SensitivityField};
use spline_tomo::geodesic::GeodesicSampler;
use spline_tomo::io;
use spline_tomo::solver::{log_spaced, RegularizedSolver};

fn sources() -> Stations {
    Stations::new(vec![0.0, 0.0], vec![0.0, 10.0]).unwrap()
}

fn receivers() -> Stations {
    Stations::new(vec![5.0, 5.0], vec![0.0, 10.0]).unwrap()
}

fn centers() -> SplineCenters {
    SplineCenters::new(
        vec![2.5, 2.5, 0.0, 5.0],
        vec![2.5, 7.5, 5.0, 5.0],
        3,
    )
    .unwrap()
}

fn design(npts: usize) -> DesignMatrix {
    DesignMatrixBuilder::new(sources(), receivers(), centers(), Velocity::Uniform(3500.0))
        .unwrap()
        .with_npts(npts)
        .unwrap()
        .with_threads(2)
        .build()
        .unwrap()
}

/// Two sources, two receivers, four centers: zero residuals give a zero
/// model for every positive damping value.
#[test]
fn zero_data_gives_zero_model() {
    let g = design(200);
    assert_eq!(g.matrix().dim(), (4, 4));
    assert!(g.matrix().iter().all(|v| v.is_finite()));
    assert!(
        g.matrix().iter().any(|&v| v > 0.0),
        "rays should cross the support of at least one spline"
    );

    let d = Array1::zeros(4);
    let solver = RegularizedSolver::new(log_spaced(0.1, 40.0, 6).unwrap()).unwrap();
    let solution = solver.solve(&g, d.view()).unwrap();
    assert_eq!(solution.len(), 6);
    for (lambda, m) in solution.iter() {
        assert!(
            m.iter().all(|&v| v.abs() < 1e-12),
            "lambda={} gave non-zero model {:?}",
            lambda,
            m
        );
    }
}

/// Consecutive waypoints are equally spaced along the geodesic.
#[test]
fn sampler_spacing_is_uniform() {
    let sampler = GeodesicSampler::new();
    let from = GeoPoint::new(34.0, -120.5).unwrap();
    let to = GeoPoint::new(32.0, -114.5).unwrap();
    for n in [50, 200, 1000] {
        let pts = sampler.waypoints(from, to, n).unwrap();
        assert_eq!(pts.len(), n);
        let gaps: Vec<f64> = pts
            .windows(2)
            .map(|w| sampler.distance(w[0], w[1]))
            .collect();
        let mean = sampler.distance(from, to) / (n - 1) as f64;
        for (k, gap) in gaps.iter().enumerate() {
            assert!(
                (gap - mean).abs() / mean < 0.01,
                "n={} gap {} is {} m, mean {} m",
                n,
                k,
                gap,
                mean
            );
        }
    }
}

/// Column sums of G converge as the rays are sampled more densely.
#[test]
fn design_converges_with_npts() {
    let coarse = design(500).into_array().sum_axis(Axis(0));
    let fine = design(1000).into_array().sum_axis(Axis(0));
    let largest = fine.iter().fold(0.0_f64, |a, &v| a.max(v.abs()));
    assert!(largest > 0.0);
    for (j, (c, f)) in coarse.iter().zip(fine.iter()).enumerate() {
        if f.abs() < 0.01 * largest {
            continue;
        }
        let rel = (c - f).abs() / f.abs();
        assert!(
            rel < 0.01,
            "column {} changed by {:.4}% between 500 and 1000 samples",
            j,
            rel * 100.0
        );
    }
}

/// Swapping the roles of sources and receivers leaves each ray's row unchanged.
#[test]
fn rays_are_reciprocal() {
    let forward = design(400);
    let reverse = DesignMatrixBuilder::new(receivers(), sources(), centers(), Velocity::Uniform(3500.0))
        .unwrap()
        .with_npts(400)
        .unwrap()
        .build()
        .unwrap();
    let fwd = forward.index();
    let rev = reverse.index();
    for s in 0..2 {
        for r in 0..2 {
            let a = forward.matrix().row(fwd.row(s, r));
            let b = reverse.matrix().row(rev.row(r, s));
            for (x, y) in a.iter().zip(b.iter()) {
                assert!(
                    (x - y).abs() <= 1e-6 * x.abs().max(1.0),
                    "ray ({}, {}) differs: {} vs {}",
                    s,
                    r,
                    x,
                    y
                );
            }
        }
    }
}

/// Larger damping shrinks the model and grows the misfit.
#[test]
fn l_curve_is_monotone() {
    let g = design(300);
    let mut rng = StdRng::seed_from_u64(42);
    let d: Array1<f64> = (0..g.nrows()).map(|_| rng.gen_range(-1.0..1.0)).collect();

    let solver = RegularizedSolver::new(log_spaced(0.1, 40.0, 6).unwrap()).unwrap();
    let solution = solver.solve(&g, d.view()).unwrap();
    let curve = solution.l_curve(g.matrix().view(), d.view()).unwrap();
    for pair in curve.windows(2) {
        assert!(
            pair[1].solution_norm <= pair[0].solution_norm * (1.0 + 1e-9),
            "solution norm grew from {} to {} (lambda {} -> {})",
            pair[0].solution_norm,
            pair[1].solution_norm,
            pair[0].lambda,
            pair[1].lambda
        );
        assert!(
            pair[1].residual_norm >= pair[0].residual_norm * (1.0 - 1e-9),
            "residual norm shrank from {} to {} (lambda {} -> {})",
            pair[0].residual_norm,
            pair[1].residual_norm,
            pair[0].lambda,
            pair[1].lambda
        );
    }
}

/// Build, save, reload, invert and expand onto a map.
#[test]
fn pipeline_through_files() {
    let g = design(200);
    let path = std::env::temp_dir().join("spline_tomo_verification_G.mat");
    io::save_design_matrix(&g, &path).unwrap();
    let loaded = io::load_design_matrix(&path, g.index()).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(loaded.matrix(), g.matrix());

    let mut rng = StdRng::seed_from_u64(3);
    let truth: Array1<f64> = (0..4).map(|_| rng.gen_range(-0.1..0.1)).collect();
    let d = loaded.matrix().dot(&truth);

    let solution = RegularizedSolver::new(vec![1e-3, 1.0])
        .unwrap()
        .with_events(1)
        .solve(&loaded, d.view())
        .unwrap();
    assert_eq!(solution.coefficients().dim(), (2, 4));
    assert!(solution.coefficients().iter().all(|v| v.is_finite()));

    let extent = MapExtent {
        lon_min: -2.0,
        lon_max: 12.0,
        lat_min: -2.0,
        lat_max: 7.0,
    };
    let grid = MapGrid::from_extent(extent, 15, 10).unwrap();
    let field = SensitivityField::evaluate(&grid, &centers()).unwrap();
    let maps = field.expand_all(&solution).unwrap();
    assert_eq!(maps.len(), 2);
    for (_, map) in &maps {
        assert_eq!(map.dim(), (10, 15));
        assert!(map.iter().all(|v| v.is_finite()));
    }
}
