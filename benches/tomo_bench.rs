// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use spline_tomo::core::{GeoPoint, SplineCenters, Stations, Velocity};
use spline_tomo::design::DesignMatrixBuilder;
use spline_tomo::solver::{log_spaced, RegularizedSolver};
use spline_tomo::spline::{QueryPoints, SphericalSplineBasis};

fn random_stations(rng: &mut StdRng, n: usize) -> Stations {
    let lats = (0..n).map(|_| rng.gen_range(31.0..37.0)).collect();
    let lons = (0..n).map(|_| rng.gen_range(-121.0..-114.0)).collect();
    Stations::new(lats, lons).unwrap()
}

/// Regular lattice of centers over southern California.
fn lattice_centers(per_axis: usize, scale: u32) -> SplineCenters {
    let mut lats = Vec::new();
    let mut lons = Vec::new();
    for i in 0..per_axis {
        for j in 0..per_axis {
            lats.push(31.0 + 6.0 * i as f64 / (per_axis - 1) as f64);
            lons.push(-121.0 + 7.0 * j as f64 / (per_axis - 1) as f64);
        }
    }
    SplineCenters::new(lats, lons, scale).unwrap()
}

fn builder(threads: usize) -> DesignMatrixBuilder {
    let mut rng = StdRng::seed_from_u64(11);
    let sources = random_stations(&mut rng, 10);
    let receivers = random_stations(&mut rng, 20);
    DesignMatrixBuilder::new(
        sources,
        receivers,
        lattice_centers(8, 6),
        Velocity::Uniform(3500.0),
    )
    .unwrap()
    .with_npts(1000)
    .unwrap()
    .with_threads(threads)
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// One basis function over 200k scattered points, values and derivatives.
fn bench_basis(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(5);
    let lons: Vec<f64> = (0..200_000).map(|_| rng.gen_range(-121.0..-114.0)).collect();
    let lats: Vec<f64> = (0..200_000).map(|_| rng.gen_range(31.0..37.0)).collect();
    let query = QueryPoints::new(&lons, &lats).unwrap();
    let basis = SphericalSplineBasis::new(GeoPoint::new(34.0, -117.5).unwrap(), 6).unwrap();

    let mut group = c.benchmark_group("basis_200k");
    group.bench_function("values", |b| {
        b.iter(|| black_box(basis.values(&query).unwrap()))
    });
    group.bench_function("derivatives", |b| {
        b.iter(|| black_box(basis.evaluate(&query, 5).unwrap()))
    });
    group.finish();
}

/// Design matrix: 200 rays x 64 splines x 1000 samples.
fn bench_design(c: &mut Criterion) {
    let cpus = num_cpus();
    let mut group = c.benchmark_group("design_200x64");
    group.sample_size(10);
    for &threads in &[1, cpus] {
        let b_threads = builder(threads);
        group.bench_function(format!("{}threads", threads), |b| {
            b.iter(|| black_box(b_threads.build().unwrap()))
        });
    }
    group.finish();
}

/// Damping sweep on the design matrix above.
fn bench_solve(c: &mut Criterion) {
    let g = builder(num_cpus()).build().unwrap();
    let mut rng = StdRng::seed_from_u64(9);
    let d: Array1<f64> = (0..g.nrows()).map(|_| rng.gen_range(-1.0..1.0)).collect();
    let solver = RegularizedSolver::new(log_spaced(0.1, 40.0, 6).unwrap()).unwrap();
    c.bench_function("solve_6_dampings", |b| {
        b.iter(|| black_box(solver.solve(&g, d.view()).unwrap()))
    });
}

criterion_group!(benches, bench_basis, bench_design, bench_solve);
criterion_main!(benches);
