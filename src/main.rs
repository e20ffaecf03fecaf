// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use ndarray::{s, Array3, Axis};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use spline_tomo::core::{RayIndex, SplineCenters, Velocity};
use spline_tomo::design::{DesignMatrix, DesignMatrixBuilder, DEFAULT_NPTS};
use spline_tomo::field::{MapExtent, MapGrid, SensitivityField};
use spline_tomo::io;
use spline_tomo::solver::{log_spaced, DampedSolution, RegularizedSolver};

#[derive(Parser)]
#[command(
    name = "spline-tomo",
    about = "Spherical spline ray-path tomography"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the design matrix G for every source-receiver ray
    Design {
        #[command(flatten)]
        stations: StationArgs,
        #[command(flatten)]
        basis: BasisArgs,
        #[command(flatten)]
        ray: RayArgs,

        /// Output path for G (.npy or .mat)
        #[arg(short = 'o', long, default_value = "G.npy")]
        output: PathBuf,
    },
    /// Solve the damped least-squares problem for a sweep of damping values
    Invert {
        #[command(flatten)]
        stations: StationArgs,

        /// Design matrix written by `design` (.npy or .mat)
        #[arg(long)]
        matrix: PathBuf,

        #[command(flatten)]
        damping: DampingArgs,

        /// Output path for the damped solutions (.npy or .mat)
        #[arg(short = 'o', long, default_value = "delta_m.mat")]
        output: PathBuf,
    },
    /// Evaluate the basis on a map grid and expand solved coefficients
    Field {
        #[command(flatten)]
        basis: BasisArgs,
        #[command(flatten)]
        map: MapArgs,

        /// Damped solutions written by `invert` to expand into maps
        #[arg(long)]
        solution: Option<PathBuf>,

        /// Output path for the sensitivity field (.npy or .mat)
        #[arg(short = 'o', long, default_value = "spline_sensitivity.npy")]
        output: PathBuf,
    },
    /// Run design, inversion and field evaluation in one pass
    Run {
        #[command(flatten)]
        stations: StationArgs,
        #[command(flatten)]
        basis: BasisArgs,
        #[command(flatten)]
        ray: RayArgs,
        #[command(flatten)]
        damping: DampingArgs,
        #[command(flatten)]
        map: MapArgs,

        /// Output directory
        #[arg(short = 'o', long, default_value = ".")]
        out_dir: PathBuf,
    },
}

#[derive(Args)]
struct StationArgs {
    /// Source table: `lon lat index` rows after one header line
    #[arg(long)]
    sources: PathBuf,

    /// Receiver table: `lon lat index` rows after one header line
    #[arg(long)]
    receivers: PathBuf,
}

#[derive(Args)]
struct BasisArgs {
    /// Spline center table: `lon lat` rows, no header
    #[arg(long)]
    centers: PathBuf,

    /// Spline scale q (0-10)
    #[arg(long, default_value = "8")]
    scale: u32,

    /// Number of Rayon worker threads
    #[arg(long)]
    threads: Option<usize>,
}

#[derive(Args)]
struct RayArgs {
    /// Samples per ray
    #[arg(long, default_value_t = DEFAULT_NPTS)]
    npts: usize,

    /// Uniform velocity in m/s
    #[arg(long, default_value = "3500")]
    velocity: f64,

    /// Per-center velocities, one value per line (overrides --velocity)
    #[arg(long)]
    velocity_file: Option<PathBuf>,

    /// Also save the waypoint tensor (rays, npts, [lat, lon])
    #[arg(long)]
    waypoints: Option<PathBuf>,
}

#[derive(Args)]
struct DampingArgs {
    /// Measurement vector, one residual per ray
    #[arg(long)]
    measurements: PathBuf,

    /// Smallest damping value
    #[arg(long, default_value = "0.1")]
    lambda_min: f64,

    /// Largest damping value
    #[arg(long, default_value = "40")]
    lambda_max: f64,

    /// Number of log-spaced damping values
    #[arg(long, default_value = "6")]
    num_lambdas: usize,

    /// Use only the first N events
    #[arg(long)]
    events: Option<usize>,

    /// Number of Rayon worker threads for the solve
    #[arg(long = "solve-threads")]
    threads: Option<usize>,
}

#[derive(Args)]
struct MapArgs {
    /// Grid nodes along longitude
    #[arg(long, default_value = "100")]
    numx: usize,

    /// Grid nodes along latitude
    #[arg(long, default_value = "100")]
    numy: usize,

    /// Map extent as lon_min,lon_max,lat_min,lat_max
    #[arg(long, default_value = "-121,-114,31,37", allow_hyphen_values = true)]
    extent: String,
}

fn parse_extent(s: &str) -> Result<MapExtent> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("invalid --extent: expected comma-separated floats")?;
    if parts.len() != 4 {
        bail!("--extent has {} components, expected 4", parts.len());
    }
    Ok(MapExtent {
        lon_min: parts[0],
        lon_max: parts[1],
        lat_min: parts[2],
        lat_max: parts[3],
    })
}

fn load_centers(basis: &BasisArgs) -> Result<SplineCenters> {
    io::load_centers(&basis.centers, basis.scale)
        .with_context(|| format!("loading centers from {}", basis.centers.display()))
}

fn load_velocity(ray: &RayArgs) -> Result<Velocity> {
    match &ray.velocity_file {
        Some(path) => {
            let v = io::load_measurements(path)
                .with_context(|| format!("loading velocities from {}", path.display()))?;
            Ok(Velocity::PerCenter(v.to_vec()))
        }
        None => Ok(Velocity::Uniform(ray.velocity)),
    }
}

fn ray_index(stations: &StationArgs) -> Result<RayIndex> {
    let sources = io::load_stations(&stations.sources)
        .with_context(|| format!("loading sources from {}", stations.sources.display()))?;
    let receivers = io::load_stations(&stations.receivers)
        .with_context(|| format!("loading receivers from {}", stations.receivers.display()))?;
    Ok(RayIndex::new(sources.len(), receivers.len()))
}

fn build_design(stations: &StationArgs, basis: &BasisArgs, ray: &RayArgs) -> Result<DesignMatrix> {
    let sources = io::load_stations(&stations.sources)
        .with_context(|| format!("loading sources from {}", stations.sources.display()))?;
    let receivers = io::load_stations(&stations.receivers)
        .with_context(|| format!("loading receivers from {}", stations.receivers.display()))?;
    let centers = load_centers(basis)?;
    info!(
        sources = sources.len(),
        receivers = receivers.len(),
        splines = centers.len(),
        scale = basis.scale,
        "loaded geometry"
    );

    let mut builder = DesignMatrixBuilder::new(sources, receivers, centers, load_velocity(ray)?)?
        .with_npts(ray.npts)?;
    if let Some(threads) = basis.threads {
        builder = builder.with_threads(threads);
    }

    let g = match &ray.waypoints {
        Some(path) => {
            let paths = builder.ray_paths()?;
            io::save_ray_paths(&paths, path)
                .with_context(|| format!("writing waypoints to {}", path.display()))?;
            builder.build_from_paths(&paths)?
        }
        None => builder.build()?,
    };
    Ok(g)
}

fn invert(g: &DesignMatrix, damping: &DampingArgs) -> Result<DampedSolution> {
    let d = io::load_measurements(&damping.measurements).with_context(|| {
        format!(
            "loading measurements from {}",
            damping.measurements.display()
        )
    })?;
    let lambdas = log_spaced(damping.lambda_min, damping.lambda_max, damping.num_lambdas)?;
    let mut solver = RegularizedSolver::new(lambdas)?;
    if let Some(events) = damping.events {
        solver = solver.with_events(events);
    }
    if let Some(threads) = damping.threads {
        solver = solver.with_threads(threads);
    }
    let solution = solver.solve(g, d.view())?;

    let rows = damping
        .events
        .map_or(g.nrows(), |k| g.index().rows_for_events(k));
    let reduced = g.matrix().slice(s![..rows, ..]);
    for p in solution.l_curve(reduced, d.slice(s![..rows]))? {
        info!(
            lambda = p.lambda,
            solution_norm = p.solution_norm,
            residual_norm = p.residual_norm,
            "l-curve"
        );
    }
    Ok(solution)
}

fn evaluate_field(basis: &BasisArgs, map: &MapArgs) -> Result<SensitivityField> {
    let centers = load_centers(basis)?;
    let grid = MapGrid::from_extent(parse_extent(&map.extent)?, map.numx, map.numy)?;
    let field = match basis.threads {
        Some(threads) => rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()?
            .install(|| SensitivityField::evaluate(&grid, &centers))?,
        None => SensitivityField::evaluate(&grid, &centers)?,
    };
    Ok(field)
}

/// Stack one expanded map per damping value into `(k, rows, cols)`.
fn save_maps(field: &SensitivityField, solution: &DampedSolution, path: &Path) -> Result<()> {
    let maps = field.expand_all(solution)?;
    let (rows, cols, _) = field.values().dim();
    let mut stacked = Array3::zeros((maps.len(), rows, cols));
    for (mut slot, (_, map)) in stacked.axis_iter_mut(Axis(0)).zip(&maps) {
        slot.assign(map);
    }
    io::save_array(&stacked, path, "maps")
        .with_context(|| format!("writing maps to {}", path.display()))?;
    info!(count = maps.len(), path = %path.display(), "saved velocity maps");
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Design {
            stations,
            basis,
            ray,
            output,
        } => {
            let g = build_design(&stations, &basis, &ray)?;
            io::save_design_matrix(&g, &output)
                .with_context(|| format!("writing G to {}", output.display()))?;
        }
        Command::Invert {
            stations,
            matrix,
            damping,
            output,
        } => {
            let index = ray_index(&stations)?;
            let g = io::load_design_matrix(&matrix, index)
                .with_context(|| format!("loading G from {}", matrix.display()))?;
            let solution = invert(&g, &damping)?;
            io::save_damped_solution(&solution, &output)
                .with_context(|| format!("writing solutions to {}", output.display()))?;
        }
        Command::Field {
            basis,
            map,
            solution,
            output,
        } => {
            let field = evaluate_field(&basis, &map)?;
            io::save_field(&field, &output)
                .with_context(|| format!("writing field to {}", output.display()))?;
            if let Some(path) = solution {
                let solution = io::load_damped_solution(&path)
                    .with_context(|| format!("loading solutions from {}", path.display()))?;
                save_maps(&field, &solution, &output.with_file_name("maps.npy"))?;
            }
        }
        Command::Run {
            stations,
            basis,
            ray,
            damping,
            map,
            out_dir,
        } => {
            if !out_dir.is_dir() {
                bail!("output directory {} does not exist", out_dir.display());
            }
            let g = build_design(&stations, &basis, &ray)?;
            io::save_design_matrix(&g, &out_dir.join("G.npy"))?;
            let solution = invert(&g, &damping)?;
            io::save_damped_solution(&solution, &out_dir.join("delta_m.mat"))?;
            let field = evaluate_field(&basis, &map)?;
            io::save_field(&field, &out_dir.join("spline_sensitivity.npy"))?;
            save_maps(&field, &solution, &out_dir.join("maps.npy"))?;
        }
    }

    Ok(())
}
