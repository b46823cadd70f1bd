//! CG driver for the 7-point Poisson model problem
//!
//! Assembles the Laplacian on an `nx x ny x nz` grid, splits its rows over
//! `--partitions` in-process partitions and runs CG on every partition.
//! The right-hand side is `A * 1`, so the error against the ones vector
//! is reported next to the residual.
//!
//! Usage:
//!     cargo run --release --bin cg-driver -- --nx 30 --ny 30 --nz 30 --space threaded

use anyhow::{Context, bail};
use clap::{Parser, ValueEnum};
use math_cg::problem::{Grid, partition_rows, poisson_3d, poisson_rhs};
use math_cg::vector::write_vector;
use math_cg::{
    CgConfig, CgReport, Communicator, DistVector, ExecContext, ExecutionSpace, Serial, WorkGroup,
    cg, dot_r2, run_partitioned, waxpby,
};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "cg-driver")]
#[command(about = "Conjugate-gradient solve of the 3D Poisson model problem")]
struct Args {
    /// Grid points in x
    #[arg(long, default_value = "20")]
    nx: usize,

    /// Grid points in y
    #[arg(long, default_value = "20")]
    ny: usize,

    /// Grid points in z
    #[arg(long, default_value = "20")]
    nz: usize,

    /// Kernel execution space
    #[arg(short, long, default_value = "serial")]
    space: CliSpace,

    /// Worker threads for the threaded space (default: all cores)
    #[arg(short = 't', long)]
    threads: Option<usize>,

    /// Work groups per launch for the work-group space
    #[arg(long, default_value = "64")]
    groups: usize,

    /// Work items per group for the work-group space
    #[arg(long, default_value = "256")]
    items_per_group: usize,

    /// Number of row partitions, one thread each
    #[arg(short, long, default_value = "1")]
    partitions: usize,

    /// Path to JSON solver configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the iteration count
    #[arg(long)]
    max_iters: Option<usize>,

    /// Override the convergence tolerance
    #[arg(long)]
    tolerance: Option<f64>,

    /// Stop as soon as the tolerance is reached
    #[arg(long)]
    stop_on_convergence: bool,

    /// Write the solution to <BASE>.<partitions>.<rank>
    #[arg(long)]
    solution: Option<PathBuf>,

    /// Write a JSON report of the solve
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSpace {
    Serial,
    Threaded,
    WorkGroup,
}

/// What one partition reports back after its solve
#[derive(Debug, Serialize)]
struct PartitionRun {
    rank: usize,
    start_row: usize,
    rows: usize,
    externals: usize,
    space: String,
    report: CgReport<f64>,
    error_norm: f64,
}

#[derive(Debug, Serialize)]
struct DriverReport {
    grid: [usize; 3],
    global_rows: usize,
    config: CgConfig,
    partitions: Vec<PartitionRun>,
}

fn run<E, C>(
    ctx: ExecContext<E, C>,
    grid: &Grid,
    config: &CgConfig,
    solution: Option<&PathBuf>,
) -> anyhow::Result<PartitionRun>
where
    E: ExecutionSpace,
    C: Communicator,
{
    let rank = ctx.comm.rank();
    let (start, len) = partition_rows(grid.len(), ctx.comm.size(), rank)?;

    let mut a = poisson_3d(grid, start, len)?;
    a.make_local_matrix(&ctx.comm)?;
    let b = poisson_rhs(grid, start, len)?;
    let mut x = DistVector::new(start, len);

    let report = cg(&ctx, &a, &b, &mut x, config)?;

    let ones = DistVector::from_vec(start, vec![1.0; len]);
    let mut err = DistVector::new(start, len);
    waxpby(&ctx, 1.0, &x, -1.0, &ones, &mut err)?;
    let error_norm = dot_r2(&ctx, &err).sqrt();

    if let Some(base) = solution {
        let path = write_vector(base, &x, &ctx.comm)?;
        log::debug!("rank {}: solution written to {}", rank, path.display());
    }

    Ok(PartitionRun {
        rank,
        start_row: start,
        rows: len,
        externals: a.external_map().len(),
        space: ctx.space.describe(),
        report,
        error_norm,
    })
}

fn load_config(args: &Args) -> anyhow::Result<CgConfig> {
    let mut config = match &args.config {
        Some(path) => CgConfig::from_json_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => CgConfig::default(),
    };
    if let Some(max_iters) = args.max_iters {
        config.max_iterations = max_iters;
    }
    if let Some(tolerance) = args.tolerance {
        config.tolerance = tolerance;
    }
    if args.stop_on_convergence {
        config.stop_on_convergence = true;
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = load_config(&args)?;
    let grid = Grid::new(args.nx, args.ny, args.nz);
    if grid.is_empty() {
        bail!("grid {}x{}x{} has no points", args.nx, args.ny, args.nz);
    }
    if args.partitions == 0 {
        bail!("at least one partition is required");
    }

    println!(
        "Solving {}x{}x{} Poisson problem ({} rows) on {} partition(s), space {:?}",
        grid.nx,
        grid.ny,
        grid.nz,
        grid.len(),
        args.partitions,
        args.space
    );

    let solution = args.solution.as_ref();
    let results = run_partitioned(args.partitions, |comm| match args.space {
        CliSpace::Serial => run(ExecContext::new(Serial, comm), &grid, &config, solution),
        CliSpace::WorkGroup => {
            let space = WorkGroup::new(args.groups, args.items_per_group);
            run(ExecContext::new(space, comm), &grid, &config, solution)
        }
        #[cfg(feature = "rayon")]
        CliSpace::Threaded => {
            let space = match args.threads {
                Some(n) => math_cg::Threaded::with_threads(n)?,
                None => math_cg::Threaded::new(),
            };
            run(ExecContext::new(space, comm), &grid, &config, solution)
        }
        #[cfg(not(feature = "rayon"))]
        CliSpace::Threaded => {
            log::warn!("built without rayon, running the threaded space serially");
            run(ExecContext::new(Serial, comm), &grid, &config, solution)
        }
    });
    let partitions = results.into_iter().collect::<anyhow::Result<Vec<_>>>()?;

    let Some(root) = partitions.first() else {
        bail!("no partition reported a result");
    };
    let report = &root.report;
    println!("Space:       {}", root.space);
    println!("Iterations:  {}", report.iterations);
    println!("Residual:    {:e}", report.residual);
    println!("Error norm:  {:e}", root.error_norm);
    println!("Status:      {:?}", report.status);
    println!(
        "Times (s):   total {:.6}  matvec {:.6}  dot {:.6}  waxpby {:.6}",
        report.times.total, report.times.matvec, report.times.dot, report.times.waxpby
    );
    let broke_down = report.broke_down();

    if let Some(path) = &args.output {
        let out = DriverReport {
            grid: [grid.nx, grid.ny, grid.nz],
            global_rows: grid.len(),
            config,
            partitions,
        };
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &out)?;
        println!("Report written to {}", path.display());
    }

    if broke_down {
        bail!("CG broke down before reaching the tolerance");
    }
    Ok(())
}
