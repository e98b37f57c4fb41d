//! Harness comparing the by-blocks and unblocked Cholesky paths.

mod matrices;
mod report;

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use blockchol_core::sparse::residual_max;
use blockchol_core::{
    compare_paths, solve, BlockOrdering, CholAlgo, HierOptions, Scalar, SchedulerConfig,
    SolverSettings,
};
use clap::{Parser, ValueEnum};
use num_complex::Complex64;
use sprs::CsMat;

use crate::report::{BenchReport, PathReport};

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OrderingChoice {
    Natural,
    MinDegree,
}

#[derive(Parser, Debug)]
#[command(name = "blockchol-bench", version, about = "By-blocks vs unblocked sparse Cholesky")]
struct Cli {
    /// Matrix Market file holding a symmetric positive definite matrix
    #[arg(long, conflicts_with = "grid")]
    matrix: Option<PathBuf>,

    /// Side of the generated 2D grid Laplacian (used when no matrix is given)
    #[arg(long, default_value_t = 32)]
    grid: usize,

    /// Number of diagonal blocks
    #[arg(long, default_value_t = 8)]
    blocks: usize,

    /// Right-hand-side columns per block (0 = one chunk)
    #[arg(long, default_value_t = 0)]
    nb: usize,

    /// Number of right-hand sides
    #[arg(long, default_value_t = 4)]
    nrhs: usize,

    /// Number of teams (defaults to BLOCKCHOL_TEAMS or the core count)
    #[arg(long)]
    teams: Option<usize>,

    /// Threads per team
    #[arg(long)]
    team_size: Option<usize>,

    /// Tile size for nested blocks
    #[arg(long, default_value_t = 256)]
    leaf_size: usize,

    /// Nesting depth (0 keeps dense leaves)
    #[arg(long, default_value_t = 0)]
    depth: usize,

    #[arg(long, value_enum, default_value_t = OrderingChoice::MinDegree)]
    ordering: OrderingChoice,

    /// Factor a complex Hermitian variant
    #[arg(long)]
    complex: bool,

    /// Write the report as JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Tolerance for the path comparison (default sqrt(eps))
    #[arg(long)]
    tolerance: Option<f64>,
}

impl Cli {
    fn settings(&self) -> SolverSettings {
        let mut scheduler = SchedulerConfig::default();
        if let Some(size) = self.team_size {
            scheduler.team_size = size;
        }
        if let Some(teams) = self.teams {
            scheduler.num_teams = teams;
        }
        SolverSettings {
            hier: HierOptions {
                max_depth: self.depth,
                leaf_size: self.leaf_size,
            },
            rhs_block_cols: self.nb,
            scheduler,
            tolerance: self.tolerance,
            ..SolverSettings::default()
        }
    }
}

fn run<T: Scalar>(cli: &Cli, a: &CsMat<T>, source: String) -> Result<BenchReport> {
    let n = a.rows();
    let ordering = match cli.ordering {
        OrderingChoice::Natural => BlockOrdering::natural(a, cli.blocks),
        OrderingChoice::MinDegree => BlockOrdering::minimum_degree(a, cli.blocks),
    }
    .context("Failed to build block ordering")?;
    let b = matrices::random_rhs::<T>(n, cli.nrhs, 0x5eed);
    let settings = cli.settings();

    let mut paths = Vec::new();
    for algo in [CholAlgo::ByBlocks, CholAlgo::Unblocked] {
        let s = SolverSettings {
            algo,
            ..settings.clone()
        };
        let sol = solve(a, &ordering, &b, &s).with_context(|| format!("{:?} solve failed", algo))?;
        let residual = T::real_to_f64(residual_max(a, &sol.x, &b)?);
        let t = &sol.info.timers;
        paths.push(PathReport {
            algo: format!("{:?}", algo),
            stored: sol.info.stored,
            tasks: sol.info.tasks.completed,
            assembly_s: t.assembly.as_secs_f64(),
            factor_s: t.factorization.as_secs_f64(),
            solve_s: t.solve.as_secs_f64(),
            total_s: t.total().as_secs_f64(),
            residual,
        });
    }
    let cmp = compare_paths(a, &ordering, &b, &settings).context("Path comparison failed")?;

    Ok(BenchReport {
        source,
        scalar: if T::is_complex() { "complex" } else { "real" }.to_string(),
        n,
        nnz: a.nnz(),
        nrhs: cli.nrhs,
        blocks: ordering.ranges().num_blocks(),
        ordering: format!("{:?}", cli.ordering),
        teams: settings.scheduler.num_teams,
        team_size: settings.scheduler.team_size,
        leaf_size: cli.leaf_size,
        depth: cli.depth,
        paths,
        factor_diff: cmp.factor_diff,
        solution_diff: cmp.solution_diff,
        tolerance: cmp.tolerance,
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let report = match &cli.matrix {
        Some(path) => {
            let a = matrices::load_matrix_market(path)?;
            let source = path.display().to_string();
            if cli.complex {
                run::<Complex64>(&cli, &matrices::lift(&a), source)?
            } else {
                run::<f64>(&cli, &a, source)?
            }
        }
        None => {
            let source = format!("grid {}x{}", cli.grid, cli.grid);
            if cli.complex {
                run::<Complex64>(&cli, &matrices::grid_laplacian(cli.grid), source)?
            } else {
                run::<f64>(&cli, &matrices::grid_laplacian(cli.grid), source)?
            }
        }
    };

    report.print();
    if let Some(path) = &cli.json {
        report.save_json(path)?;
        println!("report written to {}", path.display());
    }
    if report.factor_diff > report.tolerance || report.solution_diff > report.tolerance {
        bail!(
            "paths disagree: factor diff {:.3e}, solution diff {:.3e}",
            report.factor_diff,
            report.solution_diff
        );
    }
    Ok(())
}
