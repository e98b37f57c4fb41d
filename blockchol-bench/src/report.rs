//! JSON report of a harness run.

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Timings and counters of one strategy.
#[derive(Debug, Clone, Serialize)]
pub struct PathReport {
    pub algo: String,
    pub stored: usize,
    pub tasks: usize,
    pub assembly_s: f64,
    pub factor_s: f64,
    pub solve_s: f64,
    pub total_s: f64,
    pub residual: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchReport {
    pub source: String,
    pub scalar: String,
    pub n: usize,
    pub nnz: usize,
    pub nrhs: usize,
    pub blocks: usize,
    pub ordering: String,
    pub teams: usize,
    pub team_size: usize,
    pub leaf_size: usize,
    pub depth: usize,
    pub paths: Vec<PathReport>,
    pub factor_diff: f64,
    pub solution_diff: f64,
    pub tolerance: f64,
}

impl BenchReport {
    /// Save to JSON file
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create file {}", path.as_ref().display()))?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .with_context(|| format!("Failed to write JSON to {}", path.as_ref().display()))?;
        Ok(())
    }

    pub fn print(&self) {
        println!(
            "{} ({}): n = {}, nnz = {}, nrhs = {}, {} blocks, {} ordering",
            self.source, self.scalar, self.n, self.nnz, self.nrhs, self.blocks, self.ordering
        );
        println!(
            "teams: {} x {}, leaf size {}, depth {}",
            self.teams, self.team_size, self.leaf_size, self.depth
        );
        println!("{}", "-".repeat(72));
        println!(
            "{:<10} {:>8} {:>7} {:>10} {:>10} {:>10} {:>10}",
            "path", "stored", "tasks", "factor", "solve", "total", "residual"
        );
        for p in &self.paths {
            println!(
                "{:<10} {:>8} {:>7} {:>9.4}s {:>9.4}s {:>9.4}s {:>10.2e}",
                p.algo, p.stored, p.tasks, p.factor_s, p.solve_s, p.total_s, p.residual
            );
        }
        println!("{}", "-".repeat(72));
        println!(
            "max |U_blocks - U_scalar| = {:.3e}, max |X_blocks - X_scalar| = {:.3e} (tolerance {:.1e})",
            self.factor_diff, self.solution_diff, self.tolerance
        );
    }
}
