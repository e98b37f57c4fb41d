//! Team-based task scheduler.
//!
//! A [`Scheduler`] owns one rayon pool per team. [`Scheduler::scope`] starts
//! one worker per team for the duration of a closure; inside it the caller
//! builds a [`TaskGraph`] whose tasks may borrow anything that outlives the
//! scope. Task bodies receive their [`Team`] and use its parallelism for
//! nested loops.

mod graph;
mod task;
mod team;

pub use graph::TaskGraph;
pub use task::{GraphStats, TaskHandle, TaskKind, TaskLabel, TaskStatus};
pub use team::Team;

use log::debug;

use crate::error::{CholError, Result};
use crate::settings::env_usize;

/// Shape of the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Number of teams (worker threads picking tasks)
    pub num_teams: usize,
    /// Threads per team for nested parallelism
    pub team_size: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        // BLOCKCHOL_TEAMS / BLOCKCHOL_TEAM_SIZE override the defaults
        let team_size = env_usize("BLOCKCHOL_TEAM_SIZE")
            .filter(|&n| n > 0)
            .unwrap_or(1);
        let num_teams = env_usize("BLOCKCHOL_TEAMS")
            .filter(|&n| n > 0)
            .unwrap_or_else(|| {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (cores / team_size).max(1)
            });
        Self {
            num_teams,
            team_size,
        }
    }
}

/// Fixed set of teams. Create one per solver; there is no global instance.
#[derive(Debug)]
pub struct Scheduler {
    config: SchedulerConfig,
    pools: Vec<rayon::ThreadPool>,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        if config.num_teams == 0 || config.team_size == 0 {
            return Err(CholError::Scheduler(format!(
                "need at least one team of one thread, got {} x {}",
                config.num_teams, config.team_size
            )));
        }
        let pools = (0..config.num_teams)
            .map(|t| team::build_pool(t, config.team_size))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            "scheduler: {} team(s) x {} thread(s)",
            config.num_teams, config.team_size
        );
        Ok(Self { config, pools })
    }

    pub fn num_teams(&self) -> usize {
        self.pools.len()
    }

    /// Run `f` with a fresh task graph served by every team.
    ///
    /// When `f` returns (or unwinds) the graph is closed: ready work is
    /// drained, tasks that can never run are dropped, and the workers are
    /// joined before `scope` returns.
    pub fn scope<'env, R>(&self, f: impl FnOnce(&TaskGraph<'env>) -> R) -> R {
        let graph = TaskGraph::new(self.num_teams());
        let size = self.config.team_size;
        let out = std::thread::scope(|s| {
            for (id, pool) in self.pools.iter().enumerate() {
                let graph = &graph;
                s.spawn(move || {
                    let team = Team { id, size };
                    pool.install(|| graph.run_team(&team));
                });
            }
            let _close = CloseOnExit(&graph);
            f(&graph)
        });
        debug!("scheduler scope done: {:?}", graph.stats());
        out
    }
}

struct CloseOnExit<'g, 'env>(&'g TaskGraph<'env>);

impl Drop for CloseOnExit<'_, '_> {
    fn drop(&mut self) {
        self.0.close();
    }
}
