//! Teams: one worker thread driving a rayon pool.

use faer::Par;

use crate::error::{CholError, Result};

/// Execution context handed to every task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Team {
    /// Team index in `[0, num_teams)`
    pub id: usize,
    /// Threads in the team's pool
    pub size: usize,
}

impl Team {
    /// Parallelism for kernels run inside a task of this team.
    pub fn parallelism(&self) -> Par {
        if self.size > 1 {
            Par::rayon(self.size)
        } else {
            Par::Seq
        }
    }
}

pub(crate) fn build_pool(team: usize, size: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(size)
        .thread_name(move |i| format!("blockchol-team{}-{}", team, i))
        .build()
        .map_err(|e| CholError::Scheduler(format!("team {}: {}", team, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_follows_size() {
        assert!(matches!(Team { id: 0, size: 1 }.parallelism(), Par::Seq));
        assert_eq!(Team { id: 1, size: 4 }.parallelism().degree(), 4);
    }

    #[test]
    fn test_pool_has_requested_threads() {
        let pool = build_pool(0, 3).unwrap();
        assert_eq!(pool.current_num_threads(), 3);
    }
}
