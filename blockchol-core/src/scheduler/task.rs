//! Task handles, labels and records.

use std::fmt;

use super::Team;
use crate::error::{CholError, Result};

/// Token for a task in a [`TaskGraph`](super::TaskGraph) arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle(pub(crate) usize);

/// What a task does; used in logs and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Dense Cholesky of a diagonal block
    Factor,
    /// Triangular solve of an off-diagonal block against its diagonal factor
    Panel,
    /// Trailing update of a block
    Update,
    /// Triangular solve of a right-hand-side block
    Solve,
    /// Update of a right-hand-side block by an off-diagonal factor block
    Propagate,
    /// Completion marker with no work
    Join,
    /// Caller-defined work
    Other,
}

/// Kind plus the block the task works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskLabel {
    pub kind: TaskKind,
    pub block: usize,
}

impl TaskLabel {
    pub fn new(kind: TaskKind, block: usize) -> Self {
        Self { kind, block }
    }
}

impl fmt::Display for TaskLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self.kind {
            TaskKind::Factor => "factor",
            TaskKind::Panel => "panel",
            TaskKind::Update => "update",
            TaskKind::Solve => "solve",
            TaskKind::Propagate => "propagate",
            TaskKind::Join => "join",
            TaskKind::Other => "task",
        };
        write!(f, "{}[{}]", name, self.block)
    }
}

/// Lifecycle of a task record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Created,
    Spawned,
    Running,
    Completed,
    Failed,
    Skipped,
}

/// Counters over the lifetime of a graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub created: usize,
    pub spawned: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Error of a failed task together with the task's label.
#[derive(Debug, Clone)]
pub(crate) struct Failure {
    pub(crate) error: CholError,
    pub(crate) label: TaskLabel,
}

impl Failure {
    /// Keep whichever failure sits on the lower block.
    pub(crate) fn merge(current: &mut Option<Failure>, other: &Failure) {
        let replace = match current {
            Some(f) => other.label.block < f.label.block,
            None => true,
        };
        if replace {
            *current = Some(other.clone());
        }
    }
}

pub(crate) type TaskBody<'env> = Box<dyn FnOnce(&Team) -> Result<()> + Send + 'env>;

pub(crate) struct TaskRecord<'env> {
    pub(crate) label: TaskLabel,
    pub(crate) body: Option<TaskBody<'env>>,
    pub(crate) predecessors: Vec<usize>,
    pub(crate) successors: Vec<usize>,
    /// Predecessors not finished yet
    pub(crate) pending: usize,
    pub(crate) status: TaskStatus,
    /// Failure that failed this task or made it skip
    pub(crate) cause: Option<Failure>,
}

impl<'env> TaskRecord<'env> {
    pub(crate) fn new(label: TaskLabel, body: TaskBody<'env>) -> Self {
        Self {
            label,
            body: Some(body),
            predecessors: Vec::new(),
            successors: Vec::new(),
            pending: 0,
            status: TaskStatus::Created,
            cause: None,
        }
    }

    /// Drop the body and edge lists once the task is finished.
    pub(crate) fn retire(&mut self) {
        self.body = None;
        self.predecessors = Vec::new();
        self.successors = Vec::new();
    }
}
