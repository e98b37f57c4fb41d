//! Dependency-tracked task graph shared by the caller and the team workers.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::task::{Failure, GraphStats, TaskBody, TaskRecord, TaskStatus};
use super::{TaskHandle, TaskLabel, Team};
use crate::error::{CholError, Result};

/// Arena of tasks with explicit dependence edges.
///
/// Tasks are registered with [`create_task`](Self::create_task), become
/// eligible with [`spawn`](Self::spawn), and run on a team once every
/// predecessor has completed. Only [`wait`](Self::wait) and
/// [`wait_all`](Self::wait_all) block the caller. Neither may be called from
/// inside a task body.
pub struct TaskGraph<'env> {
    state: Mutex<GraphState<'env>>,
    cond: Condvar,
}

struct GraphState<'env> {
    tasks: Vec<TaskRecord<'env>>,
    /// One deque per team; owners pop the back, thieves the front
    ready: Vec<VecDeque<usize>>,
    next_team: usize,
    running: usize,
    /// Spawned tasks not finished yet
    outstanding: usize,
    closed: bool,
    stats: GraphStats,
    /// Failed task with the lowest block
    failure: Option<Failure>,
}

impl<'env> TaskGraph<'env> {
    pub(crate) fn new(num_teams: usize) -> Self {
        Self {
            state: Mutex::new(GraphState {
                tasks: Vec::new(),
                ready: (0..num_teams.max(1)).map(|_| VecDeque::new()).collect(),
                next_team: 0,
                running: 0,
                outstanding: 0,
                closed: false,
                stats: GraphStats::default(),
                failure: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Register a task that runs after every task in `predecessors`.
    ///
    /// The task does not run until it is spawned.
    pub fn create_task<F>(
        &self,
        label: TaskLabel,
        predecessors: &[TaskHandle],
        body: F,
    ) -> Result<TaskHandle>
    where
        F: FnOnce(&Team) -> Result<()> + Send + 'env,
    {
        let mut st = self.state.lock();
        let id = st.tasks.len();
        if let Some(p) = predecessors.iter().find(|p| p.0 >= id) {
            return Err(CholError::InvalidDependence(format!(
                "{} names unknown predecessor #{}",
                label, p.0
            )));
        }
        let body: TaskBody<'env> = Box::new(body);
        st.tasks.push(TaskRecord::new(label, body));
        st.stats.created += 1;
        for p in predecessors {
            st.link(id, p.0);
        }
        trace!("created {} (#{}) after {} task(s)", label, id, predecessors.len());
        Ok(TaskHandle(id))
    }

    /// Make `successor` wait for `predecessor`.
    ///
    /// Must be called before `successor` is spawned.
    pub fn add_dependence(&self, successor: TaskHandle, predecessor: TaskHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.check(successor)?;
        st.check(predecessor)?;
        let (s, p) = (successor.0, predecessor.0);
        if st.tasks[s].status != TaskStatus::Created {
            return Err(CholError::InvalidDependence(format!(
                "{} is already spawned",
                st.tasks[s].label
            )));
        }
        if s == p || st.depends_on(p, s) {
            return Err(CholError::GraphCycle {
                successor: s,
                predecessor: p,
            });
        }
        st.link(s, p);
        Ok(())
    }

    /// Let the task run once its predecessors complete. Spawning twice is a
    /// no-op.
    pub fn spawn(&self, handle: TaskHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.check(handle)?;
        let idx = handle.0;
        if st.tasks[idx].status != TaskStatus::Created {
            return Ok(());
        }
        st.tasks[idx].status = TaskStatus::Spawned;
        st.stats.spawned += 1;
        st.outstanding += 1;
        if st.tasks[idx].pending == 0 {
            let team = st.next_team;
            st.next_team = (team + 1) % st.ready.len();
            st.make_ready(idx, team);
        }
        drop(st);
        self.cond.notify_all();
        Ok(())
    }

    /// Create and spawn in one step.
    pub fn submit<F>(
        &self,
        label: TaskLabel,
        predecessors: &[TaskHandle],
        body: F,
    ) -> Result<TaskHandle>
    where
        F: FnOnce(&Team) -> Result<()> + Send + 'env,
    {
        let handle = self.create_task(label, predecessors, body)?;
        self.spawn(handle)?;
        Ok(handle)
    }

    /// Block until `handle` finishes.
    ///
    /// Returns the failure that made the task fail or skip, or `Stalled` if
    /// the graph can no longer make progress.
    pub fn wait(&self, handle: TaskHandle) -> Result<()> {
        let mut st = self.state.lock();
        st.check(handle)?;
        loop {
            let rec = &st.tasks[handle.0];
            match rec.status {
                TaskStatus::Completed => return Ok(()),
                TaskStatus::Failed | TaskStatus::Skipped => {
                    return Err(rec.cause.as_ref().map(|f| f.error.clone()).unwrap_or_else(|| {
                        CholError::Scheduler(format!("{} finished without a cause", rec.label))
                    }))
                }
                TaskStatus::Created => {
                    return Err(CholError::InvalidDependence(format!(
                        "{} was never spawned",
                        rec.label
                    )))
                }
                TaskStatus::Spawned | TaskStatus::Running => {}
            }
            if st.is_stalled() {
                return Err(CholError::Stalled {
                    pending: st.outstanding,
                });
            }
            self.cond.wait(&mut st);
        }
    }

    /// Block until every spawned task finishes.
    ///
    /// Reports the failure with the lowest block when any task failed.
    pub fn wait_all(&self) -> Result<()> {
        let mut st = self.state.lock();
        loop {
            if st.outstanding == 0 {
                return match &st.failure {
                    Some(f) => Err(f.error.clone()),
                    None => Ok(()),
                };
            }
            if st.is_stalled() {
                return Err(CholError::Stalled {
                    pending: st.outstanding,
                });
            }
            self.cond.wait(&mut st);
        }
    }

    /// Counters so far.
    pub fn stats(&self) -> GraphStats {
        self.state.lock().stats
    }

    /// Stop accepting idle waits; workers exit once no work is left.
    pub(crate) fn close(&self) {
        self.state.lock().closed = true;
        self.cond.notify_all();
    }

    /// Worker loop of one team.
    pub(crate) fn run_team(&self, team: &Team) {
        let mut st = self.state.lock();
        loop {
            if let Some(idx) = st.pop(team.id) {
                let rec = &mut st.tasks[idx];
                rec.status = TaskStatus::Running;
                let label = rec.label;
                let body = rec.body.take();
                st.running += 1;
                let outcome = MutexGuard::unlocked(&mut st, || execute(body, label, team));
                st.finish(idx, team.id, outcome);
                self.cond.notify_all();
                continue;
            }
            if st.closed && st.running == 0 {
                break;
            }
            self.cond.wait(&mut st);
        }
        trace!("team {} exits", team.id);
    }
}

fn execute(body: Option<TaskBody<'_>>, label: TaskLabel, team: &Team) -> Result<()> {
    trace!("team {} runs {}", team.id, label);
    let Some(body) = body else {
        return Ok(());
    };
    match catch_unwind(AssertUnwindSafe(|| body(team))) {
        Ok(outcome) => outcome,
        Err(payload) => Err(CholError::TaskPanicked {
            task: label.to_string(),
            message: panic_message(payload.as_ref()),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<'env> GraphState<'env> {
    fn check(&self, handle: TaskHandle) -> Result<()> {
        if handle.0 >= self.tasks.len() {
            return Err(CholError::InvalidDependence(format!(
                "unknown task #{}",
                handle.0
            )));
        }
        Ok(())
    }

    /// Record the edge `pred -> succ`, or inherit the outcome of a finished
    /// predecessor.
    fn link(&mut self, succ: usize, pred: usize) {
        match self.tasks[pred].status {
            TaskStatus::Completed => {}
            TaskStatus::Failed | TaskStatus::Skipped => {
                if let Some(cause) = self.tasks[pred].cause.clone() {
                    Failure::merge(&mut self.tasks[succ].cause, &cause);
                }
            }
            _ => {
                self.tasks[pred].successors.push(succ);
                self.tasks[succ].pending += 1;
            }
        }
        self.tasks[succ].predecessors.push(pred);
    }

    /// Whether `task` transitively depends on `target`.
    fn depends_on(&self, task: usize, target: usize) -> bool {
        let mut seen = vec![false; self.tasks.len()];
        let mut stack = vec![task];
        while let Some(t) = stack.pop() {
            if t == target {
                return true;
            }
            if std::mem::replace(&mut seen[t], true) {
                continue;
            }
            stack.extend(self.tasks[t].predecessors.iter().copied());
        }
        false
    }

    fn make_ready(&mut self, idx: usize, team: usize) {
        if self.tasks[idx].cause.is_some() {
            self.skip(idx);
            self.release(idx, team);
        } else {
            self.ready[team].push_back(idx);
        }
    }

    fn skip(&mut self, idx: usize) {
        let rec = &mut self.tasks[idx];
        rec.status = TaskStatus::Skipped;
        self.stats.skipped += 1;
        self.outstanding -= 1;
        if let Some(cause) = &rec.cause {
            debug!("skipping {} after failure of {}", rec.label, cause.label);
        }
    }

    fn pop(&mut self, team: usize) -> Option<usize> {
        if let Some(idx) = self.ready[team].pop_back() {
            return Some(idx);
        }
        let n = self.ready.len();
        (1..n).find_map(|k| self.ready[(team + k) % n].pop_front())
    }

    fn is_stalled(&self) -> bool {
        self.outstanding > 0 && self.running == 0 && self.ready.iter().all(VecDeque::is_empty)
    }

    fn finish(&mut self, idx: usize, team: usize, outcome: Result<()>) {
        self.running -= 1;
        self.outstanding -= 1;
        let rec = &mut self.tasks[idx];
        match outcome {
            Ok(()) => {
                rec.status = TaskStatus::Completed;
                self.stats.completed += 1;
            }
            Err(error) => {
                warn!("task {} failed: {}", rec.label, error);
                rec.status = TaskStatus::Failed;
                self.stats.failed += 1;
                let failure = Failure {
                    error,
                    label: rec.label,
                };
                Failure::merge(&mut self.failure, &failure);
                rec.cause = Some(failure);
            }
        }
        self.release(idx, team);
    }

    /// Retire a finished task and notify its successors. Successors that
    /// become ready with a failure cause are skipped in turn.
    fn release(&mut self, idx: usize, team: usize) {
        let mut stack = vec![idx];
        while let Some(i) = stack.pop() {
            let cause = self.tasks[i].cause.clone();
            let successors = std::mem::take(&mut self.tasks[i].successors);
            self.tasks[i].retire();
            for s in successors {
                let rec = &mut self.tasks[s];
                if let Some(c) = &cause {
                    Failure::merge(&mut rec.cause, c);
                }
                rec.pending -= 1;
                if rec.pending == 0 && rec.status == TaskStatus::Spawned {
                    if rec.cause.is_some() {
                        self.skip(s);
                        stack.push(s);
                    } else {
                        self.ready[team].push_back(s);
                    }
                }
            }
        }
    }
}
