// src/dag/executor.rs

//! Per-command runtime unit and its status state machine.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::dag::graph::ExecutorId;

/// Execution status of an [`Executor`].
///
/// ```text
/// Unexecuted ──► Skipped
///     │  └─────► Completed
///     ▼
///  Running ───► ProcFinished ──► Completed
///     │               │
///     └───────────────┴────────► Terminated
/// ```
///
/// `Completed`, `Skipped` and `Terminated` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecStatus {
    #[default]
    Unexecuted,
    Running,
    ProcFinished,
    Completed,
    Skipped,
    Terminated,
}

impl ExecStatus {
    /// Finished for the purpose of releasing dependents.
    pub fn is_finished(self) -> bool {
        matches!(self, ExecStatus::Completed | ExecStatus::Skipped)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecStatus::Completed | ExecStatus::Skipped | ExecStatus::Terminated
        )
    }

    pub fn can_transition_to(self, next: ExecStatus) -> bool {
        use ExecStatus::*;
        matches!(
            (self, next),
            (Unexecuted, Skipped | Completed | Running)
                | (Running, ProcFinished | Terminated)
                | (ProcFinished, Completed | Terminated)
        )
    }
}

impl fmt::Display for ExecStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecStatus::Unexecuted => "UNEXECUTED",
            ExecStatus::Running => "RUNNING",
            ExecStatus::ProcFinished => "PROC_FINISHED",
            ExecStatus::Completed => "COMPLETED",
            ExecStatus::Skipped => "SKIPPED",
            ExecStatus::Terminated => "TERMINATED",
        };
        f.write_str(s)
    }
}

/// Status plus exit code, always read and written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecState {
    pub status: ExecStatus,
    pub exit_code: Option<i32>,
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: ExecStatus,
    pub to: ExecStatus,
}

impl fmt::Display for TransitionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "illegal status transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for TransitionError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorKind {
    /// Runs its command node.
    Command,
    /// Explicit `wait` command: completes once its targets have finished.
    Wait,
    /// Synthetic join point after a group of concurrently launched commands.
    GroupWaiter,
}

/// Runtime control unit for one command node (or one group join point).
///
/// Adjacency is written only while the graph is being built; afterwards the
/// graph is shared read-only and only `state` changes.
#[derive(Debug)]
pub struct Executor {
    id: ExecutorId,
    kind: ExecutorKind,
    node: Option<usize>,
    pub(crate) predecessors: BTreeSet<ExecutorId>,
    pub(crate) successors: BTreeSet<ExecutorId>,
    pub(crate) concurrent_starts: BTreeSet<ExecutorId>,
    /// Wait targets or group members, in declaration order.
    pub(crate) awaited: Vec<ExecutorId>,
    state: Mutex<ExecState>,
}

impl Executor {
    pub(crate) fn new(id: ExecutorId, kind: ExecutorKind, node: Option<usize>) -> Self {
        Self {
            id,
            kind,
            node,
            predecessors: BTreeSet::new(),
            successors: BTreeSet::new(),
            concurrent_starts: BTreeSet::new(),
            awaited: Vec::new(),
            state: Mutex::new(ExecState::default()),
        }
    }

    pub fn id(&self) -> ExecutorId {
        self.id
    }

    pub fn kind(&self) -> ExecutorKind {
        self.kind
    }

    /// Index of the command node this executor runs (`None` for group waiters).
    pub fn node(&self) -> Option<usize> {
        self.node
    }

    pub fn predecessors(&self) -> &BTreeSet<ExecutorId> {
        &self.predecessors
    }

    pub fn successors(&self) -> &BTreeSet<ExecutorId> {
        &self.successors
    }

    pub fn concurrent_starts(&self) -> &BTreeSet<ExecutorId> {
        &self.concurrent_starts
    }

    pub fn awaited(&self) -> &[ExecutorId] {
        &self.awaited
    }

    fn lock(&self) -> MutexGuard<'_, ExecState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> ExecState {
        *self.lock()
    }

    pub fn status(&self) -> ExecStatus {
        self.lock().status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.lock().exit_code
    }

    /// Move to `next`, optionally recording an exit code.
    ///
    /// An existing exit code is kept when `exit_code` is `None`.
    pub fn transition(
        &self,
        next: ExecStatus,
        exit_code: Option<i32>,
    ) -> Result<ExecState, TransitionError> {
        let mut state = self.lock();
        let from = state.status;
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }
        state.status = next;
        if exit_code.is_some() {
            state.exit_code = exit_code;
        }
        Ok(*state)
    }

    /// Record the end of this executor's process, as seen by its worker.
    ///
    /// `interrupted` marks an exit caused by a terminate/kill request.
    /// Returns `false` if the executor had already left `Running` (e.g. it was
    /// force-terminated by a shutdown).
    pub fn finish_process(&self, exit_code: i32, interrupted: bool) -> bool {
        let mut state = self.lock();
        if state.status != ExecStatus::Running {
            return false;
        }
        state.status = if interrupted {
            ExecStatus::Terminated
        } else {
            ExecStatus::ProcFinished
        };
        state.exit_code = Some(exit_code);
        true
    }

    /// Give up on a process during shutdown: a still-running or
    /// not-yet-evaluated process becomes `Terminated`.
    ///
    /// Returns `true` if the status changed.
    pub fn abandon(&self) -> bool {
        let mut state = self.lock();
        match state.status {
            ExecStatus::Running | ExecStatus::ProcFinished => {
                state.status = ExecStatus::Terminated;
                true
            }
            _ => false,
        }
    }
}
