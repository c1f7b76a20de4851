// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap};

use crate::dag::executor::{ExecStatus, Executor, ExecutorKind};

/// Index of an executor inside an [`ExecGraph`].
pub type ExecutorId = usize;

/// Result of checking a wait target list or group member list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitProgress {
    /// At least one awaited executor is not finished yet.
    Pending { remaining: usize },
    /// All awaited executors are `Completed` or `Skipped`; carries the last
    /// exit code any of them recorded.
    Done { exit_code: Option<i32> },
}

/// Arena of executors with their three edge sets.
///
/// Successor edges are always mirrored in the target's predecessor set; all
/// edge changes go through the methods below so the two sides never drift.
#[derive(Debug, Default)]
pub struct ExecGraph {
    executors: Vec<Executor>,
    by_node: HashMap<usize, ExecutorId>,
}

/// Comparable copy of one executor's wiring, used for diagnostics and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdjacencyEntry {
    pub id: ExecutorId,
    pub kind: ExecutorKind,
    pub node: Option<usize>,
    pub predecessors: BTreeSet<ExecutorId>,
    pub successors: BTreeSet<ExecutorId>,
    pub concurrent_starts: BTreeSet<ExecutorId>,
    pub awaited: Vec<ExecutorId>,
}

impl ExecGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }

    pub fn get(&self, id: ExecutorId) -> Option<&Executor> {
        self.executors.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Executor> {
        self.executors.iter()
    }

    /// Executor running the command at `node` (0-based position), if created.
    pub fn executor_for_node(&self, node: usize) -> Option<ExecutorId> {
        self.by_node.get(&node).copied()
    }

    /// Return the executor for `node`, creating it with `kind` if needed.
    pub fn get_or_create(&mut self, node: usize, kind: ExecutorKind) -> ExecutorId {
        if let Some(id) = self.by_node.get(&node) {
            return *id;
        }
        let id = self.push(kind, Some(node));
        self.by_node.insert(node, id);
        id
    }

    pub fn add_group_waiter(&mut self) -> ExecutorId {
        self.push(ExecutorKind::GroupWaiter, None)
    }

    fn push(&mut self, kind: ExecutorKind, node: Option<usize>) -> ExecutorId {
        let id = self.executors.len();
        self.executors.push(Executor::new(id, kind, node));
        id
    }

    /// `to` runs after `from` finishes.
    pub fn add_successor(&mut self, from: ExecutorId, to: ExecutorId) {
        self.executors[from].successors.insert(to);
        self.executors[to].predecessors.insert(from);
    }

    pub fn remove_successor(&mut self, from: ExecutorId, to: ExecutorId) {
        self.executors[from].successors.remove(&to);
        self.executors[to].predecessors.remove(&from);
    }

    /// `to` starts as soon as `from` has started.
    pub fn add_concurrent_start(&mut self, from: ExecutorId, to: ExecutorId) {
        self.executors[from].concurrent_starts.insert(to);
    }

    /// Make `on` a wait target (or group member) of `waiter`, and release
    /// `waiter` whenever `on` finishes.
    pub fn add_awaited(&mut self, waiter: ExecutorId, on: ExecutorId) {
        if !self.executors[waiter].awaited.contains(&on) {
            self.executors[waiter].awaited.push(on);
        }
        self.add_successor(on, waiter);
    }

    /// Whether every predecessor has finished (`Completed` or `Skipped`).
    pub fn predecessors_finished(&self, id: ExecutorId) -> bool {
        self.executors[id]
            .predecessors
            .iter()
            .all(|p| self.executors[*p].status().is_finished())
    }

    /// Check the awaited executors of a wait / group waiter.
    pub fn wait_progress(&self, id: ExecutorId) -> WaitProgress {
        let mut remaining = 0;
        let mut exit_code = None;

        for awaited in &self.executors[id].awaited {
            let state = self.executors[*awaited].snapshot();
            if !state.status.is_finished() {
                remaining += 1;
            } else if state.exit_code.is_some() {
                exit_code = state.exit_code;
            }
        }

        if remaining > 0 {
            WaitProgress::Pending { remaining }
        } else {
            WaitProgress::Done { exit_code }
        }
    }

    /// Ids of executors currently in `status`.
    pub fn in_status(&self, status: ExecStatus) -> Vec<ExecutorId> {
        self.executors
            .iter()
            .filter(|e| e.status() == status)
            .map(|e| e.id())
            .collect()
    }

    pub fn adjacency(&self) -> Vec<AdjacencyEntry> {
        self.executors
            .iter()
            .map(|e| AdjacencyEntry {
                id: e.id(),
                kind: e.kind(),
                node: e.node(),
                predecessors: e.predecessors.clone(),
                successors: e.successors.clone(),
                concurrent_starts: e.concurrent_starts.clone(),
                awaited: e.awaited.clone(),
            })
            .collect()
    }
}
