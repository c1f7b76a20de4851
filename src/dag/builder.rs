// src/dag/builder.rs

//! One-shot construction of the executor graph from an ordered command list.

use std::collections::HashMap;

use tracing::debug;

use crate::config::model::{Action, CommandNode};
use crate::dag::executor::ExecutorKind;
use crate::dag::graph::{ExecGraph, ExecutorId};
use crate::errors::{MacroError, Result};
use crate::types::Modifier;

/// Output of [`GraphBuilder::build`].
#[derive(Debug)]
pub struct BuiltGraph {
    pub graph: ExecGraph,
    /// First main-stream executor; the run is seeded with it.
    pub start: ExecutorId,
}

/// Walks the commands in file order and wires:
///
/// - main-stream commands to each other (successor edges, or concurrent-start
///   edges after a `start` command or a group member),
/// - group members to a shared group waiter, which is spliced into the main
///   stream once the group ends,
/// - AFTER commands as successors of every process they reference,
/// - `wait` commands to every process they reference.
pub struct GraphBuilder<'a> {
    nodes: &'a [CommandNode],
    names: HashMap<&'a str, usize>,
    graph: ExecGraph,
    start: Option<ExecutorId>,
    last_main: Option<MainStreamTail>,
    pending_waiter: Option<ExecutorId>,
}

#[derive(Debug, Clone, Copy)]
struct MainStreamTail {
    id: ExecutorId,
    /// The next main-stream command starts alongside this one.
    concurrent: bool,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(nodes: &'a [CommandNode]) -> Self {
        let names = nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.name.as_deref().map(|name| (name, i)))
            .collect();

        Self {
            nodes,
            names,
            graph: ExecGraph::new(),
            start: None,
            last_main: None,
            pending_waiter: None,
        }
    }

    /// Build the graph for `nodes`.
    pub fn build(nodes: &'a [CommandNode]) -> Result<BuiltGraph> {
        GraphBuilder::new(nodes).run()
    }

    fn run(mut self) -> Result<BuiltGraph> {
        for index in 0..self.nodes.len() {
            self.place(index)?;
        }

        // A group at the very end still gets its join point on the stream.
        self.splice_pending_waiter();

        let start = self.start.ok_or(MacroError::NoStartCommand)?;
        debug!(
            executors = self.graph.len(),
            start, "executor graph built"
        );

        Ok(BuiltGraph {
            graph: self.graph,
            start,
        })
    }

    fn place(&mut self, index: usize) -> Result<()> {
        let nodes = self.nodes;
        let node = &nodes[index];
        let id = self.executor_for(index);

        if node.action.is_group() {
            let waiter = match self.pending_waiter {
                Some(waiter) => waiter,
                None => {
                    let waiter = self.graph.add_group_waiter();
                    self.pending_waiter = Some(waiter);
                    waiter
                }
            };
            self.graph.add_awaited(waiter, id);
        } else {
            self.splice_pending_waiter();
        }

        if node.modifier == Modifier::After {
            for name in &node.after {
                let target = self.resolve(node, name)?;
                self.graph.add_successor(target, id);
            }
            return Ok(());
        }

        if let Action::Wait { targets } = &node.action {
            for name in targets {
                let target = self.resolve(node, name)?;
                self.graph.add_awaited(id, target);
            }
        }

        self.append_main(
            id,
            node.action.is_group() || node.modifier == Modifier::Start,
        );
        Ok(())
    }

    fn append_main(&mut self, id: ExecutorId, concurrent: bool) {
        match self.last_main {
            None => {
                if self.start.is_none() {
                    self.start = Some(id);
                }
            }
            Some(tail) if tail.concurrent => self.graph.add_concurrent_start(tail.id, id),
            Some(tail) => self.graph.add_successor(tail.id, id),
        }
        self.last_main = Some(MainStreamTail { id, concurrent });
    }

    /// The group waiter becomes the main-stream tail; it is already reachable
    /// from every member through successor edges.
    fn splice_pending_waiter(&mut self) {
        if let Some(waiter) = self.pending_waiter.take() {
            self.last_main = Some(MainStreamTail {
                id: waiter,
                concurrent: false,
            });
        }
    }

    fn executor_for(&mut self, index: usize) -> ExecutorId {
        let kind = match &self.nodes[index].action {
            Action::Wait { .. } => ExecutorKind::Wait,
            _ => ExecutorKind::Command,
        };
        self.graph.get_or_create(index, kind)
    }

    fn resolve(&mut self, node: &CommandNode, name: &str) -> Result<ExecutorId> {
        let index = *self
            .names
            .get(name)
            .ok_or_else(|| MacroError::UnknownProcess {
                location: node.location.clone(),
                name: name.to_string(),
            })?;
        Ok(self.executor_for(index))
    }
}
