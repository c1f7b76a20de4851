// src/dag/mod.rs

//! Executor graph and its construction.
//!
//! - [`graph`] holds the arena of executors and their edge sets.
//! - [`executor`] contains the per-command status state machine.
//! - [`builder`] turns an ordered command list into a wired graph.
//! - [`condition`] provides the exit-code predicates used for termination
//!   conditions and skip guards.

pub mod builder;
pub mod condition;
pub mod executor;
pub mod graph;

pub use builder::{BuiltGraph, GraphBuilder};
pub use condition::{CompareOp, Guard, TerminationCondition};
pub use executor::{ExecState, ExecStatus, Executor, ExecutorKind, TransitionError};
pub use graph::{AdjacencyEntry, ExecGraph, ExecutorId, WaitProgress};
