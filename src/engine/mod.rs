// src/engine/mod.rs

//! Orchestration engine for macroseq.
//!
//! This module ties together:
//! - the run loop that drives an executor graph to completion
//!   ([`sequencer`]),
//! - the registry of running processes and their worker tasks
//!   ([`registry`], [`worker`]),
//! - process-wide forced shutdown ([`shutdown`]),
//! - the summary handed back to callers ([`report`]).

/// Control message from the coordinator to a process worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Ask the process to stop; keep waiting for it.
    Terminate,
    /// Force the process to stop.
    Kill,
}

pub mod registry;
pub mod report;
pub mod sequencer;
pub mod shutdown;
mod worker;

pub use registry::{ActiveProcess, ActiveRegistry};
pub use report::{NodeReport, RunOutcome, RunReport};
pub use sequencer::{MacroSequencer, SequencerOptions};
pub use shutdown::{Registration, ShutdownCoordinator};
