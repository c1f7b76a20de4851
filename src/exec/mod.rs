// src/exec/mod.rs

//! Process execution layer.
//!
//! - [`backend`] defines the `ProcessLauncher` / `ProcessHandle` seam the
//!   sequencer drives, and how commands map to argv.
//! - [`process`] is the `tokio::process` implementation used in production;
//!   tests swap in a fake launcher.

pub mod backend;
pub mod process;

pub use backend::{BoxFuture, LaunchSpec, ProcessHandle, ProcessLauncher};
pub use process::{TokioProcess, TokioProcessLauncher};
