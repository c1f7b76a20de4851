// src/exec/backend.rs

//! Pluggable process backend abstraction.
//!
//! The sequencer talks to a [`ProcessLauncher`] instead of spawning OS
//! processes itself. Production code uses
//! [`TokioProcessLauncher`](super::process::TokioProcessLauncher); tests can
//! provide a launcher whose handles complete on demand.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use anyhow::{Context, Result, bail};

use crate::config::model::Action;

/// Boxed future returned by [`ProcessHandle`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Everything needed to start one process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Name used in logs (process name, or the command position).
    pub label: String,
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
}

impl LaunchSpec {
    /// Build the launch spec for a process-backed action.
    ///
    /// Returns `Ok(None)` for actions that do not start a process.
    pub fn for_action(action: &Action, label: &str, working_dir: &Path) -> Result<Option<Self>> {
        let (program, args) = match action {
            Action::Run { args } | Action::Group { args } => {
                let Some((program, rest)) = args.split_first() else {
                    bail!("empty argument list");
                };
                (program.clone(), rest.to_vec())
            }
            Action::Shell { line } => shell_command(line),
            Action::SubMacro { path } => {
                let exe = std::env::current_exe()
                    .context("locating the macroseq executable for a sub-macro")?;
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    working_dir.join(path)
                };
                (
                    exe.to_string_lossy().into_owned(),
                    vec![
                        "--macro".to_string(),
                        path.to_string_lossy().into_owned(),
                        "--working-dir".to_string(),
                        working_dir.to_string_lossy().into_owned(),
                    ],
                )
            }
            _ => return Ok(None),
        };

        Ok(Some(Self {
            label: label.to_string(),
            program,
            args,
            working_dir: working_dir.to_path_buf(),
        }))
    }
}

/// Platform shell invocation for a command line.
fn shell_command(line: &str) -> (String, Vec<String>) {
    if cfg!(windows) {
        ("cmd".to_string(), vec!["/C".to_string(), line.to_string()])
    } else {
        ("sh".to_string(), vec!["-c".to_string(), line.to_string()])
    }
}

/// Starts processes.
pub trait ProcessLauncher: Send + Sync {
    /// Start the process described by `spec`.
    ///
    /// Fails if the OS cannot create the process.
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>>;
}

/// A started process, owned by the worker that waits on it.
pub trait ProcessHandle: Send {
    /// OS process id, if the process has one and has not been reaped.
    fn id(&self) -> Option<u32>;

    /// Ask the process to stop. Best-effort and non-blocking.
    fn terminate(&mut self) -> Result<()>;

    /// Force the process to stop.
    fn kill(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Suspend until the process exits. Must be cancel-safe: the worker
    /// drops and re-creates this future while it handles control signals.
    fn wait(&mut self) -> BoxFuture<'_, Result<()>>;

    /// Reap output readers and return the final exit code. Called exactly
    /// once, after `wait` has resolved.
    fn cleanup(self: Box<Self>) -> BoxFuture<'static, i32>;
}
