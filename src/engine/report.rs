// src/engine/report.rs

use std::collections::HashMap;
use std::fmt;

use crate::config::model::NodeLocation;
use crate::dag::ExecStatus;
use crate::types::ExitCode;

/// Why a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing left to run.
    Completed,
    /// An `exit` command ended the run.
    Exited { code: Option<i32> },
    /// A finished process matched the termination condition.
    TerminationCondition { location: NodeLocation, exit_code: i32 },
    /// Cooperative cancellation was requested.
    Cancelled,
    /// The OS refused to start a process.
    LaunchFailed { location: NodeLocation, message: String },
    /// The run was halted by the shutdown coordinator.
    Interrupted,
    /// The scheduler observed an impossible state.
    ProtocolViolation { message: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Completed => write!(f, "completed"),
            RunOutcome::Exited { code: Some(code) } => write!(f, "exit command (code {code})"),
            RunOutcome::Exited { code: None } => write!(f, "exit command"),
            RunOutcome::TerminationCondition {
                location,
                exit_code,
            } => write!(
                f,
                "termination condition met by {location} (exit code {exit_code})"
            ),
            RunOutcome::Cancelled => write!(f, "cancelled"),
            RunOutcome::LaunchFailed { location, message } => {
                write!(f, "{location}: cannot execute process: {message}")
            }
            RunOutcome::Interrupted => write!(f, "interrupted by shutdown"),
            RunOutcome::ProtocolViolation { message } => write!(f, "{message}"),
        }
    }
}

/// Final state of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport {
    pub location: NodeLocation,
    pub status: ExecStatus,
    pub exit_code: Option<i32>,
}

/// What a call to `play` did.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Exit code of the last process finalized by the run, if any.
    pub last_exit_code: Option<i32>,
    /// One entry per command, in macro order.
    pub nodes: Vec<NodeReport>,
    /// Exit codes recorded against process names.
    pub exit_codes: HashMap<String, i32>,
}

impl RunReport {
    /// Result code for the whole run.
    pub fn exit_code(&self) -> i32 {
        match &self.outcome {
            RunOutcome::Completed => self.last_exit_code.unwrap_or(ExitCode::Success.code()),
            RunOutcome::Exited { code } => code
                .or(self.last_exit_code)
                .unwrap_or(ExitCode::Success.code()),
            RunOutcome::TerminationCondition { exit_code, .. } => *exit_code,
            RunOutcome::Cancelled => ExitCode::Cancelled.code(),
            RunOutcome::LaunchFailed { .. } => ExitCode::CannotExecute.code(),
            RunOutcome::Interrupted | RunOutcome::ProtocolViolation { .. } => {
                ExitCode::Fatal.code()
            }
        }
    }

    /// Status of the command with process name `name`.
    pub fn status_of(&self, name: &str) -> Option<ExecStatus> {
        self.node(name).map(|n| n.status)
    }

    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes
            .iter()
            .find(|n| n.location.name.as_deref() == Some(name))
    }

    pub fn count_in(&self, status: ExecStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }
}
