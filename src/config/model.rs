// src/config/model.rs

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dag::condition::{Guard, TerminationCondition};
use crate::types::Modifier;

/// Top-level macro descriptor as read from a TOML file.
///
/// ```toml
/// [settings]
/// errorcond = "!=0"
///
/// [[command]]
/// action = "run"
/// name = "build"
/// args = ["cargo", "build"]
///
/// [[command]]
/// action = "shell"
/// line = "echo done"
/// after = ["build"]
/// ```
///
/// Only performs deserialization; [`MacroFile`] is the validated form.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawMacroFile {
    #[serde(default)]
    pub settings: RawSettings,

    /// Commands in file order. Order matters: it defines the main stream.
    #[serde(default)]
    pub command: Vec<RawCommand>,
}

/// `[settings]` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSettings {
    /// Working directory for launched processes, relative to the macro file.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Default termination condition, e.g. `"!=0"` or `"never"`.
    #[serde(default)]
    pub errorcond: Option<String>,

    /// How long a draining run waits after `terminate` before killing.
    #[serde(default)]
    pub terminate_grace: Option<String>,

    /// Upper bound on waiting for the worker pool to wind down.
    #[serde(default)]
    pub pool_shutdown_timeout: Option<String>,
}

/// Tag of a `[[command]]` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Run,
    Group,
    Macro,
    Shell,
    Wait,
    Errorcond,
    Exit,
    Echo,
    Comment,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Run => "run",
            ActionKind::Group => "group",
            ActionKind::Macro => "macro",
            ActionKind::Shell => "shell",
            ActionKind::Wait => "wait",
            ActionKind::Errorcond => "errorcond",
            ActionKind::Exit => "exit",
            ActionKind::Echo => "echo",
            ActionKind::Comment => "comment",
        };
        f.write_str(s)
    }
}

/// One `[[command]]` entry, before validation.
///
/// Fields are a flat union over all action kinds; validation checks that
/// each kind has the fields it needs.
#[derive(Debug, Clone, Deserialize)]
pub struct RawCommand {
    pub action: ActionKind,

    /// Process name other commands can refer to.
    #[serde(default)]
    pub name: Option<String>,

    /// argv for `run` / `group`.
    #[serde(default)]
    pub args: Vec<String>,

    /// Command line for `shell`.
    #[serde(default)]
    pub line: Option<String>,

    /// Macro file for `macro`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Processes a `wait` blocks on.
    #[serde(default)]
    pub targets: Vec<String>,

    /// Predicate for `errorcond`.
    #[serde(default)]
    pub condition: Option<String>,

    /// Explicit result code for `exit`.
    #[serde(default)]
    pub code: Option<i32>,

    /// Text for `echo` / `comment`.
    #[serde(default)]
    pub text: Option<String>,

    /// START modifier.
    #[serde(default)]
    pub start: bool,

    /// AFTER modifier: run once all of these processes have finished.
    #[serde(default)]
    pub after: Vec<String>,

    /// Skip guard, e.g. `"build==0"`.
    #[serde(default)]
    pub when: Option<String>,
}

/// Validated settings with defaults applied.
#[derive(Debug, Clone)]
pub struct Settings {
    pub working_dir: Option<PathBuf>,
    pub errorcond: TerminationCondition,
    pub terminate_grace: Duration,
    pub pool_shutdown_timeout: Duration,
}

pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_POOL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

impl Default for Settings {
    fn default() -> Self {
        Self {
            working_dir: None,
            errorcond: TerminationCondition::default(),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            pool_shutdown_timeout: DEFAULT_POOL_SHUTDOWN_TIMEOUT,
        }
    }
}

/// Where a command came from, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeLocation {
    /// 1-based position in the macro.
    pub index: usize,
    pub name: Option<String>,
}

impl fmt::Display for NodeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "command #{} '{}'", self.index, name),
            None => write!(f, "command #{}", self.index),
        }
    }
}

/// What a command does when it executes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Launch a process directly from argv.
    Run { args: Vec<String> },
    /// Launch a process as part of a concurrent group.
    Group { args: Vec<String> },
    /// Run another macro file in a child `macroseq` process.
    SubMacro { path: PathBuf },
    /// Launch a command line through the platform shell.
    Shell { line: String },
    /// Block the main stream until the named processes have finished.
    Wait { targets: Vec<String> },
    /// Replace the current termination condition.
    SetErrorCondition(TerminationCondition),
    /// End the whole run.
    Exit { code: Option<i32> },
    Echo { text: String },
    Comment { text: String },
}

impl Action {
    /// Whether executing this action starts an OS process.
    pub fn is_process(&self) -> bool {
        matches!(
            self,
            Action::Run { .. } | Action::Group { .. } | Action::SubMacro { .. } | Action::Shell { .. }
        )
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Action::Group { .. })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Run { .. } => ActionKind::Run,
            Action::Group { .. } => ActionKind::Group,
            Action::SubMacro { .. } => ActionKind::Macro,
            Action::Shell { .. } => ActionKind::Shell,
            Action::Wait { .. } => ActionKind::Wait,
            Action::SetErrorCondition(_) => ActionKind::Errorcond,
            Action::Exit { .. } => ActionKind::Exit,
            Action::Echo { .. } => ActionKind::Echo,
            Action::Comment { .. } => ActionKind::Comment,
        }
    }
}

/// A validated, immutable command descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandNode {
    pub location: NodeLocation,
    pub name: Option<String>,
    pub action: Action,
    pub modifier: Modifier,
    /// Processes an AFTER command waits for (empty otherwise).
    pub after: Vec<String>,
    pub guard: Option<Guard>,
}

impl CommandNode {
    /// Process names this command refers to (AFTER list or wait targets).
    pub fn referenced_names(&self) -> &[String] {
        match &self.action {
            Action::Wait { targets } => targets,
            _ => &self.after,
        }
    }
}

/// Validated macro.
#[derive(Debug, Clone)]
pub struct MacroFile {
    pub settings: Settings,
    pub commands: Vec<CommandNode>,
}

impl MacroFile {
    pub(crate) fn new_unchecked(settings: Settings, commands: Vec<CommandNode>) -> Self {
        Self { settings, commands }
    }
}
