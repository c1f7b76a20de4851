// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::dag::TerminationCondition;

/// Command-line arguments for `macroseq`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "macroseq",
    version,
    about = "Run a macro of external processes with ordering, groups and waits.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the macro file (TOML).
    ///
    /// Default: `Macro.toml` in the current working directory.
    #[arg(long = "macro", value_name = "PATH", default_value = "Macro.toml")]
    pub macro_path: PathBuf,

    /// Directory processes are started in.
    ///
    /// Overrides `[settings].working_dir`; defaults to the macro file's
    /// directory.
    #[arg(long, value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Initial termination condition, e.g. `!=0`, `>=2` or `never`.
    ///
    /// Overrides `[settings].errorcond`.
    #[arg(long, value_name = "EXPR")]
    pub errorcond: Option<TerminationCondition>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `MACROSEQ_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the executor graph, but don't run anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
