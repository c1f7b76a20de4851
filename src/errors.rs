// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::config::model::NodeLocation;

#[derive(Error, Debug)]
pub enum MacroError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Every command is AFTER-deferred, so nothing can seed the run.
    #[error("macro has no command that can start the run (every command is AFTER-deferred)")]
    NoStartCommand,

    #[error("{location}: unknown process name '{name}'")]
    UnknownProcess { location: NodeLocation, name: String },

    #[error("{location}: cannot execute process: {source}")]
    Launch {
        location: NodeLocation,
        #[source]
        source: anyhow::Error,
    },

    /// An executor was observed in a status the scheduler can never produce.
    #[error("scheduler protocol violation at {location}: {detail}")]
    ProtocolViolation { location: String, detail: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, MacroError>;
