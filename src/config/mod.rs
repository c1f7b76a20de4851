// src/config/mod.rs

//! Macro descriptor loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model and the typed command nodes (`model.rs`).
//! - Load a macro file from disk (`loader.rs`).
//! - Validate references, modifiers and ordering (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_macro_path, load_and_validate, load_from_path, resolve_working_dir};
pub use model::{
    Action, ActionKind, CommandNode, MacroFile, NodeLocation, RawCommand, RawMacroFile,
    RawSettings, Settings,
};
pub use validate::validate_commands;
