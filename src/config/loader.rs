// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{MacroFile, RawMacroFile};
use crate::errors::Result;

/// Load a macro file from a given path and return the raw `RawMacroFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation (references, ordering, etc.). Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawMacroFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let raw: RawMacroFile = toml::from_str(&contents)?;

    Ok(raw)
}

/// Load a macro file from path and run validation.
///
/// - Reads TOML.
/// - Converts every `[[command]]` into a typed [`CommandNode`](super::CommandNode).
/// - Checks for:
///   - unknown or duplicate process names,
///   - modifier misuse (`start` + `after`, deferred `wait`/`errorcond`),
///   - ordering cycles that would stall the run,
///   - at least one command that can start the run.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<MacroFile> {
    let raw = load_from_path(&path)?;
    let macro_file = MacroFile::try_from(raw)?;
    Ok(macro_file)
}

/// Default macro path: `Macro.toml` in the current working directory.
pub fn default_macro_path() -> PathBuf {
    PathBuf::from("Macro.toml")
}

/// Resolve the directory processes run in.
///
/// A relative `[settings].working_dir` is taken relative to the macro file's
/// directory; without one, the macro file's directory itself is used.
pub fn resolve_working_dir(macro_path: &Path, configured: Option<&Path>) -> PathBuf {
    let base = match macro_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };

    match configured {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => base.join(dir),
        None => base,
    }
}
