// src/config/validate.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{
    Action, ActionKind, CommandNode, MacroFile, NodeLocation, RawCommand, RawMacroFile,
    RawSettings, Settings,
};
use crate::dag::condition::{Guard, TerminationCondition};
use crate::errors::{MacroError, Result};
use crate::types::{Modifier, parse_duration};

impl TryFrom<RawMacroFile> for MacroFile {
    type Error = MacroError;

    fn try_from(raw: RawMacroFile) -> std::result::Result<Self, Self::Error> {
        let settings = convert_settings(&raw.settings)?;
        let commands = raw
            .command
            .iter()
            .enumerate()
            .map(|(i, cmd)| convert_command(i + 1, cmd))
            .collect::<Result<Vec<_>>>()?;

        validate_commands(&commands)?;
        Ok(MacroFile::new_unchecked(settings, commands))
    }
}

/// Semantic checks over an ordered command list.
///
/// Public so that programmatically built command lists get the same checks
/// as loaded ones.
pub fn validate_commands(commands: &[CommandNode]) -> Result<()> {
    ensure_has_commands(commands)?;
    let names = validate_names(commands)?;
    validate_references(commands, &names)?;
    validate_modifiers(commands)?;
    validate_ordering(commands, &names)?;
    Ok(())
}

fn convert_settings(raw: &RawSettings) -> Result<Settings> {
    let mut settings = Settings {
        working_dir: raw.working_dir.clone(),
        ..Settings::default()
    };

    if let Some(expr) = &raw.errorcond {
        settings.errorcond = expr
            .parse::<TerminationCondition>()
            .map_err(|e| MacroError::ConfigError(format!("[settings].errorcond: {e}")))?;
    }
    if let Some(s) = &raw.terminate_grace {
        settings.terminate_grace = parse_duration(s)
            .map_err(|e| MacroError::ConfigError(format!("[settings].terminate_grace: {e}")))?;
    }
    if let Some(s) = &raw.pool_shutdown_timeout {
        settings.pool_shutdown_timeout = parse_duration(s).map_err(|e| {
            MacroError::ConfigError(format!("[settings].pool_shutdown_timeout: {e}"))
        })?;
    }

    Ok(settings)
}

fn convert_command(index: usize, raw: &RawCommand) -> Result<CommandNode> {
    let location = NodeLocation {
        index,
        name: raw.name.clone(),
    };
    let err = |msg: String| MacroError::ConfigError(format!("{location}: {msg}"));

    let action = match raw.action {
        ActionKind::Run | ActionKind::Group => {
            if raw.args.is_empty() {
                return Err(err(format!("`{}` needs a non-empty `args` list", raw.action)));
            }
            if raw.action == ActionKind::Run {
                Action::Run { args: raw.args.clone() }
            } else {
                Action::Group { args: raw.args.clone() }
            }
        }
        ActionKind::Macro => Action::SubMacro {
            path: raw
                .path
                .clone()
                .ok_or_else(|| err("`macro` needs a `path`".to_string()))?,
        },
        ActionKind::Shell => Action::Shell {
            line: raw
                .line
                .clone()
                .filter(|l| !l.trim().is_empty())
                .ok_or_else(|| err("`shell` needs a non-empty `line`".to_string()))?,
        },
        ActionKind::Wait => {
            if raw.targets.is_empty() {
                return Err(err("`wait` needs at least one entry in `targets`".to_string()));
            }
            Action::Wait {
                targets: raw.targets.clone(),
            }
        }
        ActionKind::Errorcond => {
            let expr = raw
                .condition
                .as_deref()
                .ok_or_else(|| err("`errorcond` needs a `condition`".to_string()))?;
            Action::SetErrorCondition(expr.parse().map_err(err)?)
        }
        ActionKind::Exit => Action::Exit { code: raw.code },
        ActionKind::Echo => Action::Echo {
            text: raw.text.clone().unwrap_or_default(),
        },
        ActionKind::Comment => Action::Comment {
            text: raw.text.clone().unwrap_or_default(),
        },
    };

    let modifier = match (raw.start, raw.after.is_empty()) {
        (true, false) => {
            return Err(err("`start` and `after` cannot be combined".to_string()));
        }
        (true, true) => Modifier::Start,
        (false, false) => Modifier::After,
        (false, true) => Modifier::None,
    };

    let guard = raw
        .when
        .as_deref()
        .map(|s| s.parse::<Guard>().map_err(err))
        .transpose()?;

    Ok(CommandNode {
        location,
        name: raw.name.clone(),
        action,
        modifier,
        after: raw.after.clone(),
        guard,
    })
}

fn ensure_has_commands(commands: &[CommandNode]) -> Result<()> {
    if commands.is_empty() {
        return Err(MacroError::ConfigError(
            "macro must contain at least one [[command]] entry".to_string(),
        ));
    }
    Ok(())
}

/// Process names must be unique; returns name → command position.
fn validate_names(commands: &[CommandNode]) -> Result<HashMap<&str, usize>> {
    let mut names = HashMap::new();
    for (i, cmd) in commands.iter().enumerate() {
        let Some(name) = cmd.name.as_deref() else {
            continue;
        };
        if name.trim().is_empty() {
            return Err(MacroError::ConfigError(format!(
                "{}: process name must not be empty",
                cmd.location
            )));
        }
        if let Some(prev) = names.insert(name, i) {
            return Err(MacroError::ConfigError(format!(
                "{}: process name '{}' already used by {}",
                cmd.location, name, commands[prev].location
            )));
        }
    }
    Ok(names)
}

fn validate_references(commands: &[CommandNode], names: &HashMap<&str, usize>) -> Result<()> {
    for cmd in commands {
        for target in cmd.referenced_names() {
            if !names.contains_key(target.as_str()) {
                return Err(MacroError::UnknownProcess {
                    location: cmd.location.clone(),
                    name: target.clone(),
                });
            }
            if cmd.name.as_deref() == Some(target.as_str()) {
                return Err(MacroError::ConfigError(format!(
                    "{}: command cannot wait for itself",
                    cmd.location
                )));
            }
        }
        if let Some(guard) = &cmd.guard {
            if !names.contains_key(guard.process.as_str()) {
                return Err(MacroError::UnknownProcess {
                    location: cmd.location.clone(),
                    name: guard.process.clone(),
                });
            }
        }
    }
    Ok(())
}

fn validate_modifiers(commands: &[CommandNode]) -> Result<()> {
    for cmd in commands {
        if cmd.modifier != Modifier::After {
            continue;
        }
        let kind = cmd.action.kind();
        if matches!(kind, ActionKind::Errorcond | ActionKind::Wait | ActionKind::Group) {
            return Err(MacroError::ConfigError(format!(
                "{}: `{}` commands must stay on the main stream and cannot use `after`",
                cmd.location, kind
            )));
        }
    }

    if commands.iter().all(|c| c.modifier == Modifier::After) {
        return Err(MacroError::NoStartCommand);
    }
    Ok(())
}

/// Reject macros whose ordering constraints can never all be met, e.g. a
/// `wait` on a process that is itself AFTER-deferred behind a later
/// main-stream command.
///
/// Edge direction: "must start/finish first" -> dependent.
fn validate_ordering(commands: &[CommandNode], names: &HashMap<&str, usize>) -> Result<()> {
    let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
    let mut previous_main: Option<usize> = None;

    for (i, cmd) in commands.iter().enumerate() {
        graph.add_node(i);

        for target in cmd.referenced_names() {
            if let Some(&dep) = names.get(target.as_str()) {
                graph.add_edge(dep, i, ());
            }
        }

        if cmd.modifier != Modifier::After {
            if let Some(prev) = previous_main {
                graph.add_edge(prev, i, ());
            }
            previous_main = Some(i);
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(MacroError::ConfigError(format!(
            "{}: ordering constraints form a cycle; the macro could never finish",
            commands[cycle.node_id()].location
        ))),
    }
}
