// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::cli::CliArgs;
use crate::config::loader::{load_and_validate, resolve_working_dir};
use crate::config::model::MacroFile;
use crate::dag::{ExecGraph, ExecutorKind, GraphBuilder};
use crate::engine::{MacroSequencer, SequencerOptions, ShutdownCoordinator};
use crate::exec::TokioProcessLauncher;
use crate::types::Modifier;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - macro loading and validation
/// - the shutdown coordinator and Ctrl-C handling
/// - the sequencer with the real process launcher
///
/// Returns the exit code the process should end with.
pub async fn run(args: CliArgs) -> Result<i32> {
    let mut macro_file = load_and_validate(&args.macro_path)
        .with_context(|| format!("loading macro {}", args.macro_path.display()))?;

    if let Some(errorcond) = args.errorcond {
        macro_file.settings.errorcond = errorcond;
    }

    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => resolve_working_dir(&args.macro_path, macro_file.settings.working_dir.as_deref()),
    };

    if args.dry_run {
        print_dry_run(&macro_file, &working_dir)?;
        return Ok(0);
    }

    let coordinator = ShutdownCoordinator::new();
    let cancel = CancellationToken::new();
    let listener = coordinator.listen_for_interrupts(cancel.clone());

    let options = SequencerOptions::from_settings(&macro_file.settings, working_dir);
    let sequencer = MacroSequencer::new(
        Arc::new(TokioProcessLauncher),
        options,
        Arc::clone(&coordinator),
    );

    let report = sequencer.play(&macro_file.commands, cancel).await;
    listener.abort();

    let report = report.with_context(|| format!("running macro {}", args.macro_path.display()))?;
    Ok(report.exit_code())
}

/// Dry-run output: settings plus every executor and its wiring.
fn print_dry_run(macro_file: &MacroFile, working_dir: &Path) -> Result<()> {
    let built = GraphBuilder::build(&macro_file.commands)?;
    let graph = &built.graph;

    println!("macroseq dry-run");
    println!("  working_dir = {}", working_dir.display());
    println!("  errorcond = {}", macro_file.settings.errorcond);
    println!(
        "  terminate_grace = {:?}",
        macro_file.settings.terminate_grace
    );
    println!();

    println!("executors ({}):", graph.len());
    for entry in graph.adjacency() {
        let marker = if entry.id == built.start { " (start)" } else { "" };
        println!("  [{}] {}{}", entry.id, describe(macro_file, graph, entry.id), marker);
        if let Some(node) = entry.node.and_then(|i| macro_file.commands.get(i)) {
            println!("      action: {}", node.action.kind());
            if node.modifier != Modifier::None {
                println!("      modifier: {}", node.modifier);
            }
            if let Some(ref guard) = node.guard {
                println!("      when: {guard}");
            }
        }
        if !entry.successors.is_empty() {
            println!("      successors: {:?}", entry.successors);
        }
        if !entry.concurrent_starts.is_empty() {
            println!("      starts with: {:?}", entry.concurrent_starts);
        }
        if !entry.awaited.is_empty() {
            println!("      awaits: {:?}", entry.awaited);
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn describe(macro_file: &MacroFile, graph: &ExecGraph, id: usize) -> String {
    let Some(executor) = graph.get(id) else {
        return format!("executor {id}");
    };
    match (executor.kind(), executor.node()) {
        (ExecutorKind::GroupWaiter, _) | (_, None) => "group waiter".to_string(),
        (_, Some(index)) => macro_file
            .commands
            .get(index)
            .map(|n| n.location.to_string())
            .unwrap_or_else(|| format!("command #{}", index + 1)),
    }
}
