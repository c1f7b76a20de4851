// src/engine/sequencer.rs

//! The macro run loop.
//!
//! One coordinator task per `play` call pulls executor ids off an unbounded
//! work queue and moves each executor one step along its state machine.
//! Process-backed commands are handed to a worker task (see
//! [`supervise`](super::worker::supervise)) which pushes the id back onto the
//! same queue once the process exits.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::model::{
    Action, CommandNode, DEFAULT_POOL_SHUTDOWN_TIMEOUT, DEFAULT_TERMINATE_GRACE, Settings,
};
use crate::dag::{
    ExecState, ExecStatus, Executor, ExecutorId, ExecutorKind, GraphBuilder, TerminationCondition,
    WaitProgress,
};
use crate::errors::{MacroError, Result};
use crate::exec::{LaunchSpec, ProcessLauncher};
use crate::types::Modifier;

use super::ProcessSignal;
use super::report::{NodeReport, RunOutcome, RunReport};
use super::shutdown::{RunControl, ShutdownCoordinator};
use super::worker::supervise;

/// Knobs for one sequencer.
#[derive(Debug, Clone)]
pub struct SequencerOptions {
    /// Directory processes are started in.
    pub working_dir: PathBuf,
    /// Termination condition in effect when a run starts.
    pub errorcond: TerminationCondition,
    /// How long draining waits after `Terminate` before sending `Kill`.
    pub terminate_grace: Duration,
    /// How long draining waits after `Kill` before aborting workers.
    pub pool_shutdown_timeout: Duration,
}

impl SequencerOptions {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            errorcond: TerminationCondition::default(),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            pool_shutdown_timeout: DEFAULT_POOL_SHUTDOWN_TIMEOUT,
        }
    }

    pub fn from_settings(settings: &Settings, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            errorcond: settings.errorcond,
            terminate_grace: settings.terminate_grace,
            pool_shutdown_timeout: settings.pool_shutdown_timeout,
        }
    }
}

/// Executes macros.
///
/// A sequencer can `play` any number of macros, one after another or
/// concurrently; each call builds its own executor graph and discards it at
/// the end.
pub struct MacroSequencer {
    launcher: Arc<dyn ProcessLauncher>,
    options: SequencerOptions,
    coordinator: Arc<ShutdownCoordinator>,
    runs: Mutex<Vec<Arc<RunControl>>>,
}

impl fmt::Debug for MacroSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MacroSequencer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl MacroSequencer {
    pub fn new(
        launcher: Arc<dyn ProcessLauncher>,
        options: SequencerOptions,
        coordinator: Arc<ShutdownCoordinator>,
    ) -> Self {
        Self {
            launcher,
            options,
            coordinator,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Processes currently running across all in-flight `play` calls.
    pub fn active_process_count(&self) -> usize {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|run| run.registry.len())
            .sum()
    }

    /// Run `nodes` to the end.
    ///
    /// Only a graph-build failure is returned as an error; every other way a
    /// run can end is described by [`RunReport::outcome`]. When this returns,
    /// no process started by the run is still running.
    pub async fn play(&self, nodes: &[CommandNode], cancel: CancellationToken) -> Result<RunReport> {
        let built = GraphBuilder::build(nodes)?;
        let control = Arc::new(RunControl::new(Arc::new(built.graph)));

        self.track(&control);
        let registration = self.coordinator.register(Arc::clone(&control));

        let (queue, mut rx) = mpsc::unbounded_channel();
        let mut run = Run {
            nodes,
            control: Arc::clone(&control),
            launcher: self.launcher.as_ref(),
            working_dir: &self.options.working_dir,
            cancel: &cancel,
            queue,
            queued: HashSet::new(),
            condition: self.options.errorcond,
            exit_codes: HashMap::new(),
            last_exit_code: None,
        };

        info!(
            commands = nodes.len(),
            executors = control.graph.len(),
            working_dir = %self.options.working_dir.display(),
            "macro started"
        );

        run.enqueue(built.start);
        let outcome = run.drive(&mut rx).await;

        if outcome == RunOutcome::Interrupted {
            // A forced halt may have raced with a launch; repeat it so nothing
            // started after the halt survives.
            control.halt();
            let mut workers = control.registry.take_workers();
            while workers.join_next().await.is_some() {}
        } else {
            self.drain(&control).await;
        }

        let report = RunReport {
            outcome,
            last_exit_code: run.last_exit_code,
            nodes: node_reports(nodes, &control),
            exit_codes: run.exit_codes,
        };

        drop(registration);
        self.untrack(&control);
        debug_assert!(control.registry.is_empty());

        match &report.outcome {
            RunOutcome::Completed | RunOutcome::Exited { .. } => info!(
                outcome = %report.outcome,
                exit_code = report.exit_code(),
                "macro finished"
            ),
            _ => warn!(
                outcome = %report.outcome,
                exit_code = report.exit_code(),
                "macro aborted"
            ),
        }

        Ok(report)
    }

    fn track(&self, control: &Arc<RunControl>) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(control));
    }

    fn untrack(&self, control: &Arc<RunControl>) {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|run| !Arc::ptr_eq(run, control));
    }

    /// Graceful end of a run: terminate, then kill, then abort.
    ///
    /// Every executor still in the registry ends `Terminated`, including one
    /// whose process exited on its own before its completion was processed.
    async fn drain(&self, control: &RunControl) {
        let active = control.registry.take_all();
        let mut workers = control.registry.take_workers();

        if !active.is_empty() {
            info!(processes = active.len(), "draining active processes");
            for (_, process) in &active {
                process.signal(ProcessSignal::Terminate);
            }
        }

        if tokio::time::timeout(self.options.terminate_grace, join_all(&mut workers))
            .await
            .is_err()
        {
            warn!(
                grace = ?self.options.terminate_grace,
                "processes still running after terminate; killing"
            );
            for (_, process) in &active {
                process.signal(ProcessSignal::Kill);
            }

            if tokio::time::timeout(self.options.pool_shutdown_timeout, join_all(&mut workers))
                .await
                .is_err()
            {
                error!(
                    timeout = ?self.options.pool_shutdown_timeout,
                    "worker pool did not stop in time; aborting workers"
                );
                workers.shutdown().await;
            }
        }

        for (id, process) in active {
            if let Some(executor) = control.graph.get(id) {
                executor.abandon();
                debug!(
                    process = %process.label,
                    status = %executor.status(),
                    "process drained"
                );
            }
        }
    }
}

async fn join_all(workers: &mut JoinSet<()>) {
    while workers.join_next().await.is_some() {}
}

fn node_reports(nodes: &[CommandNode], control: &RunControl) -> Vec<NodeReport> {
    nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            let state = control
                .graph
                .executor_for_node(index)
                .and_then(|id| control.graph.get(id))
                .map(Executor::snapshot)
                .unwrap_or_default();
            NodeReport {
                location: node.location.clone(),
                status: state.status,
                exit_code: state.exit_code,
            }
        })
        .collect()
}

enum Step {
    Continue,
    Stop(RunOutcome),
}

/// Coordinator-side state of one `play` call.
struct Run<'a> {
    nodes: &'a [CommandNode],
    control: Arc<RunControl>,
    launcher: &'a dyn ProcessLauncher,
    working_dir: &'a Path,
    cancel: &'a CancellationToken,
    queue: mpsc::UnboundedSender<ExecutorId>,
    /// Ids the coordinator has queued and not yet taken back off. Workers
    /// bypass this set; their ids are never in it.
    queued: HashSet<ExecutorId>,
    condition: TerminationCondition,
    exit_codes: HashMap<String, i32>,
    last_exit_code: Option<i32>,
}

impl<'a> Run<'a> {
    async fn drive(&mut self, rx: &mut mpsc::UnboundedReceiver<ExecutorId>) -> RunOutcome {
        loop {
            if self.control.halt.is_cancelled() {
                return RunOutcome::Interrupted;
            }
            if self.cancel.is_cancelled() {
                info!("cancellation requested; stopping macro");
                return RunOutcome::Cancelled;
            }
            if self.control.registry.is_empty() && rx.is_empty() {
                self.log_unreached();
                return RunOutcome::Completed;
            }

            let id = tokio::select! {
                biased;
                _ = self.control.halt.cancelled() => continue,
                _ = self.cancel.cancelled() => continue,
                next = rx.recv() => match next {
                    Some(id) => id,
                    // Unreachable while `self.queue` is alive.
                    None => return RunOutcome::Interrupted,
                },
            };
            self.queued.remove(&id);

            match self.dispatch(id) {
                Ok(Step::Continue) => {}
                Ok(Step::Stop(outcome)) => return outcome,
                Err(MacroError::Launch { location, source }) => {
                    let message = format!("{source:#}");
                    error!(node = %location, error = %message, "cannot execute process");
                    return RunOutcome::LaunchFailed { location, message };
                }
                Err(e) => {
                    error!(error = %e, "aborting macro");
                    return RunOutcome::ProtocolViolation {
                        message: e.to_string(),
                    };
                }
            }
        }
    }

    fn enqueue(&mut self, id: ExecutorId) {
        if self.queued.insert(id) {
            // The receiver lives as long as the run loop.
            let _ = self.queue.send(id);
        }
    }

    fn dispatch(&mut self, id: ExecutorId) -> Result<Step> {
        let graph = Arc::clone(&self.control.graph);
        let Some(executor) = graph.get(id) else {
            return Err(self.violation(id, "unknown executor id"));
        };

        match executor.status() {
            status @ (ExecStatus::Completed | ExecStatus::Skipped | ExecStatus::Terminated) => {
                self.control.registry.remove(id);
                debug!(executor = %self.describe(id), %status, "already settled; ignoring");
                Ok(Step::Continue)
            }
            ExecStatus::ProcFinished => self.finalize(executor),
            ExecStatus::Unexecuted => self.execute(executor),
            ExecStatus::Running => Err(self.violation(id, "dequeued while RUNNING")),
        }
    }

    fn execute(&mut self, executor: &Executor) -> Result<Step> {
        match executor.kind() {
            ExecutorKind::GroupWaiter => self.execute_wait(executor, None),
            ExecutorKind::Wait => {
                let node = self.node_of(executor)?;
                self.execute_wait(executor, Some(node))
            }
            ExecutorKind::Command => {
                let node = self.node_of(executor)?;
                self.execute_command(executor, node)
            }
        }
    }

    /// Wait commands and group waiters: finish once every predecessor has,
    /// otherwise leave the status alone and wait to be queued again.
    ///
    /// A wait is queued by each of its targets, but it also sits on the main
    /// stream behind the previous command, which need not be a target.
    fn execute_wait(&mut self, executor: &Executor, node: Option<&CommandNode>) -> Result<Step> {
        if !self.control.graph.predecessors_finished(executor.id()) {
            debug!(executor = %self.describe(executor.id()), "predecessors still running");
            return Ok(Step::Continue);
        }

        let exit_code = match self.control.graph.wait_progress(executor.id()) {
            WaitProgress::Pending { remaining } => {
                debug!(executor = %self.describe(executor.id()), remaining, "still waiting");
                return Ok(Step::Continue);
            }
            WaitProgress::Done { exit_code } => exit_code,
        };

        if let Some(node) = node {
            if let Some(step) = self.check_guard(executor, node)? {
                return Ok(step);
            }
        }

        self.transition(executor, ExecStatus::Completed, exit_code)?;
        if let (Some(name), Some(code)) = (node.and_then(|n| n.name.as_ref()), exit_code) {
            self.exit_codes.insert(name.clone(), code);
        }
        debug!(
            executor = %self.describe(executor.id()),
            exit_code,
            "wait complete"
        );

        self.release(executor, true);
        Ok(Step::Continue)
    }

    fn execute_command(&mut self, executor: &Executor, node: &CommandNode) -> Result<Step> {
        if node.modifier == Modifier::After && !self.control.graph.predecessors_finished(executor.id())
        {
            debug!(node = %node.location, "dependencies still running");
            return Ok(Step::Continue);
        }

        if let Some(step) = self.check_guard(executor, node)? {
            return Ok(step);
        }

        match &node.action {
            Action::Comment { text } => {
                debug!(node = %node.location, "{text}");
                self.complete_sync(executor)
            }
            Action::Echo { text } => {
                println!("{text}");
                self.complete_sync(executor)
            }
            Action::SetErrorCondition(condition) => {
                info!(
                    node = %node.location,
                    from = %self.condition,
                    to = %condition,
                    "termination condition changed"
                );
                self.condition = *condition;
                self.complete_sync(executor)
            }
            Action::Exit { code } => {
                self.transition(executor, ExecStatus::Completed, *code)?;
                info!(node = %node.location, code, "exit command reached");
                Ok(Step::Stop(RunOutcome::Exited { code: *code }))
            }
            Action::Wait { .. } => Err(self.violation(
                executor.id(),
                "wait command scheduled as a plain command",
            )),
            Action::Run { .. } | Action::Group { .. } | Action::SubMacro { .. } | Action::Shell { .. } => {
                self.launch(executor, node)
            }
        }
    }

    /// Cancellation and skip-guard checkpoint before a command does anything.
    fn check_guard(&mut self, executor: &Executor, node: &CommandNode) -> Result<Option<Step>> {
        if self.cancel.is_cancelled() {
            info!(node = %node.location, "cancellation requested; not starting command");
            return Ok(Some(Step::Stop(RunOutcome::Cancelled)));
        }

        let Some(guard) = &node.guard else {
            return Ok(None);
        };
        if guard.evaluate(&self.exit_codes) {
            return Ok(None);
        }

        info!(node = %node.location, %guard, "guard not satisfied; skipping");
        self.transition(executor, ExecStatus::Skipped, None)?;
        self.release(executor, true);
        Ok(Some(Step::Continue))
    }

    fn complete_sync(&mut self, executor: &Executor) -> Result<Step> {
        self.transition(executor, ExecStatus::Completed, None)?;
        self.release(executor, true);
        Ok(Step::Continue)
    }

    fn launch(&mut self, executor: &Executor, node: &CommandNode) -> Result<Step> {
        let id = executor.id();
        let label = node
            .name
            .clone()
            .unwrap_or_else(|| format!("#{}", node.location.index));

        let launch_error = |source: anyhow::Error| MacroError::Launch {
            location: node.location.clone(),
            source,
        };

        let spec = LaunchSpec::for_action(&node.action, &label, self.working_dir)
            .map_err(launch_error)?
            .ok_or_else(|| self.violation(id, "action does not start a process"))?;
        let handle = self.launcher.launch(&spec).map_err(launch_error)?;

        self.transition(executor, ExecStatus::Running, None)?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let worker = supervise(
            id,
            label.clone(),
            handle,
            control_rx,
            Arc::clone(&self.control.graph),
            self.queue.clone(),
        );
        self.control.registry.insert(id, label, control_tx, worker);
        debug!(node = %node.location, action = %node.action.kind(), "command running");

        for next in executor.concurrent_starts() {
            self.enqueue(*next);
        }
        Ok(Step::Continue)
    }

    /// Settle a process whose worker reported it finished.
    fn finalize(&mut self, executor: &Executor) -> Result<Step> {
        self.control.registry.remove(executor.id());
        let state = self.transition(executor, ExecStatus::Completed, None)?;
        let node = self.node_of(executor)?;
        let code = state.exit_code.unwrap_or(-1);

        if let Some(name) = &node.name {
            self.exit_codes.insert(name.clone(), code);
        }
        self.last_exit_code = Some(code);

        if self.condition.matches(code) {
            error!(
                node = %node.location,
                exit_code = code,
                condition = %self.condition,
                "termination condition met; aborting macro"
            );
            return Ok(Step::Stop(RunOutcome::TerminationCondition {
                location: node.location.clone(),
                exit_code: code,
            }));
        }

        debug!(node = %node.location, exit_code = code, "process completed");
        // Concurrent starts were released when the process started.
        self.release(executor, false);
        Ok(Step::Continue)
    }

    fn release(&mut self, executor: &Executor, with_concurrent: bool) {
        for next in executor.successors() {
            self.enqueue(*next);
        }
        if with_concurrent {
            for next in executor.concurrent_starts() {
                self.enqueue(*next);
            }
        }
    }

    fn transition(
        &self,
        executor: &Executor,
        next: ExecStatus,
        exit_code: Option<i32>,
    ) -> Result<ExecState> {
        executor
            .transition(next, exit_code)
            .map_err(|e| self.violation(executor.id(), e.to_string()))
    }

    fn node_of(&self, executor: &Executor) -> Result<&'a CommandNode> {
        let nodes = self.nodes;
        executor
            .node()
            .and_then(|index| nodes.get(index))
            .ok_or_else(|| self.violation(executor.id(), "executor has no command"))
    }

    fn describe(&self, id: ExecutorId) -> String {
        match self
            .control
            .graph
            .get(id)
            .and_then(Executor::node)
            .and_then(|index| self.nodes.get(index))
        {
            Some(node) => node.location.to_string(),
            None => format!("group waiter #{id}"),
        }
    }

    fn violation(&self, id: ExecutorId, detail: impl Into<String>) -> MacroError {
        MacroError::ProtocolViolation {
            location: self.describe(id),
            detail: detail.into(),
        }
    }

    fn log_unreached(&self) {
        let unreached = self.control.graph.in_status(ExecStatus::Unexecuted);
        if !unreached.is_empty() {
            let names: Vec<String> = unreached.iter().map(|id| self.describe(*id)).collect();
            debug!(?names, "commands never reached");
        }
    }
}
