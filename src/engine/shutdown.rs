// src/engine/shutdown.rs

//! Process-wide forced shutdown.
//!
//! One [`ShutdownCoordinator`] is created at startup and handed to every
//! [`MacroSequencer`](super::MacroSequencer). Each `play` registers its run
//! for as long as it lasts; [`ShutdownCoordinator::shutdown_all`] kills the
//! processes of every registered run without waiting for them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::dag::ExecGraph;

use super::ProcessSignal;
use super::registry::ActiveRegistry;

/// State of one `play` call that outlives the coordinator task's stack:
/// what the shutdown coordinator needs to stop it from outside.
#[derive(Debug)]
pub(crate) struct RunControl {
    pub(crate) graph: Arc<ExecGraph>,
    pub(crate) registry: ActiveRegistry,
    /// Cancelled by a forced halt; the coordinator task stops at once.
    pub(crate) halt: CancellationToken,
}

impl RunControl {
    pub(crate) fn new(graph: Arc<ExecGraph>) -> Self {
        Self {
            graph,
            registry: ActiveRegistry::new(),
            halt: CancellationToken::new(),
        }
    }

    /// Kill every live process of this run without waiting.
    ///
    /// Safe to call more than once. Returns the labels of the processes it
    /// killed.
    pub(crate) fn halt(&self) -> Vec<String> {
        self.halt.cancel();

        let active = self.registry.take_all();
        let mut killed = Vec::with_capacity(active.len());
        for (id, process) in active {
            process.signal(ProcessSignal::Kill);
            if let Some(executor) = self.graph.get(id) {
                executor.abandon();
            }
            warn!(process = %process.label, "killed process during forced shutdown");
            killed.push(process.label);
        }

        self.registry.abort_workers();
        killed
    }
}

/// Registry of live runs, shared by every sequencer in the process.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    next_id: AtomicU64,
    runs: Mutex<HashMap<u64, Arc<RunControl>>>,
    shut_down: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Arc<RunControl>>> {
        self.runs.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `run` until the returned guard is dropped.
    ///
    /// A run registered after `shutdown_all` is halted straight away.
    pub(crate) fn register(self: &Arc<Self>, run: Arc<RunControl>) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, Arc::clone(&run));

        if self.shut_down.load(Ordering::SeqCst) {
            warn!("shutdown already in progress; halting new run");
            run.halt();
        }

        Registration {
            coordinator: Arc::clone(self),
            id,
        }
    }

    /// Number of runs currently registered.
    pub fn live_runs(&self) -> usize {
        self.lock().len()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Halt every live run: stop scheduling, kill all active processes and
    /// abort the worker pools. Does not wait for anything.
    ///
    /// Returns the number of processes killed.
    pub fn shutdown_all(&self) -> usize {
        self.shut_down.store(true, Ordering::SeqCst);

        // Halting takes registry locks; do not hold ours meanwhile.
        let runs: Vec<Arc<RunControl>> = self.lock().values().cloned().collect();

        let mut killed = 0;
        for run in runs {
            killed += run.halt().len();
        }

        if killed > 0 {
            error!(killed, "forced shutdown killed running processes");
        }
        killed
    }

    /// Wire Ctrl-C: the first one cancels `cancel`, the second one forces
    /// [`shutdown_all`](Self::shutdown_all).
    pub fn listen_for_interrupts(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for Ctrl-C");
                return;
            }
            warn!("interrupt received; cancelling macro (press Ctrl-C again to force)");
            cancel.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("second interrupt received; forcing shutdown");
                coordinator.shutdown_all();
            }
        })
    }
}

/// Keeps a run registered with the [`ShutdownCoordinator`].
#[must_use = "the run is deregistered when the registration is dropped"]
#[derive(Debug)]
pub struct Registration {
    coordinator: Arc<ShutdownCoordinator>,
    id: u64,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.coordinator.lock().remove(&self.id);
    }
}
