// src/engine/registry.rs

//! Live-process bookkeeping for one sequencer run.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::dag::ExecutorId;

use super::ProcessSignal;

/// Control side of one supervised process.
#[derive(Debug)]
pub struct ActiveProcess {
    pub label: String,
    control: mpsc::UnboundedSender<ProcessSignal>,
}

impl ActiveProcess {
    /// Forward `signal` to the worker. Returns `false` if the worker is gone.
    pub fn signal(&self, signal: ProcessSignal) -> bool {
        self.control.send(signal).is_ok()
    }
}

#[derive(Debug, Default)]
struct Inner {
    processes: BTreeMap<ExecutorId, ActiveProcess>,
    workers: JoinSet<()>,
}

/// Executors whose process is running, plus the pool of worker tasks
/// supervising them.
///
/// Both sit behind one lock so a process is never visible in the map without
/// its worker being in the pool. The lock is never held across an await.
#[derive(Debug, Default)]
pub struct ActiveRegistry {
    inner: Mutex<Inner>,
}

impl ActiveRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record a started process and spawn its worker into the pool.
    pub fn insert<F>(
        &self,
        id: ExecutorId,
        label: String,
        control: mpsc::UnboundedSender<ProcessSignal>,
        worker: F,
    ) where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut inner = self.lock();
        inner.workers.spawn(worker);
        inner.processes.insert(id, ActiveProcess { label, control });
    }

    pub fn remove(&self, id: ExecutorId) -> Option<ActiveProcess> {
        let mut inner = self.lock();
        let removed = inner.processes.remove(&id);
        // Finished workers would otherwise pile up until the run ends.
        while inner.workers.try_join_next().is_some() {}
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.lock().processes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().processes.len()
    }

    /// Empty the registry, handing every entry to the caller.
    pub fn take_all(&self) -> Vec<(ExecutorId, ActiveProcess)> {
        let mut inner = self.lock();
        std::mem::take(&mut inner.processes).into_iter().collect()
    }

    /// Detach the worker pool so it can be awaited without holding the lock.
    pub fn take_workers(&self) -> JoinSet<()> {
        std::mem::take(&mut self.lock().workers)
    }

    /// Abort every worker. Dropping a worker drops its process handle, which
    /// kills the process.
    pub fn abort_workers(&self) {
        let mut inner = self.lock();
        if !inner.workers.is_empty() {
            debug!(workers = inner.workers.len(), "aborting worker pool");
        }
        inner.workers.abort_all();
    }
}
