use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::sync::watch;

use macroseq::exec::{BoxFuture, LaunchSpec, ProcessHandle, ProcessLauncher};

/// Exit code a fake process reports after `terminate`.
pub const TERMINATED_EXIT_CODE: i32 = 143;
/// Exit code a fake process reports after `kill`.
pub const KILLED_EXIT_CODE: i32 = 137;

/// Something that happened to a fake process, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchEvent {
    Started(String),
    TerminateRequested(String),
    Killed(String),
    Exited { program: String, code: i32 },
}

#[derive(Debug, Clone, Default)]
struct Script {
    exit_code: i32,
    /// Runs until `release`, `terminate` or `kill`.
    gated: bool,
    fail_launch: bool,
    ignore_terminate: bool,
}

#[derive(Debug, Default)]
struct Shared {
    scripts: Mutex<HashMap<String, Script>>,
    events: Mutex<Vec<LaunchEvent>>,
    launches: Mutex<Vec<LaunchSpec>>,
    running: Mutex<HashMap<String, watch::Sender<Option<i32>>>>,
    next_pid: AtomicU32,
}

impl Shared {
    fn record(&self, event: LaunchEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// A scripted process launcher.
///
/// Programs are keyed by `argv[0]`. By default a program exits immediately
/// with code 0; each program can be given another exit code, be held open
/// until released, refuse to start, or ignore `terminate`.
#[derive(Debug, Clone, Default)]
pub struct FakeLauncher {
    shared: Arc<Shared>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, program: &str, edit: impl FnOnce(&mut Script)) -> Self {
        edit(
            self.shared
                .scripts
                .lock()
                .unwrap()
                .entry(program.to_string())
                .or_default(),
        );
        self
    }

    pub fn with_exit_code(self, program: &str, code: i32) -> Self {
        self.script(program, |s| s.exit_code = code)
    }

    pub fn gated(self, program: &str) -> Self {
        self.script(program, |s| s.gated = true)
    }

    pub fn failing(self, program: &str) -> Self {
        self.script(program, |s| s.fail_launch = true)
    }

    pub fn ignoring_terminate(self, program: &str) -> Self {
        self.script(program, |s| {
            s.gated = true;
            s.ignore_terminate = true;
        })
    }

    /// Let a gated process exit with its scripted code.
    pub fn release(&self, program: &str) -> bool {
        let code = self
            .shared
            .scripts
            .lock()
            .unwrap()
            .get(program)
            .map(|s| s.exit_code)
            .unwrap_or(0);
        self.release_with(program, code)
    }

    /// Let a gated process exit with `code`.
    pub fn release_with(&self, program: &str, code: i32) -> bool {
        match self.shared.running.lock().unwrap().get(program) {
            Some(tx) => finish(tx, code),
            None => false,
        }
    }

    pub fn events(&self) -> Vec<LaunchEvent> {
        self.shared.events.lock().unwrap().clone()
    }

    /// Programs in the order they were started.
    pub fn started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                LaunchEvent::Started(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn launches(&self) -> Vec<LaunchSpec> {
        self.shared.launches.lock().unwrap().clone()
    }

    /// Position of `event` in the event log.
    pub fn position(&self, event: &LaunchEvent) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    pub fn was_started(&self, program: &str) -> bool {
        self.started().iter().any(|p| p == program)
    }

    /// Poll until `program` has been started.
    pub async fn wait_until_started(&self, program: &str) {
        while !self.was_started(program) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Poll until `event` shows up in the event log.
    pub async fn wait_for_event(&self, event: &LaunchEvent) {
        while self.position(event).is_none() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

fn finish(tx: &watch::Sender<Option<i32>>, code: i32) -> bool {
    tx.send_if_modified(|exit| {
        if exit.is_none() {
            *exit = Some(code);
            true
        } else {
            false
        }
    })
}

impl ProcessLauncher for FakeLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>> {
        let script = self
            .shared
            .scripts
            .lock()
            .unwrap()
            .get(&spec.program)
            .cloned()
            .unwrap_or_default();

        if script.fail_launch {
            return Err(anyhow!("fake launch failure for '{}'", spec.program));
        }

        let initial = if script.gated {
            None
        } else {
            Some(script.exit_code)
        };
        let (tx, rx) = watch::channel(initial);

        self.shared
            .running
            .lock()
            .unwrap()
            .insert(spec.program.clone(), tx.clone());
        self.shared.launches.lock().unwrap().push(spec.clone());
        self.shared
            .record(LaunchEvent::Started(spec.program.clone()));

        Ok(Box::new(FakeHandle {
            program: spec.program.clone(),
            pid: self.shared.next_pid.fetch_add(1, Ordering::Relaxed) + 1000,
            shared: Arc::clone(&self.shared),
            exit_tx: tx,
            exit_rx: rx,
            ignore_terminate: script.ignore_terminate,
            cleaned_up: false,
        }))
    }
}

struct FakeHandle {
    program: String,
    pid: u32,
    shared: Arc<Shared>,
    exit_tx: watch::Sender<Option<i32>>,
    exit_rx: watch::Receiver<Option<i32>>,
    ignore_terminate: bool,
    cleaned_up: bool,
}

impl ProcessHandle for FakeHandle {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn terminate(&mut self) -> Result<()> {
        self.shared
            .record(LaunchEvent::TerminateRequested(self.program.clone()));
        if !self.ignore_terminate {
            finish(&self.exit_tx, TERMINATED_EXIT_CODE);
        }
        Ok(())
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.shared.record(LaunchEvent::Killed(self.program.clone()));
            finish(&self.exit_tx, KILLED_EXIT_CODE);
            Ok(())
        })
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.exit_rx
                .wait_for(Option::is_some)
                .await
                .map(|_| ())
                .map_err(|e| anyhow!("fake process channel closed: {e}"))
        })
    }

    fn cleanup(mut self: Box<Self>) -> BoxFuture<'static, i32> {
        Box::pin(async move {
            let code = (*self.exit_rx.borrow()).unwrap_or(-1);
            self.cleaned_up = true;
            self.shared.record(LaunchEvent::Exited {
                program: self.program.clone(),
                code,
            });
            code
        })
    }
}

impl Drop for FakeHandle {
    /// Mirrors `kill_on_drop`: an aborted worker kills its process.
    fn drop(&mut self) {
        if !self.cleaned_up && self.exit_rx.borrow().is_none() {
            self.shared.record(LaunchEvent::Killed(self.program.clone()));
            finish(&self.exit_tx, KILLED_EXIT_CODE);
        }
    }
}
