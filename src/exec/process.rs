// src/exec/process.rs

//! `tokio::process` backed implementation of the process backend.

use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{BoxFuture, LaunchSpec, ProcessHandle, ProcessLauncher};

/// How long `cleanup` waits for output readers once the process has exited.
/// Grandchildren that inherited the pipes can keep them open indefinitely.
const READER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Production launcher.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessLauncher;

impl ProcessLauncher for TokioProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> Result<Box<dyn ProcessHandle>> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().with_context(|| {
            format!(
                "spawning '{}' for process '{}' in {}",
                spec.program,
                spec.label,
                spec.working_dir.display()
            )
        })?;

        info!(
            process = %spec.label,
            pid = child.id(),
            program = %spec.program,
            "process started"
        );

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(spec.label.clone(), stdout, OutputStream::Stdout));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(spec.label.clone(), stderr, OutputStream::Stderr));
        }

        Ok(Box::new(TokioProcess {
            label: spec.label.clone(),
            child,
            status: None,
            readers,
        }))
    }
}

#[derive(Debug, Clone, Copy)]
enum OutputStream {
    Stdout,
    Stderr,
}

/// Forward a child's output line by line so that concurrently running
/// processes do not interleave within a line.
fn forward_lines<R>(label: String, stream: R, kind: OutputStream) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => match kind {
                    OutputStream::Stdout => println!("{line}"),
                    OutputStream::Stderr => eprintln!("{line}"),
                },
                Ok(None) => break,
                Err(e) => {
                    debug!(process = %label, error = %e, "output stream read failed");
                    break;
                }
            }
        }
    })
}

/// A running OS process plus its output readers.
#[derive(Debug)]
pub struct TokioProcess {
    label: String,
    child: Child,
    status: Option<ExitStatus>,
    readers: Vec<JoinHandle<()>>,
}

impl ProcessHandle for TokioProcess {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    #[cfg(unix)]
    fn terminate(&mut self) -> Result<()> {
        let Some(pid) = self.child.id() else {
            return Ok(());
        };
        let pid = libc::pid_t::try_from(pid).context("process id out of range")?;

        // SAFETY: sending a signal has no memory-safety preconditions; the
        // pid belongs to a child we have not reaped yet.
        let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
        if rc != 0 {
            let err = std::io::Error::last_os_error();
            return Err(err).with_context(|| format!("sending SIGTERM to '{}'", self.label));
        }
        debug!(process = %self.label, pid, "sent SIGTERM");
        Ok(())
    }

    #[cfg(not(unix))]
    fn terminate(&mut self) -> Result<()> {
        self.child
            .start_kill()
            .with_context(|| format!("terminating '{}'", self.label))
    }

    fn kill(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.child
                .kill()
                .await
                .with_context(|| format!("killing '{}'", self.label))
        })
    }

    fn wait(&mut self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let status = self
                .child
                .wait()
                .await
                .with_context(|| format!("waiting for process '{}'", self.label))?;
            self.status = Some(status);
            Ok(())
        })
    }

    fn cleanup(self: Box<Self>) -> BoxFuture<'static, i32> {
        Box::pin(async move {
            let TokioProcess {
                label,
                mut child,
                status,
                readers,
            } = *self;

            let status = match status {
                Some(status) => Some(status),
                None => child.try_wait().ok().flatten(),
            };

            for mut reader in readers {
                if tokio::time::timeout(READER_DRAIN_TIMEOUT, &mut reader)
                    .await
                    .is_err()
                {
                    warn!(process = %label, "output still open after exit; detaching reader");
                    reader.abort();
                }
            }

            let code = status.map(exit_code_of).unwrap_or(-1);
            debug!(process = %label, exit_code = code, "process cleaned up");
            code
        })
    }
}

/// Exit code, with the shell's `128 + signal` convention for signalled
/// processes on unix.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    -1
}
