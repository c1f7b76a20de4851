// src/engine/worker.rs

//! Per-process supervision task.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::dag::{ExecGraph, ExecutorId};
use crate::exec::ProcessHandle;

use super::ProcessSignal;

/// Wait for one process to exit, then publish the result.
///
/// The process is raced against control signals from the coordinator:
/// `Terminate` asks politely and keeps waiting, `Kill` forces it. Either one
/// marks the exit as interrupted so the executor ends `Terminated` instead
/// of `ProcFinished`.
///
/// Exactly one id is pushed onto `queue` per process, and only if this worker
/// is the one that moved the executor out of `Running`.
pub(crate) async fn supervise(
    id: ExecutorId,
    label: String,
    mut handle: Box<dyn ProcessHandle>,
    mut control: mpsc::UnboundedReceiver<ProcessSignal>,
    graph: Arc<ExecGraph>,
    queue: mpsc::UnboundedSender<ExecutorId>,
) {
    let mut interrupted = false;
    let mut control_open = true;

    loop {
        tokio::select! {
            res = handle.wait() => {
                if let Err(e) = res {
                    warn!(process = %label, error = %e, "lost track of process");
                }
                break;
            }

            signal = control.recv(), if control_open => match signal {
                Some(ProcessSignal::Terminate) => {
                    interrupted = true;
                    debug!(process = %label, "terminate requested");
                    if let Err(e) = handle.terminate() {
                        warn!(process = %label, error = %e, "failed to terminate process");
                    }
                }
                Some(ProcessSignal::Kill) => {
                    interrupted = true;
                    debug!(process = %label, "kill requested");
                    if let Err(e) = handle.kill().await {
                        warn!(process = %label, error = %e, "failed to kill process");
                    }
                }
                None => control_open = false,
            },
        }
    }

    let exit_code = handle.cleanup().await;
    info!(
        process = %label,
        exit_code,
        interrupted,
        "process exited"
    );

    let Some(executor) = graph.get(id) else {
        return;
    };
    if executor.finish_process(exit_code, interrupted) {
        // The coordinator may already be gone during a drain.
        let _ = queue.send(id);
    }
}
