//! Per-worker background monitors.
//!
//! # Responsibilities
//! - Heartbeat reader: consume `1` ticks until a `0`, an error, or the
//!   reaper asks it to stop
//! - Reaper: wait for the process, log how it ended, close the pipe via
//!   the reader, report to the policy
//!
//! Both are non-fatal to the manager; a failing worker only ends its own
//! monitors.

use std::fmt;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Arc;

use tokio::process::Child;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::ipc::{Message, Pipe, PipeError};
use crate::lifecycle::Shutdown;
use crate::manager::policy::{SupervisionPolicy, WorkerInfo};
use crate::observability::metrics;

/// How a worker's heartbeat channel ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// The worker sent `0`.
    Stopped,
    /// The channel failed after the manager started shutting down.
    ClosedDuringShutdown,
    /// The reaper closed the channel after the process exited.
    Closed,
    /// The channel failed unexpectedly; the error was logged.
    Failed(String),
}

impl HeartbeatOutcome {
    /// Whether the ending is one the manager expects and does not log.
    pub fn is_expected(&self) -> bool {
        !matches!(self, HeartbeatOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub outcome: HeartbeatOutcome,
    /// Number of `1` ticks received.
    pub beats: u64,
}

/// Why a worker process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Exited(i32),
    Signaled(i32),
    WaitFailed(String),
}

impl Termination {
    pub fn from_status(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(code), _) => Termination::Exited(code),
            (None, Some(signal)) => Termination::Signaled(signal),
            (None, None) => Termination::WaitFailed(status.to_string()),
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exit status {}", code),
            Termination::Signaled(signal) => write!(f, "killed by signal {}", signal),
            Termination::WaitFailed(e) => write!(f, "wait failed: {}", e),
        }
    }
}

/// Final record of one worker, produced exactly once by its reaper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerExit {
    pub worker: WorkerInfo,
    pub termination: Termination,
    pub heartbeat: HeartbeatReport,
}

/// Start the heartbeat reader and return the stop switch the reaper uses
/// to close the pipe.
pub(crate) fn spawn_heartbeat_reader(
    pipe: Pipe,
    worker: WorkerInfo,
    closing: Shutdown,
    policy: Arc<dyn SupervisionPolicy>,
) -> (oneshot::Sender<()>, JoinHandle<HeartbeatReport>) {
    let (stop_tx, stop_rx) = oneshot::channel();
    let handle =
        tokio::spawn(read_heartbeats(pipe, worker, closing, stop_rx, policy).in_current_span());
    (stop_tx, handle)
}

async fn read_heartbeats(
    pipe: Pipe,
    worker: WorkerInfo,
    closing: Shutdown,
    mut stop: oneshot::Receiver<()>,
    policy: Arc<dyn SupervisionPolicy>,
) -> HeartbeatReport {
    let mut beats = 0;
    let outcome = loop {
        let received = tokio::select! {
            biased;
            received = pipe.recv() => received,
            _ = &mut stop => break HeartbeatOutcome::Closed,
        };

        match received {
            Ok(Message::Alive) => {
                beats += 1;
                metrics::heartbeat_received();
                policy.on_heartbeat(&worker);
            }
            Ok(Message::Stopping) => {
                tracing::debug!(pid = worker.pid, "worker announced shutdown");
                break HeartbeatOutcome::Stopped;
            }
            Err(PipeError::Protocol(e)) => {
                tracing::warn!(pid = worker.pid, error = %e, "ignoring keepalive message");
            }
            Err(_) if closing.is_triggered() => break HeartbeatOutcome::ClosedDuringShutdown,
            Err(e) => {
                tracing::warn!(pid = worker.pid, error = %e, "error reading keepalive");
                break HeartbeatOutcome::Failed(e.to_string());
            }
        }
    };

    if let Err(e) = pipe.close() {
        tracing::debug!(pid = worker.pid, error = %e, "Failed to close worker pipe");
    }
    HeartbeatReport { outcome, beats }
}

/// Wait for the worker to exit, then shut its heartbeat reader down.
pub(crate) async fn reap(
    mut child: Child,
    worker: WorkerInfo,
    stop_heartbeat: oneshot::Sender<()>,
    heartbeat: JoinHandle<HeartbeatReport>,
    policy: Arc<dyn SupervisionPolicy>,
) -> WorkerExit {
    let termination = match child.wait().await {
        Ok(status) => Termination::from_status(status),
        Err(e) => Termination::WaitFailed(e.to_string()),
    };

    if termination.is_clean() {
        tracing::info!(pid = worker.pid, "worker {} stopped", worker.pid);
    } else {
        tracing::error!(
            pid = worker.pid,
            status = %termination,
            "worker {} wait returned error",
            worker.pid
        );
    }
    metrics::worker_exited(termination.is_clean());

    // The reader may already be gone if the worker said goodbye.
    let _ = stop_heartbeat.send(());
    let heartbeat = match heartbeat.await {
        Ok(report) => report,
        Err(e) => HeartbeatReport {
            outcome: HeartbeatOutcome::Failed(e.to_string()),
            beats: 0,
        },
    };

    let exit = WorkerExit {
        worker,
        termination,
        heartbeat,
    };
    policy.on_exit(&exit);
    exit
}
