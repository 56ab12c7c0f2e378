//! Supervision policy hooks.
//!
//! Workers are started once and never replaced: a crashed worker stays
//! gone, a hung worker is not detected, and the worker count never
//! changes. A [`SupervisionPolicy`] observes spawn, heartbeat and exit
//! events and is the place to hang restart or eviction logic later.

use crate::manager::monitor::WorkerExit;

/// Identity of one spawned worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerInfo {
    /// Position in the spawn order, starting at 0.
    pub index: usize,
    pub pid: u32,
}

pub trait SupervisionPolicy: Send + Sync + 'static {
    fn on_spawn(&self, _worker: &WorkerInfo) {}

    fn on_heartbeat(&self, _worker: &WorkerInfo) {}

    fn on_exit(&self, _exit: &WorkerExit) {}
}

/// Default policy: log and leave the pool shrunk.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRestart;

impl SupervisionPolicy for NoRestart {
    fn on_exit(&self, exit: &WorkerExit) {
        if !exit.termination.is_clean() {
            tracing::warn!(
                worker = exit.worker.index,
                pid = exit.worker.pid,
                "Worker will not be restarted"
            );
        }
    }
}
