//! Manager process: bind once, fork workers, supervise until they exit.
//!
//! # Data Flow
//! ```text
//! Manager::run
//!     → Listener::bind(address)
//!     → worker_count == 0: serve in this process
//!     → otherwise, per worker:
//!         PipeFds::pair → spawn.rs (fds 3, 4, 5 + PREFORK_WORKER)
//!         monitor.rs heartbeat reader ← manager half of the pipe
//!         monitor.rs reaper ← child.wait()
//!     → return once every reaper has finished
//! ```
//!
//! # Design Decisions
//! - The manager never accepts connections while workers exist
//! - Nothing is restarted; see [`policy`] for the hook points
//! - An interrupt only flips `closing`, which quiets heartbeat errors;
//!   workers receive the same interrupt through the process group

pub mod monitor;
pub mod policy;
pub mod spawn;

pub use monitor::{HeartbeatOutcome, HeartbeatReport, Termination, WorkerExit};
pub use policy::{NoRestart, SupervisionPolicy, WorkerInfo};
pub use spawn::WorkerSpawner;

use std::os::fd::AsFd;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::Instrument;

use crate::error::{PreforkError, Result};
use crate::ipc::{Pipe, PipeFds};
use crate::lifecycle::{signals, Role, Shutdown};
use crate::net::{Listener, ListenerError};
use crate::observability::metrics;
use crate::serve::Serve;

/// Supervisor for a pool of worker processes sharing one listener.
pub struct Manager {
    address: String,
    worker_count: usize,
    spawner: Option<WorkerSpawner>,
    policy: Arc<dyn SupervisionPolicy>,
    closing: Shutdown,
    handle_signals: bool,
}

impl Manager {
    pub fn new(address: impl Into<String>, worker_count: usize) -> Self {
        Self {
            address: address.into(),
            worker_count,
            spawner: None,
            policy: Arc::new(NoRestart),
            closing: Shutdown::new(),
            handle_signals: true,
        }
    }

    /// Override how workers are started. Defaults to re-executing the
    /// current binary with the same arguments.
    pub fn with_spawner(mut self, spawner: WorkerSpawner) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn with_policy(mut self, policy: Arc<dyn SupervisionPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Whether SIGINT should mark the manager as closing.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Token flipped when the manager starts shutting down.
    pub fn closing(&self) -> Shutdown {
        self.closing.clone()
    }

    /// Bind, start workers and wait for all of them to exit.
    ///
    /// Worker failures are logged, never returned. Only setup errors
    /// (bind, pipe creation, spawn) and a single-process serve error are.
    pub async fn run<S: Serve>(self, serve: &S) -> Result<()> {
        let span = Role::Manager.span();
        self.run_inner(serve).instrument(span).await
    }

    async fn run_inner<S: Serve>(self, serve: &S) -> Result<()> {
        let listener = Listener::bind(&self.address).await?;
        match listener.local_addr() {
            Ok(addr) => tracing::info!("listening on {}", addr),
            Err(_) => tracing::info!("listening on {}", self.address),
        }

        if self.worker_count == 0 {
            return self.serve_in_process(listener, serve).await;
        }

        let listener = listener.into_std().map_err(|e| match e {
            ListenerError::Adopt(io) => PreforkError::ListenerFd(io),
            other => PreforkError::Listener(other),
        })?;
        let spawner = match self.spawner {
            Some(spawner) => spawner,
            None => WorkerSpawner::current_exe().map_err(PreforkError::Spawn)?,
        };

        let interrupt = if self.handle_signals {
            Some(signals::on_interrupt(self.closing.clone()).map_err(PreforkError::Signal)?)
        } else {
            None
        };

        tracing::info!("starting {} workers", self.worker_count);
        let mut reapers = JoinSet::new();
        for index in 0..self.worker_count {
            let (manager_half, worker_half) = match PipeFds::pair() {
                Ok(pair) => pair,
                Err(e) => return Err(abandon_batch(reapers, PreforkError::Pipe(e))),
            };

            let child = match spawner.spawn(listener.as_fd(), &worker_half) {
                Ok(child) => child,
                Err(e) => return Err(abandon_batch(reapers, PreforkError::Spawn(e))),
            };
            drop(worker_half);

            let worker = WorkerInfo {
                index,
                pid: child.id().unwrap_or_default(),
            };
            let pipe = match Pipe::from_fds(manager_half) {
                Ok(pipe) => pipe,
                Err(e) => return Err(abandon_batch(reapers, PreforkError::Pipe(e))),
            };

            self.policy.on_spawn(&worker);
            metrics::worker_spawned();
            tracing::debug!(worker = index, pid = worker.pid, "started worker");

            let (stop_heartbeat, heartbeat) = monitor::spawn_heartbeat_reader(
                pipe,
                worker,
                self.closing.clone(),
                self.policy.clone(),
            );
            reapers.spawn(
                monitor::reap(child, worker, stop_heartbeat, heartbeat, self.policy.clone())
                    .in_current_span(),
            );
        }

        while let Some(res) = reapers.join_next().await {
            if let Err(e) = res {
                tracing::error!(error = %e, "Worker monitor panicked");
            }
        }

        if let Some(interrupt) = interrupt {
            interrupt.abort();
        }
        drop(listener);
        Ok(())
    }

    async fn serve_in_process<S: Serve>(&self, listener: Listener, serve: &S) -> Result<()> {
        tracing::info!("worker count is 0, running in single process mode");

        let close = listener.close_handle();
        let interrupt = if self.handle_signals {
            Some(signals::on_interrupt(self.closing.clone()).map_err(PreforkError::Signal)?)
        } else {
            None
        };
        let mut closing = self.closing.subscribe();
        let closer = tokio::spawn(
            async move {
                closing.recv().await;
                close.close();
            }
            .in_current_span(),
        );

        let result = serve.serve(listener).await;

        closer.abort();
        if let Some(interrupt) = interrupt {
            interrupt.abort();
        }

        match result {
            Ok(()) => Ok(()),
            Err(e) if self.closing.is_triggered() => {
                tracing::debug!(error = %e, "Serve error during shutdown ignored");
                Ok(())
            }
            Err(e) => Err(PreforkError::Serve(e)),
        }
    }
}

/// Stop starting workers. Those already running keep their reapers, which
/// a dropped `JoinSet` would abort.
fn abandon_batch<T: 'static>(mut reapers: JoinSet<T>, err: PreforkError) -> PreforkError {
    reapers.detach_all();
    err
}
