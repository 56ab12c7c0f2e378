//! Prefork TCP server library.
//!
//! One manager process binds the listening socket, then starts N copies of
//! its own executable. Each copy inherits the listener on fd 3 and a pipe
//! pair on fds 4 and 5, and runs the same [`Serve`] implementation against
//! the shared socket. The kernel spreads connections across the workers.
//!
//! # Architecture Overview
//!
//! ```text
//!   manager (PREFORK_WORKER unset)              worker (PREFORK_WORKER=1)
//!   ┌───────────────────────────┐              ┌───────────────────────────┐
//!   │ Listener::bind            │   fd 3       │ inherit: fds 3,4,5        │
//!   │ spawn N × current_exe  ───┼─────────────▶│ WorkerRuntime::run        │
//!   │                           │   fd 4 ◀ 5   │   heartbeat 1 / tick      │
//!   │ monitor: heartbeat reader◀┼──────────────┤   SIGINT → 0, close       │
//!   │ monitor: reaper (wait)    │              │   Serve::serve(listener)  │
//!   └───────────────────────────┘              └───────────────────────────┘
//! ```
//!
//! The same `main` runs in both roles; [`run`] decides which one applies to
//! the current process.

pub mod config;
pub mod error;
pub mod http;
pub mod ipc;
pub mod lifecycle;
pub mod manager;
pub mod net;
pub mod observability;
pub mod serve;
pub mod worker;

pub use config::PreforkConfig;
pub use error::{PreforkError, Result, ServeError};
pub use lifecycle::{Role, Shutdown};
pub use manager::Manager;
pub use net::{AdmissionListener, AdmittedConn, Listener, ListenerError};
pub use serve::Serve;
pub use worker::WorkerRuntime;

/// Run as manager or worker, depending on how this process was started.
///
/// In the manager this binds `address` and blocks until every worker has
/// exited. In a worker `address` and `worker_count` are ignored and
/// `serve` runs on the inherited listener.
pub async fn run<S: Serve>(serve: &S, address: &str, worker_count: usize) -> Result<()> {
    match Role::detect() {
        Role::Worker => run_worker(serve, worker::runtime::HEARTBEAT_INTERVAL).await,
        Role::Manager => Manager::new(address, worker_count).run(serve).await,
    }
}

/// [`run`] with every tunable taken from `config`.
pub async fn run_with_config<S: Serve>(role: Role, serve: &S, config: &PreforkConfig) -> Result<()> {
    match role {
        Role::Worker => run_worker(serve, config.workers.heartbeat_interval()).await,
        Role::Manager => {
            Manager::new(config.listener.bind_address.clone(), config.workers.count)
                .run(serve)
                .await
        }
    }
}

async fn run_worker<S: Serve>(serve: &S, heartbeat: std::time::Duration) -> Result<()> {
    // SAFETY: the worker marker is only set by the manager's spawner, which
    // places the listener and pipe on fds 3, 4 and 5 before exec. Nothing in
    // this process has touched those descriptors yet.
    let runtime = unsafe { WorkerRuntime::from_inherited()? };
    runtime.heartbeat_interval(heartbeat).run(serve).await
}
