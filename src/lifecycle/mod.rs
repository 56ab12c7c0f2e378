//! Process lifecycle subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (role.rs):
//!     Inspect environment once → Role::Manager | Role::Worker
//!
//! Shutdown (shutdown.rs):
//!     OS signal or programmatic trigger → Shutdown token → subscribers wake
//!
//! Signals (signals.rs):
//!     First SIGINT → trigger the process's Shutdown token
//!     Second SIGINT → default disposition (process terminates)
//! ```
//!
//! # Design Decisions
//! - Role is computed once and passed explicitly, never re-read mid-run
//! - Shutdown is a level-triggered token: late subscribers still observe it
//! - Signal delivery is only one way to trip a token, so shutdown paths are
//!   testable without sending real signals

pub mod role;
pub mod shutdown;
pub mod signals;

pub use role::{Role, WORKER_ENV};
pub use shutdown::{Shutdown, ShutdownSignal};
