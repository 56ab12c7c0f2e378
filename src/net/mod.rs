//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Shared listening socket (one per manager, inherited by every worker)
//!     → listener.rs (accept, closable from another task)
//!     → admission.rs (optional: bounded slots, keep-alive)
//!     → connection.rs (AdmittedConn, releases its slot exactly once)
//!     → Hand off to the Serve implementation
//! ```
//!
//! # Design Decisions
//! - Accept fan-out across processes is left to the kernel
//! - Admission is a blocking acquire, never a poll
//! - A slot is tied to the connection wrapper, not to the handler task, so
//!   slow handlers cannot leak capacity

pub mod admission;
pub mod connection;
pub mod listener;

pub use admission::AdmissionListener;
pub use connection::{AdmissionSlot, AdmittedConn, ConnectionId};
pub use listener::{CloseHandle, Listener, ListenerError};
