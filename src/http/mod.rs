//! Demo HTTP service run by each worker.
//!
//! # Data Flow
//! ```text
//! shared Listener
//!     → AdmissionListener (connection cap, keep-alive)
//!     → incoming.rs (axum::serve::Listener adapter)
//!     → server.rs (Axum router, TraceLayer)
//!     → "hello from worker <pid>"
//! ```
//!
//! # Design Decisions
//! - Graceful shutdown is driven by the listener's close handle, so the
//!   worker runtime stops HTTP the same way it stops any other service
//! - Each admitted connection holds its slot until hyper drops the stream

pub mod incoming;
pub mod server;

pub use incoming::AdmittedIncoming;
pub use server::{router, HelloService};
