//! Manager ↔ worker channel.
//!
//! # Data Flow
//! ```text
//! Manager                                 Worker
//!   PipeFds::pair() ──(fds 4,5 at exec)──▶ worker::inherit
//!   Pipe (registered)                      Pipe (registered)
//!   read ◀──────────── 1 (alive, every tick) ───────── write
//!   read ◀──────────── 0 (stopping) ────────────────── write
//! ```
//!
//! # Design Decisions
//! - One byte per message; no framing beyond that
//! - The channel is duplex so richer telemetry can flow later, but only the
//!   worker → manager direction carries traffic today

pub mod pipe;
pub mod protocol;

pub use pipe::{Pipe, PipeError, PipeFds};
pub use protocol::{Message, ProtocolError};
