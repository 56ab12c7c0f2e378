//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Manager and workers produce:
//!     → logging.rs (structured log events, one span per process)
//!     → metrics.rs (counters and gauges through the `metrics` facade)
//! ```
//!
//! # Design Decisions
//! - Every process tags its output with role and pid via a root span
//! - The library never installs a metrics recorder; the host binary decides

pub mod logging;
pub mod metrics;
