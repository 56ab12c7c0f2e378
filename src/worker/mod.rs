//! Worker process runtime.
//!
//! # Data Flow
//! ```text
//! exec'd by manager with PREFORK_WORKER set
//!     → inherit.rs (fds 3, 4, 5 → Listener + Pipe)
//!     → runtime.rs
//!         ├─ heartbeat: 1 byte every tick while Running
//!         ├─ interrupt: Closing → send 0 → close listener
//!         └─ Serve::serve(listener) until it returns
//!     → state.rs (Running → Closing → Stopped | Running → Failed)
//! ```

pub mod inherit;
pub mod runtime;
pub mod state;

pub use inherit::{InheritError, Inherited, LISTENER_FD, PIPE_READ_FD, PIPE_WRITE_FD};
pub use runtime::WorkerRuntime;
pub use state::{StateCell, WorkerState};
