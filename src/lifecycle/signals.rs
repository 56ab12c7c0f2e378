//! OS signal handling.
//!
//! # Responsibilities
//! - Translate the first SIGINT into a [`Shutdown`] trigger
//! - Let a second SIGINT terminate the process with the default disposition
//!
//! The manager and each worker install this independently. A terminal
//! interrupt reaches the whole process group, so every worker stops itself
//! while the manager only records that shutdown is underway.

use signal_hook::consts::SIGINT;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::lifecycle::Shutdown;

/// Trip `shutdown` on the first interrupt; die on the second.
///
/// Must be called from within a tokio runtime.
pub fn on_interrupt(shutdown: Shutdown) -> std::io::Result<JoinHandle<()>> {
    let mut interrupt = signal(SignalKind::interrupt())?;

    Ok(tokio::spawn(async move {
        if interrupt.recv().await.is_none() {
            return;
        }
        tracing::info!("Interrupt received");
        shutdown.trigger();

        if interrupt.recv().await.is_none() {
            return;
        }
        tracing::warn!("Second interrupt received, terminating");
        if let Err(e) = signal_hook::low_level::emulate_default_handler(SIGINT) {
            tracing::error!(error = %e, "Failed to restore default interrupt handling");
            std::process::exit(128 + SIGINT);
        }
    }
    .in_current_span()))
}
