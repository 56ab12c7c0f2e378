//! Crate-level error type.
//!
//! Each variant names the operation that failed so a log line is enough to
//! diagnose it without a backtrace.

use std::io;
use thiserror::Error;

use crate::ipc::PipeError;
use crate::net::ListenerError;
use crate::worker::inherit::InheritError;

/// Error returned by a [`Serve`](crate::Serve) implementation.
pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = PreforkError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PreforkError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("error getting file for listener: {0}")]
    ListenerFd(#[source] io::Error),

    #[error("error creating worker pipes: {0}")]
    Pipe(#[source] PipeError),

    #[error("error starting worker: {0}")]
    Spawn(#[source] io::Error),

    #[error("error reconstructing worker resources: {0}")]
    Inherit(#[from] InheritError),

    #[error("error installing interrupt handler: {0}")]
    Signal(#[source] io::Error),

    #[error("error serving: {0}")]
    Serve(#[source] ServeError),
}
