//! The per-process connection handler contract.

use std::future::Future;

use crate::error::ServeError;
use crate::net::Listener;

/// Application logic run against the shared listener.
///
/// `serve` should keep accepting until the listener reports
/// [`ListenerError::Closed`](crate::net::ListenerError::Closed) and then
/// return. Errors returned after the process started shutting down are
/// discarded; errors returned before that are fatal to the process.
pub trait Serve: Send + Sync {
    fn serve(&self, listener: Listener) -> impl Future<Output = Result<(), ServeError>> + Send;
}

impl<F, Fut> Serve for F
where
    F: Fn(Listener) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ServeError>> + Send,
{
    fn serve(&self, listener: Listener) -> impl Future<Output = Result<(), ServeError>> + Send {
        self(listener)
    }
}
