//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the Axum router with its middleware
//! - Serve it on an admission-limited listener until the listener closes

use std::time::Duration;

use axum::{routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::config::AdmissionConfig;
use crate::error::ServeError;
use crate::http::incoming::AdmittedIncoming;
use crate::net::{AdmissionListener, Listener};
use crate::serve::Serve;

/// Replies with the pid of the worker that handled the request, which makes
/// load spreading across workers visible from outside.
#[derive(Debug, Clone)]
pub struct HelloService {
    max_connections: usize,
    keep_alive: Duration,
}

impl HelloService {
    pub fn new(max_connections: usize, keep_alive: Duration) -> Self {
        Self {
            max_connections,
            keep_alive,
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(config.max_connections, config.keep_alive())
    }
}

impl Serve for HelloService {
    async fn serve(&self, listener: Listener) -> Result<(), ServeError> {
        let listener = AdmissionListener::wrap(listener, self.max_connections, self.keep_alive);
        let close = listener.close_handle();
        tracing::info!(
            max_connections = listener.capacity(),
            keep_alive_secs = listener.keep_alive().as_secs(),
            "HTTP server starting"
        );

        axum::serve(AdmittedIncoming::new(listener), router())
            .with_graceful_shutdown(async move { close.closed().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the demo router.
pub fn router() -> Router {
    Router::new()
        .route("/", get(hello))
        .route("/healthz", get(healthz))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn hello() -> String {
    format!("hello from worker {}\n", std::process::id())
}

async fn healthz() -> &'static str {
    "ok"
}
