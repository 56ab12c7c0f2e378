//! Closable TCP listener.
//!
//! # Responsibilities
//! - Bind to the configured address, or adopt an already-bound socket
//! - Accept incoming TCP connections
//! - Let another task close the listener so a blocked `accept` returns
//!   [`ListenerError::Closed`]

use std::borrow::Cow;
use std::io;
use std::net::SocketAddr;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};

use crate::lifecycle::{Shutdown, ShutdownSignal};

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("error creating listener: {0}")]
    Bind(#[source] io::Error),
    /// Failed to adopt an existing socket.
    #[error("error adopting listener: {0}")]
    Adopt(#[source] io::Error),
    /// Failed to accept connection.
    #[error("error accepting connection: {0}")]
    Accept(#[source] io::Error),
    /// The listener was closed; no more connections will be accepted.
    #[error("listener closed")]
    Closed,
}

impl ListenerError {
    pub fn is_closed(&self) -> bool {
        matches!(self, ListenerError::Closed)
    }
}

/// A TCP listener that can be closed from outside the accepting task.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    closed: Shutdown,
}

impl Listener {
    /// Bind to `address` (e.g. `"0.0.0.0:8080"` or `"localhost:0"`).
    ///
    /// An empty host (`":8080"`) binds every IPv4 interface.
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let target = bind_target(address);
        let inner = TcpListener::bind(&*target)
            .await
            .map_err(ListenerError::Bind)?;
        Ok(Self::from_tokio(inner))
    }

    pub fn from_tokio(inner: TcpListener) -> Self {
        Self {
            inner,
            closed: Shutdown::new(),
        }
    }

    /// Adopt a bound std listener, e.g. one inherited from a parent process.
    pub fn from_std(listener: std::net::TcpListener) -> Result<Self, ListenerError> {
        listener
            .set_nonblocking(true)
            .map_err(ListenerError::Adopt)?;
        let inner = TcpListener::from_std(listener).map_err(ListenerError::Adopt)?;
        Ok(Self::from_tokio(inner))
    }

    /// Give up the async wrapper, returning the std socket for sharing.
    pub fn into_std(self) -> Result<std::net::TcpListener, ListenerError> {
        self.inner.into_std().map_err(ListenerError::Adopt)
    }

    /// Accept the next connection, or fail with `Closed` once closed.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr), ListenerError> {
        let mut closed = self.closed.subscribe();
        if closed.is_triggered() {
            return Err(ListenerError::Closed);
        }

        tokio::select! {
            biased;
            _ = closed.recv() => Err(ListenerError::Closed),
            res = self.inner.accept() => res.map_err(ListenerError::Accept),
        }
    }

    /// Handle that closes this listener from any task.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            closed: self.closed.clone(),
        }
    }

    pub fn close(&self) {
        self.closed.trigger();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    pub(crate) fn close_signal(&self) -> ShutdownSignal {
        self.closed.subscribe()
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, io::Error> {
        self.inner.local_addr()
    }
}

fn bind_target(address: &str) -> Cow<'_, str> {
    if address.starts_with(':') {
        Cow::Owned(format!("0.0.0.0{address}"))
    } else {
        Cow::Borrowed(address)
    }
}

/// Closes a [`Listener`] from another task.
#[derive(Debug, Clone)]
pub struct CloseHandle {
    closed: Shutdown,
}

impl CloseHandle {
    /// Close the listener. Returns `true` for the call that closed it.
    pub fn close(&self) -> bool {
        self.closed.trigger()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_triggered()
    }

    /// Resolve once the listener has been closed.
    pub async fn closed(&self) {
        self.closed.subscribe().recv().await
    }
}
