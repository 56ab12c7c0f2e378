//! Admission-controlled listener.
//!
//! # Responsibilities
//! - Bound the number of open connections accepted by this process
//! - Apply TCP keep-alive to every admitted connection
//! - Hand each connection a slot it gives back exactly once
//!
//! # Design Decisions
//! - The slot is acquired before `accept`, so at capacity the process stops
//!   taking connections off the shared queue and other workers pick them up
//! - Accept errors release the slot and are returned as-is; retry policy
//!   belongs to the caller

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use crate::net::connection::{AdmissionSlot, AdmittedConn};
use crate::net::listener::{CloseHandle, Listener, ListenerError};
use crate::observability::metrics;

/// A listener that admits at most `capacity` open connections at a time.
#[derive(Debug)]
pub struct AdmissionListener {
    inner: Listener,
    slots: Arc<Semaphore>,
    capacity: usize,
    keep_alive: Duration,
}

impl AdmissionListener {
    /// Wrap `inner`, limiting it to `capacity` concurrently open connections.
    ///
    /// A capacity of zero would never admit anything and is raised to one.
    pub fn wrap(inner: Listener, capacity: usize, keep_alive: Duration) -> Self {
        let capacity = if capacity == 0 {
            tracing::warn!("Admission capacity of 0 raised to 1");
            1
        } else {
            capacity
        };

        Self {
            inner,
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
            keep_alive,
        }
    }

    /// Wait for a free slot, then accept the next connection.
    ///
    /// Both waits end early with [`ListenerError::Closed`] when the
    /// underlying listener is closed.
    pub async fn accept(&self) -> Result<(AdmittedConn, SocketAddr), ListenerError> {
        let mut closed = self.inner.close_signal();
        let permit = tokio::select! {
            biased;
            _ = closed.recv() => return Err(ListenerError::Closed),
            permit = self.slots.clone().acquire_owned() => {
                permit.map_err(|_| ListenerError::Closed)?
            }
        };

        let (stream, peer) = match self.inner.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                // Dropping the permit hands the slot back.
                drop(permit);
                if !e.is_closed() {
                    metrics::accept_failed();
                }
                return Err(e);
            }
        };

        if let Err(e) = enable_keep_alive(&stream, self.keep_alive) {
            tracing::warn!(peer_addr = %peer, error = %e, "Failed to enable keep-alive");
        }

        let conn = AdmittedConn::new(stream, peer, AdmissionSlot::new(permit));
        metrics::connection_accepted();
        tracing::debug!(
            peer_addr = %peer,
            connection_id = %conn.id(),
            available = self.available(),
            "Connection admitted"
        );

        Ok((conn, peer))
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Slots held by connections that have not been closed yet.
    pub fn in_use(&self) -> usize {
        self.capacity - self.available()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    pub fn close_handle(&self) -> CloseHandle {
        self.inner.close_handle()
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

fn enable_keep_alive(stream: &TcpStream, period: Duration) -> std::io::Result<()> {
    let keep_alive = TcpKeepalive::new().with_time(period);
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd"
    ))]
    let keep_alive = keep_alive.with_interval(period);

    SockRef::from(stream).set_tcp_keepalive(&keep_alive)
}
