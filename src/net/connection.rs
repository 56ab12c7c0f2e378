//! Admitted connection wrapper.
//!
//! # Responsibilities
//! - Give each accepted connection a unique ID for tracing
//! - Hold the admission slot for as long as the connection is open
//! - Release that slot exactly once, whichever of `close`, a released
//!   handle, or `Drop` gets there first

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::sync::OwnedSemaphorePermit;

use crate::observability::metrics;

/// Global atomic counter for connection IDs.
/// Relaxed ordering is enough since only uniqueness matters.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One unit of admission capacity, released at most once.
///
/// Clones share the same unit.
#[derive(Debug, Clone)]
pub struct AdmissionSlot {
    permit: Arc<Mutex<Option<OwnedSemaphorePermit>>>,
}

impl AdmissionSlot {
    pub(crate) fn new(permit: OwnedSemaphorePermit) -> Self {
        metrics::admission_acquired();
        Self {
            permit: Arc::new(Mutex::new(Some(permit))),
        }
    }

    /// Return the unit to its listener. Returns `true` only for the call
    /// that actually released it.
    pub fn release(&self) -> bool {
        let permit = match self.permit.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match permit {
            Some(permit) => {
                drop(permit);
                metrics::admission_released();
                true
            }
            None => false,
        }
    }

    pub fn is_released(&self) -> bool {
        match self.permit.lock() {
            Ok(guard) => guard.is_none(),
            Err(poisoned) => poisoned.into_inner().is_none(),
        }
    }
}

/// A connection accepted through an [`AdmissionListener`](super::AdmissionListener).
///
/// Reads and writes go straight to the underlying stream.
#[derive(Debug)]
pub struct AdmittedConn {
    stream: TcpStream,
    peer: SocketAddr,
    slot: AdmissionSlot,
    id: ConnectionId,
}

impl AdmittedConn {
    pub(crate) fn new(stream: TcpStream, peer: SocketAddr, slot: AdmissionSlot) -> Self {
        Self {
            stream,
            peer,
            slot,
            id: ConnectionId::new(),
        }
    }

    /// Shut the socket down, release the slot and close the descriptor.
    ///
    /// The slot is released once even if a [`release_handle`] got there
    /// first. A shutdown error is returned after the descriptor is closed.
    ///
    /// [`release_handle`]: AdmittedConn::release_handle
    pub fn close(self) -> io::Result<()> {
        let res = socket2::SockRef::from(&self.stream).shutdown(std::net::Shutdown::Both);
        if self.slot.release() {
            tracing::trace!(connection_id = %self.id, "Connection closed");
        }
        drop(self);
        res
    }

    /// Shared handle on this connection's slot, for cleanup code that does
    /// not own the connection. Releasing it frees capacity but leaves the
    /// socket open until the connection is closed or dropped.
    pub fn release_handle(&self) -> AdmissionSlot {
        self.slot.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.slot.is_released()
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }
}

impl Drop for AdmittedConn {
    fn drop(&mut self) {
        if self.slot.release() {
            tracing::trace!(connection_id = %self.id, "Connection dropped");
        }
    }
}

impl AsyncRead for AdmittedConn {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_read(cx, buf)
    }
}

impl AsyncWrite for AdmittedConn {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.stream).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.stream).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.stream.is_write_vectored()
    }
}
