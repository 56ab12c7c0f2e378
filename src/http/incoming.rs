//! Bridge from [`AdmissionListener`] to `axum::serve`.

use std::net::SocketAddr;
use std::time::Duration;

use crate::net::{AdmissionListener, AdmittedConn};

/// Pause after a transient accept error before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Feeds admitted connections to axum.
///
/// axum's listener contract has no way to report "closed", so once the
/// listener is closed `accept` parks forever and graceful shutdown (wired to
/// the same close handle) takes over.
pub struct AdmittedIncoming {
    inner: AdmissionListener,
}

impl AdmittedIncoming {
    pub fn new(inner: AdmissionListener) -> Self {
        Self { inner }
    }
}

impl axum::serve::Listener for AdmittedIncoming {
    type Io = AdmittedConn;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.accept().await {
                Ok(accepted) => return accepted,
                Err(e) if e.is_closed() => std::future::pending::<()>().await,
                Err(e) => {
                    tracing::warn!(error = %e, "Accept failed, retrying");
                    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    fn local_addr(&self) -> tokio::io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}
