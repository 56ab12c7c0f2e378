//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::time::{Duration, Instant};

use prefork::net::{AdmissionListener, Listener};

/// Reserve a loopback port that is free right now.
///
/// The port is released before returning, so a concurrent test could grab
/// it; good enough for tests that bind immediately afterwards.
pub fn free_port() -> u16 {
    let listener = StdTcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Bind an admission listener on an ephemeral loopback port.
pub async fn admission_listener(capacity: usize) -> (AdmissionListener, SocketAddr) {
    let listener = Listener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let listener = AdmissionListener::wrap(listener, capacity, Duration::from_secs(60));
    (listener, addr)
}

/// Poll `url` until it answers with a 200, returning the body.
pub async fn wait_for_http(url: &str, timeout: Duration) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(1))
        .build()
        .unwrap();
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if let Ok(response) = client.get(url).send().await {
            if response.status().is_success() {
                if let Ok(body) = response.text().await {
                    return Some(body);
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    None
}
