//! End-to-end tests against the real binary.

use std::os::unix::process::ExitStatusExt;
use std::process::Stdio;
use std::time::Duration;

use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};

use prefork::lifecycle::WORKER_ENV;

mod common;

fn start_server(port: u16, workers: usize) -> Child {
    Command::new(env!("CARGO_BIN_EXE_prefork-server"))
        .args(["--addr", &format!("127.0.0.1:{}", port)])
        .args(["--workers", &workers.to_string()])
        .args(["--conns", "16"])
        .env_remove(WORKER_ENV)
        .process_group(0)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

/// Interrupt the whole group, the way a terminal Ctrl-C would.
async fn interrupt_and_wait(mut server: Child) -> std::process::ExitStatus {
    let pid = server.id().expect("server still running") as i32;
    killpg(Pid::from_raw(pid), Signal::SIGINT).unwrap();

    tokio::time::timeout(Duration::from_secs(10), server.wait())
        .await
        .expect("server should exit after an interrupt")
        .unwrap()
}

fn responder_pid(body: &str) -> u32 {
    body.trim()
        .strip_prefix("hello from worker ")
        .and_then(|pid| pid.parse().ok())
        .unwrap_or_else(|| panic!("unexpected body: {body:?}"))
}

#[tokio::test]
async fn workers_serve_and_stop_on_interrupt() {
    let port = common::free_port();
    let server = start_server(port, 2);
    let manager_pid = server.id().unwrap();

    let url = format!("http://127.0.0.1:{}/", port);
    let body = common::wait_for_http(&url, Duration::from_secs(10))
        .await
        .expect("a worker should answer");
    assert_ne!(responder_pid(&body), manager_pid, "the manager must not serve");

    let url = format!("http://127.0.0.1:{}/healthz", port);
    let health = common::wait_for_http(&url, Duration::from_secs(2)).await;
    assert_eq!(health.as_deref(), Some("ok"));

    let status = interrupt_and_wait(server).await;
    assert!(status.success(), "manager exited with {status}");
}

#[tokio::test]
async fn zero_workers_serve_in_manager() {
    let port = common::free_port();
    let server = start_server(port, 0);
    let manager_pid = server.id().unwrap();

    let url = format!("http://127.0.0.1:{}/", port);
    let body = common::wait_for_http(&url, Duration::from_secs(10))
        .await
        .expect("the manager should answer");
    assert_eq!(responder_pid(&body), manager_pid);

    let status = interrupt_and_wait(server).await;
    assert!(status.success(), "server exited with {status}");
}

#[tokio::test]
async fn second_interrupt_kills_the_manager() {
    let port = common::free_port();
    let mut server = start_server(port, 2);
    let manager_pid = server.id().unwrap() as i32;

    let url = format!("http://127.0.0.1:{}/", port);
    common::wait_for_http(&url, Duration::from_secs(10))
        .await
        .expect("a worker should answer");

    // Only the manager is interrupted; its workers keep serving.
    kill(Pid::from_raw(manager_pid), Signal::SIGINT).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(server.try_wait().unwrap().is_none(), "first interrupt is caught");

    kill(Pid::from_raw(manager_pid), Signal::SIGINT).unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), server.wait())
        .await
        .expect("second interrupt should terminate the manager")
        .unwrap();
    assert_eq!(status.signal(), Some(Signal::SIGINT as i32));

    // The workers were never signalled and still hold the group.
    let _ = killpg(Pid::from_raw(manager_pid), Signal::SIGKILL);
}
