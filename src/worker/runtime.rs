//! Worker process entry point.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::Instrument;

use crate::error::{PreforkError, Result};
use crate::ipc::{Message, Pipe};
use crate::lifecycle::{signals, Role, Shutdown};
use crate::net::Listener;
use crate::serve::Serve;
use crate::worker::inherit;
use crate::worker::state::{StateCell, WorkerState};

/// Default period of the liveness tick.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// Runs a [`Serve`] implementation inside a worker process.
pub struct WorkerRuntime {
    listener: Listener,
    pipe: Pipe,
    heartbeat_interval: Duration,
    stop: Shutdown,
    state: Arc<StateCell>,
    handle_signals: bool,
}

impl WorkerRuntime {
    /// Build a runtime from an already-open listener and pipe half.
    pub fn new(listener: Listener, pipe: Pipe) -> Self {
        Self {
            listener,
            pipe,
            heartbeat_interval: HEARTBEAT_INTERVAL,
            stop: Shutdown::new(),
            state: Arc::new(StateCell::new()),
            handle_signals: false,
        }
    }

    /// Build a runtime from the descriptors the manager placed at exec time,
    /// with interrupt handling enabled.
    ///
    /// # Safety
    ///
    /// See [`inherit::take_inherited`].
    pub unsafe fn from_inherited() -> Result<Self> {
        let inherited = unsafe { inherit::take_inherited()? };
        Ok(Self::new(inherited.listener, inherited.pipe).handle_signals(true))
    }

    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Whether the first SIGINT should trip the stop token.
    pub fn handle_signals(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Token that stops the worker exactly like an interrupt would.
    pub fn stop_handle(&self) -> Shutdown {
        self.stop.clone()
    }

    pub fn state(&self) -> Arc<StateCell> {
        self.state.clone()
    }

    /// Serve until `serve` returns. Errors from `serve` are fatal unless the
    /// worker was already closing.
    pub async fn run<S: Serve>(self, serve: &S) -> Result<()> {
        let span = Role::Worker.span();
        self.run_inner(serve).instrument(span).await
    }

    async fn run_inner<S: Serve>(self, serve: &S) -> Result<()> {
        let WorkerRuntime {
            listener,
            pipe,
            heartbeat_interval,
            stop,
            state,
            handle_signals,
        } = self;

        if handle_signals {
            signals::on_interrupt(stop.clone()).map_err(PreforkError::Signal)?;
        }

        let pipe = Arc::new(pipe);
        let closing = Shutdown::new();

        let announcer = tokio::spawn(
            announce_stop(
                stop.clone(),
                closing.clone(),
                pipe.clone(),
                listener.close_handle(),
                state.clone(),
            )
            .in_current_span(),
        );
        let heartbeat = tokio::spawn(
            send_heartbeats(pipe.clone(), heartbeat_interval, closing.clone()).in_current_span(),
        );

        tracing::info!("started worker");
        let result = serve.serve(listener).await;

        announcer.abort();
        heartbeat.abort();
        let _ = announcer.await;
        let _ = heartbeat.await;
        if let Ok(pipe) = Arc::try_unwrap(pipe) {
            if let Err(e) = pipe.close() {
                tracing::debug!(error = %e, "Failed to close manager pipe");
            }
        }

        match result {
            Ok(()) => {
                let _ = state.transition(WorkerState::Stopped);
                tracing::info!("worker stopped");
                Ok(())
            }
            Err(e) if closing.is_triggered() => {
                let _ = state.transition(WorkerState::Stopped);
                tracing::debug!(error = %e, "Serve error during shutdown ignored");
                tracing::info!("worker stopped");
                Ok(())
            }
            Err(e) => {
                let _ = state.transition(WorkerState::Failed);
                Err(PreforkError::Serve(e))
            }
        }
    }
}

/// Waits for the stop token, then: mark closing, send `0`, close the listener.
async fn announce_stop(
    stop: Shutdown,
    closing: Shutdown,
    pipe: Arc<Pipe>,
    listener: crate::net::CloseHandle,
    state: Arc<StateCell>,
) {
    let mut stop = stop.subscribe();
    stop.recv().await;

    closing.trigger();
    if state.transition(WorkerState::Closing).is_err() {
        return;
    }
    if let Err(e) = pipe.send(Message::Stopping).await {
        tracing::debug!(error = %e, "Failed to announce shutdown to manager");
    }
    listener.close();
}

async fn send_heartbeats(pipe: Arc<Pipe>, period: Duration, closing: Shutdown) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if closing.is_triggered() {
            break;
        }
        if let Err(e) = pipe.send(Message::Alive).await {
            if !closing.is_triggered() {
                tracing::warn!(error = %e, "error writing keepalive");
            }
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServeError;
    use crate::ipc::PipeFds;
    use crate::net::ListenerError;

    async fn runtime() -> (WorkerRuntime, Pipe) {
        let listener = Listener::bind("127.0.0.1:0").await.unwrap();
        let (manager_side, worker_side) = PipeFds::pair().unwrap();
        let runtime = WorkerRuntime::new(listener, Pipe::from_fds(worker_side).unwrap())
            .heartbeat_interval(Duration::from_millis(20));
        (runtime, Pipe::from_fds(manager_side).unwrap())
    }

    async fn accept_until_closed(listener: Listener) -> std::result::Result<(), ServeError> {
        loop {
            if let Err(e) = listener.accept().await {
                return Err(e.into());
            }
        }
    }

    /// Spawns `runtime.run` in a generic context so `Send` is proven from the
    /// `Serve` bound rather than from the concrete closure type.
    fn spawn_run<S: Serve + 'static>(
        runtime: WorkerRuntime,
        serve: S,
    ) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { runtime.run(&serve).await })
    }

    /// Drain the manager side until EOF, returning every byte seen.
    async fn drain(pipe: &Pipe) -> Vec<u8> {
        let mut seen = Vec::new();
        while let Ok(byte) = pipe.read_byte().await {
            seen.push(byte);
        }
        seen
    }

    #[tokio::test]
    async fn stop_announces_then_closes_listener() {
        let (runtime, manager) = runtime().await;
        let stop = runtime.stop_handle();
        let state = runtime.state();

        let worker = tokio::spawn(async move { runtime.run(&accept_until_closed).await });

        tokio::time::sleep(Duration::from_millis(70)).await;
        assert_eq!(state.get(), WorkerState::Running);
        stop.trigger();

        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should stop")
            .unwrap()
            .expect("serve error after stop is suppressed");
        assert_eq!(state.get(), WorkerState::Stopped);

        let seen = drain(&manager).await;
        assert!(seen.len() >= 2, "expected ticks before the stop byte: {seen:?}");
        assert_eq!(seen.iter().filter(|b| **b == 0).count(), 1);
        assert_eq!(seen.last(), Some(&0));
        assert!(seen[..seen.len() - 1].iter().all(|b| *b == 1));
    }

    #[tokio::test]
    async fn stop_byte_precedes_listener_close() {
        let (runtime, manager) = runtime().await;
        let stop = runtime.stop_handle();
        let manager = Arc::new(manager);
        let saw_stop_byte = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let serve = {
            let manager = manager.clone();
            let saw_stop_byte = saw_stop_byte.clone();
            move |listener: Listener| {
                let manager = manager.clone();
                let saw_stop_byte = saw_stop_byte.clone();
                async move {
                    let err = loop {
                        if let Err(e) = listener.accept().await {
                            break e;
                        }
                    };
                    assert!(err.is_closed());

                    // Everything the worker wrote so far is already buffered
                    // in the pipe, so a short wait is enough to drain it.
                    while let Ok(Ok(byte)) =
                        tokio::time::timeout(Duration::from_millis(100), manager.read_byte()).await
                    {
                        if byte == 0 {
                            saw_stop_byte.store(true, std::sync::atomic::Ordering::SeqCst);
                            break;
                        }
                    }
                    Ok::<(), ServeError>(())
                }
            }
        };

        let worker = spawn_run(runtime, serve);
        tokio::time::sleep(Duration::from_millis(50)).await;
        stop.trigger();

        tokio::time::timeout(Duration::from_secs(2), worker)
            .await
            .expect("worker should stop")
            .unwrap()
            .unwrap();
        assert!(
            saw_stop_byte.load(std::sync::atomic::Ordering::SeqCst),
            "stop byte must be written before accept reports the listener closed"
        );
    }

    #[tokio::test]
    async fn serve_error_without_stop_is_fatal() {
        let (runtime, _manager) = runtime().await;
        let state = runtime.state();

        let failing = |_listener: Listener| async {
            Err::<(), ServeError>("application exploded".into())
        };
        let err = runtime.run(&failing).await.unwrap_err();

        assert!(matches!(err, PreforkError::Serve(_)));
        assert!(err.to_string().contains("application exploded"));
        assert_eq!(state.get(), WorkerState::Failed);
    }

    #[tokio::test]
    async fn clean_return_without_stop_sends_no_stop_byte() {
        let (runtime, manager) = runtime().await;
        let state = runtime.state();

        let done = |_listener: Listener| async { Ok::<(), ServeError>(()) };
        runtime.run(&done).await.unwrap();

        assert_eq!(state.get(), WorkerState::Stopped);
        assert!(!drain(&manager).await.contains(&0));
    }

    #[tokio::test]
    async fn heartbeats_flow_while_running() {
        let (runtime, manager) = runtime().await;
        let stop = runtime.stop_handle();

        let worker = tokio::spawn(async move { runtime.run(&accept_until_closed).await });

        for _ in 0..3 {
            let msg = tokio::time::timeout(Duration::from_secs(1), manager.recv())
                .await
                .expect("tick should arrive")
                .unwrap();
            assert_eq!(msg, Message::Alive);
        }

        stop.trigger();
        worker.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn serve_sees_closed_listener() {
        let (runtime, _manager) = runtime().await;
        let stop = runtime.stop_handle();
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));

        let serve = move |listener: Listener| {
            let tx = tx.lock().unwrap().take();
            async move {
                let err = loop {
                    if let Err(e) = listener.accept().await {
                        break e;
                    }
                };
                let closed = err.is_closed();
                if let Some(tx) = tx {
                    let _ = tx.send(closed);
                }
                Err::<(), ServeError>(Box::new(err))
            }
        };

        let worker = spawn_run(runtime, serve);
        stop.trigger();

        assert!(rx.await.unwrap(), "accept should fail with {}", ListenerError::Closed);
        worker.await.unwrap().unwrap();
    }
}
