//! Structured logging.
//!
//! Installs a `tracing` subscriber. `RUST_LOG` wins over the configured
//! level so a single worker can be debugged without editing config.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(default_level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "prefork={default_level},prefork_server={default_level},tower_http={default_level}"
        ))
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .try_init()
        .is_ok()
}

/// Records every event with the names of the spans it was emitted in.
#[cfg(test)]
pub(crate) mod capture {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::subscriber::DefaultGuard;
    use tracing::{Event, Subscriber};
    use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
    use tracing_subscriber::registry::LookupSpan;

    #[derive(Debug, Clone)]
    pub(crate) struct CapturedEvent {
        pub message: String,
        pub spans: Vec<&'static str>,
    }

    #[derive(Debug, Clone, Default)]
    pub(crate) struct Captured(Arc<Mutex<Vec<CapturedEvent>>>);

    impl Captured {
        /// Span names of the first event whose message contains `needle`.
        pub(crate) fn spans_of(&self, needle: &str) -> Option<Vec<&'static str>> {
            self.0
                .lock()
                .unwrap()
                .iter()
                .find(|e| e.message.contains(needle))
                .map(|e| e.spans.clone())
        }
    }

    impl<S> Layer<S> for Captured
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
            let spans = ctx
                .event_scope(event)
                .map(|scope| scope.from_root().map(|span| span.name()).collect())
                .unwrap_or_default();
            let mut message = MessageVisitor(String::new());
            event.record(&mut message);
            self.0.lock().unwrap().push(CapturedEvent {
                message: message.0,
                spans,
            });
        }
    }

    struct MessageVisitor(String);

    impl Visit for MessageVisitor {
        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            if field.name() == "message" {
                self.0 = format!("{value:?}");
            }
        }
    }

    /// Capture events on this thread until the guard drops.
    pub(crate) fn install() -> (Captured, DefaultGuard) {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(captured.clone());
        let guard = tracing::subscriber::set_default(subscriber);
        (captured, guard)
    }
}
