//! Named in-process signals
//!
//! Integrations use signals to fan a notification out to their own
//! entities without going through the platform-wide event bus.

use dashmap::DashMap;
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

/// Handler connected to a signal
pub type SignalHandler = Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, ()> + Send + Sync>;

/// Disconnects the handler it was returned for
pub type RemoveListener = Box<dyn FnOnce() + Send + Sync>;

#[derive(Default)]
struct Signals {
    handlers: DashMap<String, Vec<(u64, SignalHandler)>>,
    next_listener_id: AtomicU64,
}

/// Signal dispatcher
///
/// Handlers run in the order they were connected. [`send`](Self::send)
/// returns only after every handler has completed.
#[derive(Clone, Default)]
pub struct Dispatcher {
    signals: Arc<Signals>,
}

impl Dispatcher {
    /// Create a dispatcher with no signals connected
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a handler to a signal
    pub fn connect<F, Fut>(&self, signal: impl Into<String>, handler: F) -> RemoveListener
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = signal.into();
        let id = self.signals.next_listener_id.fetch_add(1, Ordering::SeqCst);
        let handler: SignalHandler = Arc::new(move |payload: serde_json::Value| {
            Box::pin(handler(payload)) as BoxFuture<'static, ()>
        });

        self.signals
            .handlers
            .entry(signal.clone())
            .or_default()
            .push((id, handler));
        trace!(signal = %signal, listener = id, "Connected signal handler");

        let signals: Weak<Signals> = Arc::downgrade(&self.signals);
        Box::new(move || {
            if let Some(signals) = signals.upgrade() {
                if let Some(mut handlers) = signals.handlers.get_mut(&signal) {
                    handlers.retain(|(listener, _)| *listener != id);
                }
                trace!(signal = %signal, listener = id, "Disconnected signal handler");
            }
        })
    }

    /// Send a signal and wait for all connected handlers
    pub async fn send(&self, signal: &str, payload: serde_json::Value) {
        // Snapshot so handlers may connect or disconnect while we run them
        let handlers: Vec<SignalHandler> = self
            .signals
            .handlers
            .get(signal)
            .map(|handlers| handlers.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();

        debug!(signal = %signal, handlers = handlers.len(), "Dispatching signal");

        for handler in handlers {
            handler(payload.clone()).await;
        }
    }

    /// Number of handlers connected to a signal
    pub fn listener_count(&self, signal: &str) -> usize {
        self.signals
            .handlers
            .get(signal)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_send_runs_handlers_in_order() {
        let dispatcher = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for n in 0..3 {
            let seen = seen.clone();
            let _remove = dispatcher.connect("update", move |payload| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push((n, payload));
                }
            });
        }

        dispatcher.send("update", json!(["device-1"])).await;

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0], (0, json!(["device-1"])));
        assert_eq!(seen[2].0, 2);
    }

    #[tokio::test]
    async fn test_remove_listener() {
        let dispatcher = Dispatcher::new();
        let hits = Arc::new(AtomicU64::new(0));

        let counter = hits.clone();
        let remove = dispatcher.connect("update", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(dispatcher.listener_count("update"), 1);

        dispatcher.send("update", json!([])).await;
        remove();
        dispatcher.send("update", json!([])).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.listener_count("update"), 0);
    }

    #[tokio::test]
    async fn test_unknown_signal_is_noop() {
        let dispatcher = Dispatcher::new();
        dispatcher.send("nobody_listens", json!(null)).await;
        assert_eq!(dispatcher.listener_count("nobody_listens"), 0);
    }

    #[test]
    fn test_remove_after_dispatcher_dropped() {
        let dispatcher = Dispatcher::new();
        let remove = dispatcher.connect("update", |_| async {});
        drop(dispatcher);
        remove();
    }
}
