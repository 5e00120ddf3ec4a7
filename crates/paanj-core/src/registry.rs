//! Event registry for the Paanj SDK.
//!
//! An [`EventRegistry`] maps an event name to an ordered list of handlers.
//! Handlers are appended with [`on`](EventRegistry::on) and invoked with
//! [`emit`](EventRegistry::emit). Registration is additive only: there is no
//! deduplication and no removal.
//!
//! # Dispatch
//!
//! Emitting never waits for handlers. Inside a tokio runtime every handler
//! invocation is spawned as its own task, started in registration order; the
//! emitter returns as soon as the tasks are spawned. Completion order across
//! handlers is not guaranteed.
//!
//! Outside a runtime (early initialization, plain unit tests) handlers are
//! invoked inline on the calling thread, in registration order.
//!
//! # Failure Isolation
//!
//! Every invocation is wrapped in `catch_unwind`. A panicking handler is logged
//! at `warn` and never affects the emitter, other handlers, or the read loop
//! that triggered the dispatch.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! use paanj_core::EventRegistry;
//!
//! let registry = EventRegistry::<u32>::new();
//! let total = Arc::new(AtomicUsize::new(0));
//!
//! let total_clone = total.clone();
//! registry.on("tick", move |&n| {
//!     total_clone.fetch_add(n as usize, Ordering::SeqCst);
//! });
//!
//! registry.emit("tick", 5);
//! assert_eq!(total.load(Ordering::SeqCst), 5);
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;

use crate::error::CoreError;
use crate::logging::targets;

/// A registered event handler.
///
/// Handlers are shared (`Arc`) so a snapshot of the handler list can be taken
/// under the lock and invoked after the lock is released.
pub type Handler<Args> = Arc<dyn Fn(&Args) + Send + Sync>;

/// Controls how many handler invocations may execute at the same time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DispatchPolicy {
    /// Spawn one task per handler invocation with no upper bound.
    ///
    /// This keeps handlers from ever stalling the emitter, but a very high
    /// event rate creates an unbounded number of concurrent handler
    /// executions. Handlers are expected to be lightweight callbacks.
    #[default]
    Unbounded,

    /// Spawn one task per handler invocation, but let at most
    /// `max_in_flight` of them run at once.
    ///
    /// Excess invocations wait for a permit inside their own task, so the
    /// emitter still never blocks.
    Bounded {
        /// Maximum number of handlers executing concurrently.
        max_in_flight: NonZeroUsize,
    },
}

impl DispatchPolicy {
    /// Create a bounded policy.
    pub fn bounded(max_in_flight: NonZeroUsize) -> Self {
        Self::Bounded { max_in_flight }
    }
}

/// Shared state behind an [`EventRegistry`] handle.
struct RegistryInner<Args> {
    /// Event name to handlers, in registration order.
    handlers: Mutex<HashMap<String, Vec<Handler<Args>>>>,
    policy: DispatchPolicy,
    /// Present only for [`DispatchPolicy::Bounded`].
    permits: Option<Arc<Semaphore>>,
}

/// A mapping from event name to an ordered list of handlers.
///
/// The registry is cheaply cloneable; clones share the same handler table.
///
/// # Thread Safety
///
/// The handler table is guarded by a single mutex. The lock is held only
/// while appending a handler or copying a handler list; it is always released
/// before any handler runs.
pub struct EventRegistry<Args> {
    inner: Arc<RegistryInner<Args>>,
}

impl<Args> Clone for EventRegistry<Args> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Args: Clone + Send + 'static> Default for EventRegistry<Args> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Args: Clone + Send + 'static> EventRegistry<Args> {
    /// Create an empty registry with [`DispatchPolicy::Unbounded`].
    pub fn new() -> Self {
        Self::with_policy(DispatchPolicy::Unbounded)
    }

    /// Create an empty registry with the given dispatch policy.
    pub fn with_policy(policy: DispatchPolicy) -> Self {
        let permits = match policy {
            DispatchPolicy::Unbounded => None,
            DispatchPolicy::Bounded { max_in_flight } => {
                Some(Arc::new(Semaphore::new(max_in_flight.get())))
            }
        };

        Self {
            inner: Arc::new(RegistryInner {
                handlers: Mutex::new(HashMap::new()),
                policy,
                permits,
            }),
        }
    }

    /// Get the dispatch policy this registry was created with.
    pub fn policy(&self) -> DispatchPolicy {
        self.inner.policy
    }

    /// Append a handler to the list for `event`.
    ///
    /// The list is created if absent. Registering the same closure twice
    /// results in two invocations per emit.
    pub fn on<F>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(&Args) + Send + Sync + 'static,
    {
        let event = event.into();
        let mut handlers = self.inner.handlers.lock();
        let list = handlers.entry(event).or_default();
        list.push(Arc::new(handler));
        tracing::trace!(target: targets::REGISTRY, handler_count = list.len(), "handler registered");
    }

    /// Get a snapshot of the handlers registered for `event`, in registration order.
    ///
    /// Returns an empty list for an event that has never been registered.
    pub fn handlers(&self, event: &str) -> Vec<Handler<Args>> {
        self.inner
            .handlers
            .lock()
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    /// Get the number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.inner.handlers.lock().get(event).map_or(0, Vec::len)
    }

    /// Get the names of all events that have at least one handler.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.handlers.lock().keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke every handler registered for `event` with `payload`.
    ///
    /// Each handler receives its own clone of the payload and runs as an
    /// independent unit of work (see the module docs). Returns the number of
    /// handlers dispatched; `0` for an unknown event.
    #[tracing::instrument(skip(self, payload), target = "paanj_core::registry", level = "trace")]
    pub fn emit(&self, event: &str, payload: Args) -> usize {
        // Snapshot under the lock, invoke after it is released.
        let handlers = self.handlers(event);
        if handlers.is_empty() {
            tracing::trace!(target: targets::REGISTRY, "no handlers registered");
            return 0;
        }

        let count = handlers.len();
        match Handle::try_current() {
            Ok(runtime) => {
                for handler in handlers {
                    self.spawn_invocation(&runtime, event, handler, payload.clone());
                }
            }
            Err(_) => {
                tracing::warn!(
                    target: targets::REGISTRY,
                    "No async runtime available, invoking handlers inline"
                );
                for handler in &handlers {
                    invoke_isolated(event, handler, &payload);
                }
            }
        }
        count
    }

    /// Spawn a single handler invocation onto the runtime.
    fn spawn_invocation(&self, runtime: &Handle, event: &str, handler: Handler<Args>, payload: Args) {
        let event = event.to_owned();
        let permits = self.inner.permits.clone();

        runtime.spawn(async move {
            let _permit = match permits {
                Some(semaphore) => match semaphore.acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // Semaphore closed: the registry is gone, nothing to run for.
                    Err(_) => return,
                },
                None => None,
            };
            invoke_isolated(&event, &handler, &payload);
        });
    }
}

impl<Args> fmt::Debug for EventRegistry<Args> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let handlers = self.inner.handlers.lock();
        let handler_count: usize = handlers.values().map(Vec::len).sum();
        f.debug_struct("EventRegistry")
            .field("policy", &self.inner.policy)
            .field("events", &handlers.len())
            .field("handlers", &handler_count)
            .finish()
    }
}

/// Run a handler, containing any panic it raises.
///
/// Returns `true` if the handler completed normally.
fn invoke_isolated<Args>(event: &str, handler: &Handler<Args>, payload: &Args) -> bool {
    match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
        Ok(()) => true,
        Err(panic) => {
            let error = CoreError::HandlerPanicked {
                event: event.to_owned(),
                message: panic_message(&*panic),
            };
            tracing::warn!(target: targets::REGISTRY, %error, "event handler failed");
            false
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_emit_unknown_event_is_noop() {
        let registry = EventRegistry::<i32>::new();
        assert_eq!(registry.emit("never.registered", 1), 0);
        assert!(registry.handlers("never.registered").is_empty());
        assert_eq!(registry.handler_count("never.registered"), 0);
    }

    #[test]
    fn test_inline_dispatch_in_registration_order() {
        let registry = EventRegistry::<i32>::new();
        let received = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let received_clone = received.clone();
            registry.on("value", move |&value| {
                received_clone.lock().push((tag, value));
            });
        }

        assert_eq!(registry.emit("value", 7), 2);
        assert_eq!(*received.lock(), vec![("first", 7), ("second", 7)]);
    }

    #[test]
    fn test_registration_is_additive() {
        let registry = EventRegistry::<()>::new();
        let count = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let count_clone = count.clone();
            registry.on("ping", move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            });
        }
        registry.on("other", |_| {});

        assert_eq!(registry.handler_count("ping"), 3);
        assert_eq!(registry.event_names(), vec!["other".to_string(), "ping".to_string()]);

        registry.emit("ping", ());
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_inline_panic_is_isolated() {
        let registry = EventRegistry::<i32>::new();
        let after = Arc::new(AtomicUsize::new(0));

        registry.on("boom", |_| panic!("handler exploded"));
        let after_clone = after.clone();
        registry.on("boom", move |_| {
            after_clone.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(registry.emit("boom", 1), 2);
        assert_eq!(after.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clones_share_handlers() {
        let registry = EventRegistry::<i32>::new();
        let clone = registry.clone();
        clone.on("shared", |_| {});
        assert_eq!(registry.handler_count("shared"), 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        assert_eq!(panic_message(&"static"), "static");
        assert_eq!(panic_message(&String::from("owned")), "owned");
        assert_eq!(panic_message(&42_u8), "non-string panic payload");
    }

    #[tokio::test]
    async fn test_spawned_dispatch_runs_each_handler_once() {
        let registry = EventRegistry::<i32>::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        for tag in ["h1", "h2"] {
            let tx = tx.clone();
            registry.on("event", move |&value| {
                let _ = tx.send((tag, value));
            });
        }

        assert_eq!(registry.emit("event", 3), 2);

        let mut seen = Vec::new();
        for _ in 0..2 {
            let item = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("handler did not run")
                .expect("channel closed");
            seen.push(item);
        }

        // Single-threaded runtime: spawned tasks start in registration order.
        assert_eq!(seen, vec![("h1", 3), ("h2", 3)]);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "a handler ran more than once");
    }

    #[tokio::test]
    async fn test_spawned_panic_does_not_affect_other_handlers() {
        let registry = EventRegistry::<i32>::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        registry.on("event", |_| panic!("bad handler"));
        registry.on("event", move |&value| {
            let _ = tx.send(value);
        });

        registry.emit("event", 11);
        let value = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("healthy handler did not run");
        assert_eq!(value, Some(11));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_bounded_policy_limits_concurrency() {
        let limit = NonZeroUsize::new(2).expect("non-zero");
        let registry = EventRegistry::<()>::with_policy(DispatchPolicy::bounded(limit));
        assert_eq!(registry.policy(), DispatchPolicy::Bounded { max_in_flight: limit });

        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            let done = done.clone();
            registry.on("work", move |_| {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                running.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(registry.emit("work", ()), 6);

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while done.load(Ordering::SeqCst) < 6 {
            assert!(tokio::time::Instant::now() < deadline, "handlers did not finish");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
