//! Fan-out of gateway events to registered handlers.
//!
//! A [`Dispatcher`] maps event type names to ordered handler lists. It is
//! usually wrapped in an [`Arc`] and shared by every shard of an application.
//! Each dispatched payload is frozen into an [`EventPayload`]: handlers share
//! one read-only snapshot and must call [`EventPayload::to_owned_value`] to
//! obtain a copy they can mutate.

use std::{error::Error, fmt, future::Future, ops::Deref, sync::Arc};

use dashmap::DashMap;
use futures::{StreamExt, future::BoxFuture, stream::FuturesUnordered};
use serde_json::Value;
use thiserror::Error;

/// Error type returned by handlers.
pub type HandlerError = Box<dyn Error + Send + Sync>;

type HandlerFn = dyn Fn(EventPayload) -> BoxFuture<'static, Result<(), HandlerError>> + Send + Sync;

/// Errors raised by [`Dispatcher`] operations.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `remove_call` named a handler that is not registered for the event.
    #[error("handler is not registered for event {event}")]
    HandlerNotRegistered {
        /// Event type the removal targeted.
        event: String,
    },
    /// A handler returned an error.
    #[error("handler for event {event} failed: {source}")]
    Handler {
        /// Event being dispatched.
        event: String,
        /// Error returned by the handler.
        #[source]
        source: HandlerError,
    },
    /// A handler panicked.
    #[error("handler for event {event} panicked")]
    Panicked {
        /// Event being dispatched.
        event: String,
    },
}

/// Read-only snapshot of a dispatched payload.
///
/// Cloning is cheap and yields another view of the same snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct EventPayload(Arc<Value>);

impl EventPayload {
    /// Freeze `value` into a shared snapshot.
    #[must_use]
    pub fn new(value: Value) -> Self { Self(Arc::new(value)) }

    /// Copy the snapshot into a value the caller owns and may mutate.
    #[must_use]
    pub fn to_owned_value(&self) -> Value { (*self.0).clone() }
}

impl Deref for EventPayload {
    type Target = Value;

    fn deref(&self) -> &Self::Target { &self.0 }
}

/// A registered event handler.
///
/// Handlers compare by identity: a clone of a handler is the same handler,
/// while two handlers built from identical closures are distinct.
///
/// # Examples
///
/// ```
/// use shardwire::dispatch::{Dispatcher, Handler};
///
/// let handler = Handler::new(|payload| async move {
///     println!("ready: {}", payload["session_id"]);
///     Ok(())
/// });
/// let dispatcher = Dispatcher::new();
/// dispatcher.add_call("READY", handler.clone());
/// dispatcher.remove_call("READY", &handler).expect("registered");
/// ```
#[derive(Clone)]
pub struct Handler(Arc<HandlerFn>);

impl Handler {
    /// Wrap an async closure as a handler.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(EventPayload) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        Self(Arc::new(
            move |payload| -> BoxFuture<'static, Result<(), HandlerError>> { Box::pin(f(payload)) },
        ))
    }

    fn invoke(&self, payload: EventPayload) -> BoxFuture<'static, Result<(), HandlerError>> {
        (self.0)(payload)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl Eq for Handler {}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handler")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}

/// Registration table mapping event types to ordered handler lists.
#[derive(Default)]
pub struct Dispatcher {
    events: DashMap<String, Vec<Handler>>,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.events.len())
            .finish()
    }
}

impl Dispatcher {
    /// Create an empty dispatcher.
    #[must_use]
    pub fn new() -> Self { Self::default() }

    /// Append `handler` to the list for `event`.
    ///
    /// Registering the same handler twice makes it run twice per dispatch.
    pub fn add_call(&self, event: impl Into<String>, handler: Handler) {
        self.events.entry(event.into()).or_default().push(handler);
    }

    /// Remove the first registration of `handler` for `event`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::HandlerNotRegistered`] if `event` has no
    /// handlers or `handler` is not among them.
    pub fn remove_call(&self, event: &str, handler: &Handler) -> Result<(), DispatchError> {
        let not_registered = || DispatchError::HandlerNotRegistered {
            event: event.to_owned(),
        };
        {
            let mut handlers = self.events.get_mut(event).ok_or_else(not_registered)?;
            let position = handlers
                .iter()
                .position(|registered| registered == handler)
                .ok_or_else(not_registered)?;
            handlers.remove(position);
        }
        self.events.remove_if(event, |_, handlers| handlers.is_empty());
        Ok(())
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.events.get(event).map_or(0, |handlers| handlers.len())
    }

    /// Run every handler registered for `event` concurrently.
    ///
    /// Returns immediately when nothing is registered. Otherwise all handlers
    /// receive the same frozen [`EventPayload`] and run as independent tasks.
    /// The call resolves once all of them finish, or with the first failure.
    /// Handlers still running at that point are not cancelled; they finish in
    /// the background and their outcome is not observed.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Handler`] or [`DispatchError::Panicked`] for
    /// the first handler that fails.
    pub async fn call(&self, event: &str, payload: Value) -> Result<(), DispatchError> {
        let handlers = match self.events.get(event) {
            Some(handlers) if !handlers.is_empty() => handlers.value().clone(),
            _ => return Ok(()),
        };

        let payload = EventPayload::new(payload);
        let mut running: FuturesUnordered<_> = handlers
            .iter()
            .map(|handler| tokio::spawn(handler.invoke(payload.clone())))
            .collect();

        while let Some(joined) = running.next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(source)) => {
                    return Err(DispatchError::Handler {
                        event: event.to_owned(),
                        source,
                    });
                }
                Err(_) => {
                    return Err(DispatchError::Panicked {
                        event: event.to_owned(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use rstest::{fixture, rstest};
    use serde_json::json;
    use tokio::sync::oneshot;

    use super::*;

    #[fixture]
    fn dispatcher() -> Dispatcher { Dispatcher::new() }

    fn counting_handler() -> (Arc<AtomicUsize>, Handler) {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&count);
        let handler = Handler::new(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        (count, handler)
    }

    #[rstest]
    #[tokio::test]
    async fn call_without_handlers_is_a_no_op(dispatcher: Dispatcher) {
        dispatcher
            .call("UNKNOWN", json!({"x": 1}))
            .await
            .expect("no handlers is not an error");
    }

    #[rstest]
    #[tokio::test]
    async fn duplicate_registration_runs_twice(dispatcher: Dispatcher) {
        let (count, handler) = counting_handler();
        dispatcher.add_call("E", handler.clone());
        dispatcher.add_call("E", handler);
        dispatcher.call("E", json!({})).await.expect("dispatch");
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[rstest]
    fn remove_unknown_event_fails(dispatcher: Dispatcher) {
        let (_, handler) = counting_handler();
        assert!(matches!(
            dispatcher.remove_call("E", &handler),
            Err(DispatchError::HandlerNotRegistered { event }) if event == "E"
        ));
    }

    #[rstest]
    fn remove_unregistered_handler_fails(dispatcher: Dispatcher) {
        let (_, registered) = counting_handler();
        let (_, other) = counting_handler();
        dispatcher.add_call("E", registered);
        assert!(matches!(
            dispatcher.remove_call("E", &other),
            Err(DispatchError::HandlerNotRegistered { .. })
        ));
        assert_eq!(dispatcher.handler_count("E"), 1);
    }

    #[rstest]
    fn remove_drops_only_first_registration(dispatcher: Dispatcher) {
        let (_, handler) = counting_handler();
        dispatcher.add_call("E", handler.clone());
        dispatcher.add_call("E", handler.clone());
        dispatcher.remove_call("E", &handler).expect("first removal");
        assert_eq!(dispatcher.handler_count("E"), 1);
        dispatcher.remove_call("E", &handler).expect("second removal");
        assert_eq!(dispatcher.handler_count("E"), 0);
        assert!(dispatcher.remove_call("E", &handler).is_err());
    }

    #[rstest]
    #[tokio::test]
    async fn handlers_see_independent_snapshots(dispatcher: Dispatcher) {
        let (mutated_tx, mutated_rx) = oneshot::channel::<()>();
        let mutated_tx = Arc::new(Mutex::new(Some(mutated_tx)));
        let mutated_rx = Arc::new(tokio::sync::Mutex::new(Some(mutated_rx)));
        let observed = Arc::new(Mutex::new(None));

        dispatcher.add_call(
            "E",
            Handler::new(move |payload| {
                let mutated_tx = Arc::clone(&mutated_tx);
                async move {
                    let mut copy = payload.to_owned_value();
                    copy["x"] = json!(99);
                    assert_eq!(copy["x"], json!(99));
                    if let Some(tx) = mutated_tx.lock().expect("lock").take() {
                        let _ = tx.send(());
                    }
                    Ok(())
                }
            }),
        );
        let seen = Arc::clone(&observed);
        dispatcher.add_call(
            "E",
            Handler::new(move |payload| {
                let mutated_rx = Arc::clone(&mutated_rx);
                let seen = Arc::clone(&seen);
                async move {
                    if let Some(rx) = mutated_rx.lock().await.take() {
                        let _ = rx.await;
                    }
                    *seen.lock().expect("lock") = Some(payload.to_owned_value());
                    Ok(())
                }
            }),
        );

        dispatcher
            .call("E", json!({"x": 1}))
            .await
            .expect("dispatch");
        assert_eq!(*observed.lock().expect("lock"), Some(json!({"x": 1})));
    }

    #[rstest]
    #[tokio::test(start_paused = true)]
    async fn first_failure_returns_while_siblings_keep_running(dispatcher: Dispatcher) {
        let finished = Arc::new(AtomicUsize::new(0));
        let done = Arc::clone(&finished);
        dispatcher.add_call(
            "E",
            Handler::new(move |_| {
                let done = Arc::clone(&done);
                async move {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
        );
        dispatcher.add_call(
            "E",
            Handler::new(|_| async { Err::<(), HandlerError>("boom".into()) }),
        );

        let err = dispatcher
            .call("E", json!(null))
            .await
            .expect_err("failure propagates");
        assert!(matches!(err, DispatchError::Handler { ref event, .. } if event == "E"));
        assert_eq!(finished.load(Ordering::SeqCst), 0, "slow handler still running");

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(
            finished.load(Ordering::SeqCst),
            1,
            "slow handler was not cancelled"
        );
    }

    #[rstest]
    #[tokio::test]
    async fn panicking_handler_is_reported(dispatcher: Dispatcher) {
        dispatcher.add_call(
            "E",
            Handler::new(|payload| async move {
                assert!(payload.is_null(), "handler exploded");
                Ok(())
            }),
        );
        assert!(matches!(
            dispatcher.call("E", json!({})).await,
            Err(DispatchError::Panicked { .. })
        ));
    }
}
