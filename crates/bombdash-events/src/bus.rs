// Synchronous event bus shared by the scenes of one client session.
//
// Single-threaded by construction (Rc/RefCell): the session runs on one
// logical thread and suspends only at backend calls.

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::{ClientEvent, EventKind};

type Callback = dyn FnMut(&ClientEvent) -> Result<(), HandlerError>;

/// Handle returned by [`EventBus::on`]; pass it to [`EventBus::off`] to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Error raised by a single handler. Never stops delivery to other handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("handler re-entered while delivering {0}")]
    Reentrant(EventKind),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// A handler that returned an error (or panicked) during one emission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub subscription: SubscriptionId,
    pub kind: EventKind,
    pub error: HandlerError,
}

/// Outcome of one [`EventBus::emit`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Handlers that ran to completion without error
    pub delivered: usize,
    pub failures: Vec<HandlerFailure>,
}

impl DeliveryReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct Subscriber {
    id: SubscriptionId,
    callback: Rc<RefCell<Callback>>,
}

#[derive(Default)]
struct Subscriptions {
    next_id: u64,
    table: HashMap<EventKind, Vec<Subscriber>>,
}

/// Central event bus.
///
/// Cloning yields another handle onto the same subscription table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Rc<RefCell<Subscriptions>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for every future emission of `kind`.
    ///
    /// Handlers run in registration order. A handler registered while an
    /// emission is in progress is not invoked for that emission.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&ClientEvent) -> Result<(), HandlerError> + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        let callback: Rc<RefCell<Callback>> = Rc::new(RefCell::new(handler));
        inner
            .table
            .entry(kind)
            .or_default()
            .push(Subscriber { id, callback });
        debug!(target: "events", "Subscribed {:?} to {}", id, kind);
        id
    }

    /// Unregister a handler. Returns false if it was not registered for `kind`.
    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        let Some(subscribers) = inner.table.get_mut(&kind) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|subscriber| subscriber.id != id);
        let removed = subscribers.len() != before;
        if removed {
            debug!(target: "events", "Unsubscribed {:?} from {}", id, kind);
        }
        removed
    }

    /// Deliver `event` to every handler currently registered for its kind.
    ///
    /// Returns once all of them ran. Failing handlers are isolated and
    /// reported; a handler removed by an earlier handler is skipped.
    pub fn emit(&self, event: ClientEvent) -> DeliveryReport {
        let kind = event.kind();
        let snapshot: Vec<(SubscriptionId, Rc<RefCell<Callback>>)> = {
            let inner = self.inner.borrow();
            inner
                .table
                .get(&kind)
                .map(|subscribers| {
                    subscribers
                        .iter()
                        .map(|s| (s.id, Rc::clone(&s.callback)))
                        .collect()
                })
                .unwrap_or_default()
        };

        debug!(target: "events", "Emitting {} to {} handler(s)", kind, snapshot.len());

        let mut report = DeliveryReport::default();
        for (id, callback) in snapshot {
            if !self.is_subscribed(kind, id) {
                continue;
            }

            let outcome = match callback.try_borrow_mut() {
                Ok(mut callback) => {
                    match panic::catch_unwind(AssertUnwindSafe(|| (&mut *callback)(&event))) {
                        Ok(result) => result,
                        Err(payload) => Err(HandlerError::Panicked(panic_message(payload))),
                    }
                }
                Err(_) => Err(HandlerError::Reentrant(kind)),
            };

            match outcome {
                Ok(()) => report.delivered += 1,
                Err(error) => {
                    warn!(target: "events", "Handler {:?} for {} failed: {}", id, kind, error);
                    report.failures.push(HandlerFailure {
                        subscription: id,
                        kind,
                        error,
                    });
                }
            }
        }

        report
    }

    pub fn is_subscribed(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner
            .borrow()
            .table
            .get(&kind)
            .is_some_and(|subscribers| subscribers.iter().any(|s| s.id == id))
    }

    /// Number of handlers registered for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .borrow()
            .table
            .get(&kind)
            .map_or(0, |subscribers| subscribers.len())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
