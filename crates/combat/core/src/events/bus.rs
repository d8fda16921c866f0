//! Topic-based synchronous event bus.
//!
//! Regular subscribers receive every event published on their topic. A
//! topic may additionally have one responder, reached through
//! [`EventBus::send_with_response`], for point-to-point requests from
//! adapters outside the engine.
//!
//! Publishing is fire-and-forget: a failing or panicking handler is logged
//! and the remaining handlers still run. Dispatch walks a snapshot of the subscriber
//! list, so handlers may subscribe or disconnect (themselves included)
//! while an event is being delivered.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use thiserror::Error;
use tracing::{trace, warn};

use super::types::{CombatEvent, Topic};
use crate::error::{CombatError, ErrorSeverity};

/// Error returned by an event handler or responder.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Reply produced by a responder.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Response {
    Ack,
    Flag(bool),
    Number(f64),
    Text(String),
}

/// Errors from request/response dispatch.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("no responder registered for topic {0}")]
    NoResponder(Topic),

    #[error("topic {0} already has a responder")]
    ResponderTaken(Topic),

    #[error("responder failed: {0}")]
    Handler(#[from] HandlerError),
}

impl CombatError for BusError {
    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::NoResponder(_) | Self::ResponderTaken(_) => ErrorSeverity::Validation,
            Self::Handler(_) => ErrorSeverity::Recoverable,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NoResponder(_) => "BUS_NO_RESPONDER",
            Self::ResponderTaken(_) => "BUS_RESPONDER_TAKEN",
            Self::Handler(_) => "BUS_HANDLER_FAILED",
        }
    }
}

type Handler = Arc<dyn Fn(&CombatEvent) -> Result<(), HandlerError> + Send + Sync>;
type Responder = Arc<dyn Fn(&CombatEvent) -> Result<Response, HandlerError> + Send + Sync>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct SubscriptionId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    /// `None` holds subscribers to every topic.
    handlers: HashMap<Option<Topic>, Vec<(SubscriptionId, Handler)>>,
    responders: HashMap<Topic, (SubscriptionId, Responder)>,
}

impl BusInner {
    fn allocate(&mut self) -> SubscriptionId {
        self.next_id += 1;
        SubscriptionId(self.next_id)
    }

    fn is_connected(&self, key: Option<Topic>, id: SubscriptionId) -> bool {
        self.handlers
            .get(&key)
            .is_some_and(|list| list.iter().any(|(sid, _)| *sid == id))
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let mut removed = false;
        for list in self.handlers.values_mut() {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            removed |= list.len() != before;
        }
        let before = self.responders.len();
        self.responders.retain(|_, (sid, _)| *sid != id);
        removed || self.responders.len() != before
    }
}

/// Shared, cloneable event bus. Clones publish to the same subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribes `handler` to every event published on `topic`.
    pub fn subscribe<F>(&self, topic: Topic, handler: F) -> Subscription
    where
        F: Fn(&CombatEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.add_handler(Some(topic), Arc::new(handler))
    }

    /// Subscribes `handler` to every event regardless of topic.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&CombatEvent) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.add_handler(None, Arc::new(handler))
    }

    fn add_handler(&self, key: Option<Topic>, handler: Handler) -> Subscription {
        let mut inner = self.lock();
        let id = inner.allocate();
        inner.handlers.entry(key).or_default().push((id, handler));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Registers the single responder for `topic`.
    pub fn subscribe_with_response<F>(&self, topic: Topic, responder: F) -> Result<Subscription, BusError>
    where
        F: Fn(&CombatEvent) -> Result<Response, HandlerError> + Send + Sync + 'static,
    {
        let mut inner = self.lock();
        if inner.responders.contains_key(&topic) {
            return Err(BusError::ResponderTaken(topic));
        }
        let id = inner.allocate();
        inner.responders.insert(topic, (id, Arc::new(responder)));
        Ok(Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        })
    }

    /// Publishes `event` to the subscribers of its topic, then to wildcard
    /// subscribers. Handler failures are logged and swallowed.
    pub fn publish(&self, event: CombatEvent) {
        let topic = event.topic();
        let snapshot: Vec<(Option<Topic>, SubscriptionId, Handler)> = {
            let inner = self.lock();
            [Some(topic), None]
                .into_iter()
                .flat_map(|key| {
                    inner
                        .handlers
                        .get(&key)
                        .into_iter()
                        .flatten()
                        .map(move |(id, h)| (key, *id, Arc::clone(h)))
                })
                .collect()
        };

        if snapshot.is_empty() {
            trace!(target: "combat::bus", %topic, event = event.name(), "no subscribers");
            return;
        }

        for (key, id, handler) in snapshot {
            // A previous handler may have disconnected this one.
            if !self.lock().is_connected(key, id) {
                continue;
            }
            let error = match panic::catch_unwind(AssertUnwindSafe(|| handler(&event))) {
                Ok(Ok(())) => continue,
                Ok(Err(error)) => error.to_string(),
                Err(payload) => format!("panicked: {}", panic_message(payload.as_ref())),
            };
            warn!(
                target: "combat::bus",
                %topic,
                event = event.name(),
                subscription = id.0,
                %error,
                "event handler failed"
            );
        }
    }

    /// Invokes the responder for the event's topic and returns its reply.
    pub fn send_with_response(&self, event: &CombatEvent) -> Result<Response, BusError> {
        let topic = event.topic();
        let responder = {
            let inner = self.lock();
            inner
                .responders
                .get(&topic)
                .map(|(_, r)| Arc::clone(r))
                .ok_or(BusError::NoResponder(topic))?
        };
        responder(event).map_err(BusError::from)
    }

    /// Number of regular subscribers on `topic` (wildcards excluded).
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.lock().handlers.get(&Some(topic)).map_or(0, Vec::len)
    }

    pub fn has_responder(&self, topic: Topic) -> bool {
        self.lock().responders.contains_key(&topic)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock();
        f.debug_struct("EventBus")
            .field("handlers", &inner.handlers.values().map(Vec::len).sum::<usize>())
            .field("responders", &inner.responders.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string payload")
}

/// Handle to a registered handler or responder.
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::disconnect`] to remove it.
#[derive(Clone, Debug)]
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Removes the subscription from both handler and responder lists.
    ///
    /// Idempotent. Returns true if something was removed by this call.
    pub fn disconnect(&self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(self.id),
            None => false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.bus.upgrade().is_some_and(|inner| {
            let inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.handlers.values().flatten().any(|(sid, _)| *sid == self.id)
                || inner.responders.values().any(|(sid, _)| *sid == self.id)
        })
    }
}
