//! Local event bus.
//!
//! Synchronous publish/subscribe for in-process consumers (UI, analytics).
//! Handlers run in registration order, inside the emitting call, so a
//! subscriber observes mutations in exactly the order they were produced.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use payment_types::{PaymentSession, SessionId};
use tracing::debug;

/// Callback type for event handlers.
pub type EventHandler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

/// Events emitted by the session store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionUpdated(PaymentSession),
    StatusUpdated(PaymentSession),
    SessionDeleted(SessionId),
}

impl SessionEvent {
    pub fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::SessionUpdated(_) => SessionEventKind::SessionUpdated,
            SessionEvent::StatusUpdated(_) => SessionEventKind::StatusUpdated,
            SessionEvent::SessionDeleted(_) => SessionEventKind::SessionDeleted,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        match self {
            SessionEvent::SessionUpdated(s) | SessionEvent::StatusUpdated(s) => &s.id,
            SessionEvent::SessionDeleted(id) => id,
        }
    }

    /// The session carried by update events.
    pub fn session(&self) -> Option<&PaymentSession> {
        match self {
            SessionEvent::SessionUpdated(s) | SessionEvent::StatusUpdated(s) => Some(s),
            SessionEvent::SessionDeleted(_) => None,
        }
    }
}

/// Event names subscribers can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    SessionUpdated,
    StatusUpdated,
    SessionDeleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber {
    id: SubscriptionId,
    /// Filter by event kind (None = all kinds)
    kind: Option<SessionEventKind>,
    handler: EventHandler,
}

#[derive(Default)]
struct BusInner {
    subscribers: RwLock<Vec<Subscriber>>,
    next_id: AtomicU64,
}

/// Event bus for session lifecycle events. Clones share subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of event.
    pub fn subscribe<F>(&self, kind: SessionEventKind, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.register(Some(kind), Arc::new(handler))
    }

    /// Subscribe to every event.
    pub fn subscribe_all<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.register(None, Arc::new(handler))
    }

    fn register(&self, kind: Option<SessionEventKind>, handler: EventHandler) -> Subscription {
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        self.inner.subscribers.write().push(Subscriber { id, kind, handler });
        debug!(subscription_id = id.0, ?kind, "Event subscription registered");

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscription. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        remove_subscriber(&self.inner, id)
    }

    /// Deliver an event to every matching subscriber, in registration order.
    ///
    /// Returns the number of handlers invoked. Handlers may (un)subscribe
    /// while running; changes apply from the next emission.
    pub fn emit(&self, event: &SessionEvent) -> usize {
        let kind = event.kind();
        let handlers: Vec<EventHandler> = self
            .inner
            .subscribers
            .read()
            .iter()
            .filter(|s| s.kind.map_or(true, |k| k == kind))
            .map(|s| s.handler.clone())
            .collect();

        debug!(
            session_id = %event.session_id(),
            ?kind,
            handlers = handlers.len(),
            "Session event emitted"
        );
        for handler in &handlers {
            handler(event);
        }
        handlers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.read().len()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.inner.subscribers.write().clear();
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

fn remove_subscriber(inner: &BusInner, id: SubscriptionId) -> bool {
    let mut subs = inner.subscribers.write();
    let before = subs.len();
    subs.retain(|s| s.id != id);
    let removed = subs.len() != before;
    if removed {
        debug!(subscription_id = id.0, "Event subscription removed");
    }
    removed
}

/// Handle returned by [`EventBus::subscribe`].
///
/// Dropping the handle does not unsubscribe; call [`Subscription::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    bus: Weak<BusInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => remove_subscriber(&inner, self.id),
            None => false,
        }
    }
}
