//! Event bus implementation.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use ouvidoria_core::ListenerError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::NamedEvent;

/// A registered callback. Handlers run synchronously inside `emit`.
pub type Handler<P> = Arc<dyn Fn(&P) -> Result<(), ListenerError> + Send + Sync>;

/// Opaque identity of one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscription<P> {
    id: SubscriptionId,
    handler: Handler<P>,
}

type Listeners<P> = BTreeMap<String, Vec<Subscription<P>>>;

fn lock<P>(listeners: &Mutex<Listeners<P>>) -> MutexGuard<'_, Listeners<P>> {
    listeners.lock().unwrap_or_else(PoisonError::into_inner)
}

fn remove_subscription<P>(listeners: &mut Listeners<P>, event: &str, id: SubscriptionId) -> bool {
    let Some(subscriptions) = listeners.get_mut(event) else {
        return false;
    };
    let before = subscriptions.len();
    subscriptions.retain(|s| s.id != id);
    let removed = subscriptions.len() < before;
    if subscriptions.is_empty() {
        listeners.remove(event);
    }
    removed
}

/// Summary of one `emit` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmitReport {
    /// Handlers that returned `Ok`.
    pub delivered: usize,
    /// Handlers that failed or panicked, in dispatch order.
    pub failed: Vec<(SubscriptionId, ListenerError)>,
}

impl EmitReport {
    pub fn handler_count(&self) -> usize {
        self.delivered + self.failed.len()
    }
}

/// Process-wide publish/subscribe registry.
///
/// Shared through an `Arc`; [`clear`](Self::clear) is the only reset path.
pub struct EventBus<P> {
    listeners: Arc<Mutex<Listeners<P>>>,
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Register `handler` for `event`.
    pub fn on<F>(&self, event: &str, handler: F) -> Unsubscribe<P>
    where
        F: Fn(&P) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        self.on_handler(event, Arc::new(handler))
    }

    /// Register a shared handler. Keep a clone to remove it later with
    /// [`off`](Self::off).
    pub fn on_handler(&self, event: &str, handler: Handler<P>) -> Unsubscribe<P> {
        let id = SubscriptionId::new();
        lock(&self.listeners)
            .entry(event.to_string())
            .or_default()
            .push(Subscription { id, handler });
        debug!(event = event, subscription = %id, "listener registered");
        Unsubscribe {
            listeners: Arc::downgrade(&self.listeners),
            event: event.to_string(),
            id,
        }
    }

    /// Remove every registration of `handler` for `event`, compared by
    /// pointer identity. Returns whether anything was removed.
    pub fn off(&self, event: &str, handler: &Handler<P>) -> bool {
        let target = Arc::as_ptr(handler) as *const ();
        let mut listeners = lock(&self.listeners);
        let Some(subscriptions) = listeners.get_mut(event) else {
            return false;
        };
        let before = subscriptions.len();
        subscriptions.retain(|s| Arc::as_ptr(&s.handler) as *const () != target);
        let removed = subscriptions.len() < before;
        if subscriptions.is_empty() {
            listeners.remove(event);
        }
        removed
    }

    /// Invoke every handler registered for `event`, in subscription order.
    ///
    /// Handlers registered when `emit` starts are the ones invoked; handlers
    /// may subscribe or unsubscribe during dispatch without deadlocking.
    pub fn emit(&self, event: &str, payload: &P) -> EmitReport {
        let snapshot: Vec<(SubscriptionId, Handler<P>)> = lock(&self.listeners)
            .get(event)
            .map(|subs| {
                subs.iter()
                    .map(|s| (s.id, Arc::clone(&s.handler)))
                    .collect()
            })
            .unwrap_or_default();

        let mut report = EmitReport::default();
        for (id, handler) in snapshot {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler(payload)))
                .unwrap_or_else(|panic| Err(ListenerError::Panicked(panic_message(panic.as_ref()))));
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(event = event, subscription = %id, error = %err, "listener failed");
                    report.failed.push((id, err));
                }
            }
        }
        debug!(
            event = event,
            delivered = report.delivered,
            failed = report.failed.len(),
            "event emitted"
        );
        report
    }

    /// Remove every listener for every event.
    pub fn clear(&self) {
        lock(&self.listeners).clear();
    }

    /// Live number of handlers for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        lock(&self.listeners).get(event).map_or(0, Vec::len)
    }

    /// Names of events that currently have at least one handler, sorted.
    pub fn events(&self) -> Vec<String> {
        lock(&self.listeners).keys().cloned().collect()
    }
}

impl<P: NamedEvent> EventBus<P> {
    /// Emit `payload` under its own event name.
    pub fn publish(&self, payload: &P) -> EmitReport {
        self.emit(payload.event_name(), payload)
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Handle that removes exactly one registration.
///
/// Dropping the handle does not unsubscribe.
pub struct Unsubscribe<P> {
    listeners: Weak<Mutex<Listeners<P>>>,
    event: String,
    id: SubscriptionId,
}

impl<P> Unsubscribe<P> {
    /// Remove the registration. Returns `false` when it was already gone.
    pub fn unsubscribe(&self) -> bool {
        let Some(listeners) = self.listeners.upgrade() else {
            return false;
        };
        let removed = remove_subscription(&mut lock(&listeners), &self.event, self.id);
        if removed {
            debug!(event = %self.event, subscription = %self.id, "listener removed");
        }
        removed
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn event(&self) -> &str {
        &self.event
    }
}

impl<P> Clone for Unsubscribe<P> {
    fn clone(&self) -> Self {
        Self {
            listeners: Weak::clone(&self.listeners),
            event: self.event.clone(),
            id: self.id,
        }
    }
}

impl<P> fmt::Debug for Unsubscribe<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Unsubscribe")
            .field("event", &self.event)
            .field("id", &self.id)
            .finish()
    }
}
