//! Change notifications for UI observers.
//!
//! Every store emits [`EngineEvent`]s on an [`EventBus`]. Observers subscribe
//! to one [`EventKind`] and get back a [`Subscription`] that removes the
//! handler when `unsubscribe` is called. Ordering is only guaranteed within
//! a single kind.

use crate::alias::{Alias, AliasSettings};
use crate::completion::{CompletionSettings, CompletionState};
use crate::history::{HistoryEntry, HistorySettings};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::trace;

/// Discriminant used to subscribe to a family of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SettingsChanged,
    CommandAdded,
    HistoryCleared,
    HistoryImported,
    CacheCleared,
    ProviderRegistered,
    ProviderUnregistered,
    CompletionStateChanged,
    AliasesChanged,
}

/// Settings payload, tagged by the store that owns them.
#[derive(Debug, Clone, PartialEq)]
pub enum SettingsPayload {
    History(HistorySettings),
    Completion(CompletionSettings),
    Aliases(AliasSettings),
}

/// A change notification with its new value.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SettingsChanged(SettingsPayload),
    CommandAdded(HistoryEntry),
    /// `None` when every session was cleared.
    HistoryCleared { session_id: Option<String> },
    HistoryImported { sessions: usize, entries: usize },
    CacheCleared,
    ProviderRegistered { name: String },
    ProviderUnregistered { name: String },
    CompletionStateChanged(CompletionState),
    AliasesChanged(Vec<Alias>),
}

impl EngineEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::SettingsChanged(_) => EventKind::SettingsChanged,
            EngineEvent::CommandAdded(_) => EventKind::CommandAdded,
            EngineEvent::HistoryCleared { .. } => EventKind::HistoryCleared,
            EngineEvent::HistoryImported { .. } => EventKind::HistoryImported,
            EngineEvent::CacheCleared => EventKind::CacheCleared,
            EngineEvent::ProviderRegistered { .. } => EventKind::ProviderRegistered,
            EngineEvent::ProviderUnregistered { .. } => EventKind::ProviderUnregistered,
            EngineEvent::CompletionStateChanged(_) => EventKind::CompletionStateChanged,
            EngineEvent::AliasesChanged(_) => EventKind::AliasesChanged,
        }
    }
}

type Handler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    handlers: HashMap<EventKind, Vec<(u64, Handler)>>,
}

/// Cloneable handle to a set of subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        let total: usize = inner.handlers.values().map(Vec::len).sum();
        f.debug_struct("EventBus")
            .field("subscribers", &total)
            .finish()
    }
}

fn lock(inner: &Mutex<BusInner>) -> MutexGuard<'_, BusInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .handlers
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Deliver `event` to every handler subscribed to its kind.
    pub fn emit(&self, event: EngineEvent) {
        let kind = event.kind();
        // Handlers run without the lock held so they may subscribe or emit.
        let handlers: Vec<Handler> = {
            let inner = lock(&self.inner);
            inner
                .handlers
                .get(&kind)
                .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };
        trace!(?kind, subscribers = handlers.len(), "Emitting engine event");
        for handler in handlers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        lock(&self.inner)
            .handlers
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug)]
#[must_use = "dropping a Subscription keeps the handler registered; call unsubscribe() to remove it"]
pub struct Subscription {
    bus: Weak<Mutex<BusInner>>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler. A no-op if the bus is already gone.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            let mut inner = lock(&bus);
            if let Some(handlers) = inner.handlers.get_mut(&self.kind) {
                handlers.retain(|(id, _)| *id != self.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscribe_receives_matching_kind_only() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let _sub = bus.subscribe(EventKind::CacheCleared, move |event| {
            assert!(matches!(event, EngineEvent::CacheCleared));
            h.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(EngineEvent::CacheCleared);
        bus.emit(EngineEvent::ProviderRegistered {
            name: "custom".into(),
        });
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = bus.subscribe(EventKind::CacheCleared, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(EventKind::CacheCleared), 1);

        sub.unsubscribe();
        bus.emit(EngineEvent::CacheCleared);
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(bus.subscriber_count(EventKind::CacheCleared), 0);
    }

    #[test]
    fn test_handler_may_subscribe_during_emit() {
        let bus = EventBus::new();
        let inner_bus = bus.clone();
        let _sub = bus.subscribe(EventKind::CacheCleared, move |_| {
            let _nested = inner_bus.subscribe(EventKind::AliasesChanged, |_| {});
        });
        bus.emit(EngineEvent::CacheCleared);
        assert_eq!(bus.subscriber_count(EventKind::AliasesChanged), 1);
    }

    #[test]
    fn test_unsubscribe_after_bus_dropped_is_noop() {
        let bus = EventBus::new();
        let sub = bus.subscribe(EventKind::HistoryCleared, |_| {});
        drop(bus);
        sub.unsubscribe();
    }

    #[test]
    fn test_event_kind_mapping() {
        let event = EngineEvent::HistoryCleared { session_id: None };
        assert_eq!(event.kind(), EventKind::HistoryCleared);
        let event = EngineEvent::HistoryImported {
            sessions: 1,
            entries: 3,
        };
        assert_eq!(event.kind(), EventKind::HistoryImported);
    }
}
