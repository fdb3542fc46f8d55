//! Typed publish/subscribe event bus with replay-on-subscribe.
//!
//! Subscribers register per [`EventKind`]. The bus keeps a state snapshot -
//! the most recent event per identity key (see [`Event::key`]) - so a
//! late-joining subscriber can reconstruct current state without a "give me
//! everything" RPC: subscribing replays every cached event of that kind
//! synchronously, before any live dispatch reaches the new subscriber.
//!
//! Unsubscription is explicit: `on()` returns a [`Subscription`] handle the
//! owner passes to `off()` on teardown. Callbacks must not call back into
//! the bus; they are invoked with the bus lock held to guarantee the
//! replay-before-live ordering.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use stompproto::{Event, EventKey, EventKind};

/// Subscriber callback. Runs on whichever task dispatches the event, so it
/// should only hand the event off, e.g. into a channel.
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// Handle identifying one subscription, for [`EventBus::off`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

#[derive(Default)]
struct BusInner {
    listeners: HashMap<EventKind, Vec<(u64, EventCallback)>>,
    // Insertion-ordered per kind; updating a key moves it to the back so
    // replay preserves arrival order of the *latest* versions.
    snapshot: HashMap<EventKind, Vec<(EventKey, Event)>>,
}

/// The dispatcher.
#[derive(Default)]
pub struct EventBus {
    inner: Mutex<BusInner>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one event kind. Cached events of that kind are
    /// replayed to `callback` before this returns.
    pub fn on(&self, kind: EventKind, callback: EventCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().expect("bus lock");

        if let Some(cached) = inner.snapshot.get(&kind) {
            for (_, event) in cached {
                callback(event);
            }
        }

        inner
            .listeners
            .entry(kind)
            .or_default()
            .push((id, callback));

        Subscription { kind, id }
    }

    /// Remove a subscription. The callback stops firing once this returns.
    pub fn off(&self, subscription: &Subscription) {
        let mut inner = self.inner.lock().expect("bus lock");
        if let Some(list) = inner.listeners.get_mut(&subscription.kind) {
            list.retain(|(id, _)| *id != subscription.id);
        }
    }

    /// Deliver one event: update the snapshot, then fan out to subscribers
    /// of its kind, in subscription order.
    pub fn dispatch(&self, event: Event) {
        let mut inner = self.inner.lock().expect("bus lock");

        let key = event.key();
        let kind = event.kind();
        let cached = inner.snapshot.entry(kind).or_default();
        cached.retain(|(k, _)| *k != key);
        cached.push((key, event.clone()));

        if let Some(listeners) = inner.listeners.get(&kind) {
            for (_, callback) in listeners {
                callback(&event);
            }
        }
    }

    /// Drop every cached event. Called when the transport (re)opens: a
    /// fresh connection means fresh authoritative state is about to be
    /// streamed.
    pub fn clear(&self) {
        self.inner.lock().expect("bus lock").snapshot.clear();
    }

    /// Number of cached events of one kind, for diagnostics.
    pub fn cached(&self, kind: EventKind) -> usize {
        self.inner
            .lock()
            .expect("bus lock")
            .snapshot
            .get(&kind)
            .map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    fn param(label: &str, symbol: &str, value: f64) -> Event {
        Event::ParamChanged {
            label: label.into(),
            symbol: symbol.into(),
            value,
        }
    }

    fn collector() -> (EventCallback, Arc<StdMutex<Vec<Event>>>) {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: EventCallback = Arc::new(move |e: &Event| sink.lock().unwrap().push(e.clone()));
        (cb, seen)
    }

    #[test]
    fn replay_keeps_only_latest_per_key() {
        let bus = EventBus::new();
        bus.dispatch(param("a", "Gain", 0.1));
        bus.dispatch(param("a", "Gain", 0.5));
        bus.dispatch(param("a", "Gain", 0.9));

        let (cb, seen) = collector();
        bus.on(EventKind::ParamChanged, cb);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(*seen, vec![param("a", "Gain", 0.9)]);
    }

    #[test]
    fn replay_preserves_distinct_keys() {
        let bus = EventBus::new();
        bus.dispatch(param("a", "Gain", 0.1));
        bus.dispatch(param("b", "Tone", 0.2));
        bus.dispatch(param("a", "Gain", 0.3));

        let (cb, seen) = collector();
        bus.on(EventKind::ParamChanged, cb);

        // Updated key moved to the back.
        assert_eq!(
            *seen.lock().unwrap(),
            vec![param("b", "Tone", 0.2), param("a", "Gain", 0.3)]
        );
    }

    #[test]
    fn off_stops_delivery() {
        let bus = EventBus::new();
        let (cb, seen) = collector();
        let sub = bus.on(EventKind::ParamChanged, cb);

        bus.dispatch(param("a", "Gain", 0.1));
        bus.off(&sub);
        bus.dispatch(param("a", "Gain", 0.2));

        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn kinds_are_isolated() {
        let bus = EventBus::new();
        let (cb, seen) = collector();
        bus.on(EventKind::PluginRemoved, cb);

        bus.dispatch(param("a", "Gain", 0.1));
        assert!(seen.lock().unwrap().is_empty());

        bus.dispatch(Event::PluginRemoved { label: "a".into() });
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn clear_empties_the_snapshot() {
        let bus = EventBus::new();
        bus.dispatch(param("a", "Gain", 0.1));
        assert_eq!(bus.cached(EventKind::ParamChanged), 1);

        bus.clear();
        assert_eq!(bus.cached(EventKind::ParamChanged), 0);

        let (cb, seen) = collector();
        bus.on(EventKind::ParamChanged, cb);
        assert!(seen.lock().unwrap().is_empty());
    }
}
