// In-process pub/sub for lifecycle events.
// Subscribers receive events over bounded channels; a subscriber that can
// no longer accept delivery is evicted rather than stalling the bus.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::events::{BroadcastEvent, EventType};

const CHANNEL_CAPACITY: usize = 64;

pub type Listener = Box<dyn Fn(&BroadcastEvent) -> anyhow::Result<()> + Send + Sync>;

struct Subscriber {
    sender: mpsc::Sender<BroadcastEvent>,
    /// Empty set means "all events".
    filter: HashSet<EventType>,
}

struct Inner {
    subscribers: HashMap<u64, Subscriber>,
    history: VecDeque<BroadcastEvent>,
    listeners: HashMap<EventType, Vec<Listener>>,
    next_id: u64,
}

/// Event fan-out hub. All mutation happens under one lock, so subscriber
/// bookkeeping is serialized and per-subscriber delivery order matches
/// broadcast order.
pub struct BroadcastBus {
    inner: Mutex<Inner>,
    max_history: usize,
}

impl BroadcastBus {
    pub fn new() -> Self {
        Self::with_history(100)
    }

    pub fn with_history(max_history: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: HashMap::new(),
                history: VecDeque::new(),
                listeners: HashMap::new(),
                next_id: 0,
            }),
            max_history,
        }
    }

    /// Register a subscriber. An empty filter subscribes to everything.
    pub fn subscribe(&self, filter: &[EventType]) -> (u64, mpsc::Receiver<BroadcastEvent>) {
        let (sender, receiver) = mpsc::channel(CHANNEL_CAPACITY);
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.next_id += 1;
        let id = inner.next_id;
        inner.subscribers.insert(
            id,
            Subscriber {
                sender,
                filter: filter.iter().copied().collect(),
            },
        );
        debug!(subscriber = id, "subscriber registered");
        (id, receiver)
    }

    /// Register and immediately replay retained history matching the filter.
    pub fn subscribe_with_replay(
        &self,
        filter: &[EventType],
    ) -> (u64, mpsc::Receiver<BroadcastEvent>) {
        let (id, receiver) = self.subscribe(filter);
        let inner = self.inner.lock().expect("bus lock poisoned");
        if let Some(subscriber) = inner.subscribers.get(&id) {
            for event in &inner.history {
                if subscriber.filter.is_empty() || subscriber.filter.contains(&event.event_type) {
                    let _ = subscriber.sender.try_send(event.clone());
                }
            }
        }
        (id, receiver)
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        if inner.subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "subscriber removed");
        }
    }

    /// Register an internal listener invoked synchronously for each event
    /// of the given type, before channel delivery.
    pub fn add_listener(&self, event_type: EventType, listener: Listener) {
        let mut inner = self.inner.lock().expect("bus lock poisoned");
        inner.listeners.entry(event_type).or_default().push(listener);
    }

    /// Deliver an event to every matching subscriber. Returns the number of
    /// subscribers reached. Failed deliveries evict the subscriber.
    pub fn broadcast(&self, event: BroadcastEvent) -> usize {
        let mut inner = self.inner.lock().expect("bus lock poisoned");

        inner.history.push_back(event.clone());
        while inner.history.len() > self.max_history {
            inner.history.pop_front();
        }

        if let Some(listeners) = inner.listeners.get(&event.event_type) {
            for listener in listeners {
                if let Err(e) = listener(&event) {
                    warn!(event = %event.event_type, error = %e, "listener failed");
                }
            }
        }

        let mut sent = 0;
        let mut evicted = Vec::new();
        for (id, subscriber) in &inner.subscribers {
            if !subscriber.filter.is_empty() && !subscriber.filter.contains(&event.event_type) {
                continue;
            }
            match subscriber.sender.try_send(event.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(subscriber = id, error = %e, "delivery failed, evicting");
                    evicted.push(*id);
                }
            }
        }
        for id in evicted {
            inner.subscribers.remove(&id);
        }

        debug!(event = %event.event_type, sent, "event broadcast");
        sent
    }

    /// Recent events from the retained ring, newest last.
    pub fn recent_events(&self, filter: Option<&[EventType]>, limit: usize) -> Vec<BroadcastEvent> {
        let inner = self.inner.lock().expect("bus lock poisoned");
        let matching: Vec<BroadcastEvent> = inner
            .history
            .iter()
            .filter(|e| match filter {
                Some(types) => types.contains(&e.event_type),
                None => true,
            })
            .cloned()
            .collect();
        let skip = matching.len().saturating_sub(limit);
        matching.into_iter().skip(skip).collect()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().expect("bus lock poisoned").subscribers.len()
    }
}

impl Default for BroadcastBus {
    fn default() -> Self {
        Self::new()
    }
}

// Convenience emitters used by the scheduler and pipeline.

pub fn emit_collection_started(bus: &BroadcastBus, collector_name: &str, source_type: &str) {
    bus.broadcast(
        BroadcastEvent::new(
            EventType::CollectionStarted,
            serde_json::json!({ "collector": collector_name, "source_type": source_type }),
        )
        .with_source(collector_name),
    );
}

pub fn emit_collection_completed(
    bus: &BroadcastBus,
    collector_name: &str,
    run_id: &str,
    items_collected: i64,
    items_new: i64,
    items_duplicate: i64,
    duration_seconds: f64,
) {
    bus.broadcast(
        BroadcastEvent::new(
            EventType::CollectionCompleted,
            serde_json::json!({
                "collector": collector_name,
                "run_id": run_id,
                "items_collected": items_collected,
                "items_new": items_new,
                "items_duplicate": items_duplicate,
                "duration_seconds": duration_seconds,
            }),
        )
        .with_source(collector_name),
    );
}

pub fn emit_collection_failed(bus: &BroadcastBus, collector_name: &str, error: &str) {
    bus.broadcast(
        BroadcastEvent::new(
            EventType::CollectionFailed,
            serde_json::json!({ "collector": collector_name, "error": error }),
        )
        .with_source(collector_name),
    );
}
