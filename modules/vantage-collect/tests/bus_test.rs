// Broadcast bus semantics: filtering, ordering, replay, eviction.

use vantage_common::bus::BroadcastBus;
use vantage_common::{BroadcastEvent, EventType};

fn event(event_type: EventType, tag: &str) -> BroadcastEvent {
    BroadcastEvent::new(event_type, serde_json::json!({ "tag": tag }))
}

#[tokio::test]
async fn subscriber_receives_events_in_broadcast_order() {
    let bus = BroadcastBus::new();
    let (_id, mut rx) = bus.subscribe(&[]);

    bus.broadcast(event(EventType::CollectionStarted, "first"));
    bus.broadcast(event(EventType::CollectionCompleted, "second"));
    bus.broadcast(event(EventType::SystemStatus, "third"));

    let first = rx.recv().await.unwrap();
    let second = rx.recv().await.unwrap();
    let third = rx.recv().await.unwrap();
    assert_eq!(first.data["tag"], "first");
    assert_eq!(second.data["tag"], "second");
    assert_eq!(third.data["tag"], "third");
}

#[tokio::test]
async fn filter_limits_delivery_and_empty_filter_means_all() {
    let bus = BroadcastBus::new();
    let (_a, mut only_failures) = bus.subscribe(&[EventType::CollectionFailed]);
    let (_b, mut everything) = bus.subscribe(&[]);

    let sent = bus.broadcast(event(EventType::CollectionStarted, "started"));
    assert_eq!(sent, 1, "only the unfiltered subscriber matches");
    let sent = bus.broadcast(event(EventType::CollectionFailed, "failed"));
    assert_eq!(sent, 2);

    assert_eq!(only_failures.recv().await.unwrap().data["tag"], "failed");
    assert_eq!(everything.recv().await.unwrap().data["tag"], "started");
    assert_eq!(everything.recv().await.unwrap().data["tag"], "failed");
}

#[tokio::test]
async fn late_joiner_can_replay_history() {
    let bus = BroadcastBus::new();
    bus.broadcast(event(EventType::CollectionStarted, "early-1"));
    bus.broadcast(event(EventType::ProcessingStarted, "early-2"));

    let (_id, mut rx) = bus.subscribe_with_replay(&[EventType::CollectionStarted]);
    let replayed = rx.recv().await.unwrap();
    assert_eq!(replayed.data["tag"], "early-1");
    assert!(rx.try_recv().is_err(), "filtered event must not replay");
}

#[tokio::test]
async fn history_ring_is_bounded() {
    let bus = BroadcastBus::with_history(5);
    for i in 0..12 {
        bus.broadcast(event(EventType::SystemStatus, &format!("e{i}")));
    }
    let recent = bus.recent_events(None, 100);
    assert_eq!(recent.len(), 5);
    assert_eq!(recent.first().unwrap().data["tag"], "e7");
    assert_eq!(recent.last().unwrap().data["tag"], "e11");
}

#[tokio::test]
async fn dropped_receiver_is_evicted_on_next_broadcast() {
    let bus = BroadcastBus::new();
    let (_kept, _rx_kept) = bus.subscribe(&[]);
    let (_dropped, rx_dropped) = bus.subscribe(&[]);
    drop(rx_dropped);
    assert_eq!(bus.subscriber_count(), 2);

    let sent = bus.broadcast(event(EventType::SystemStatus, "x"));
    assert_eq!(sent, 1);
    assert_eq!(bus.subscriber_count(), 1, "closed subscriber evicted");
}

#[tokio::test]
async fn failing_listener_does_not_block_others() {
    let bus = BroadcastBus::new();
    let hits = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));

    bus.add_listener(
        EventType::SystemStatus,
        Box::new(|_| anyhow::bail!("listener exploded")),
    );
    let counter = std::sync::Arc::clone(&hits);
    bus.add_listener(
        EventType::SystemStatus,
        Box::new(move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(())
        }),
    );

    bus.broadcast(event(EventType::SystemStatus, "x"));
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
}

#[tokio::test]
async fn recent_events_respects_type_filter_and_limit() {
    let bus = BroadcastBus::new();
    for i in 0..4 {
        bus.broadcast(event(EventType::CollectionCompleted, &format!("c{i}")));
        bus.broadcast(event(EventType::ProcessingCompleted, &format!("p{i}")));
    }

    let only_collection = bus.recent_events(Some(&[EventType::CollectionCompleted]), 2);
    assert_eq!(only_collection.len(), 2);
    assert_eq!(only_collection[0].data["tag"], "c2");
    assert_eq!(only_collection[1].data["tag"], "c3");
}
