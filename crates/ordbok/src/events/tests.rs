use super::*;

#[test]
fn events_serialize_with_kind_tag() {
    let ready = serde_json::to_value(Event::ready("glad", "glad")).unwrap();
    assert_eq!(
        ready,
        serde_json::json!({"kind": "ready", "key": "glad", "word": "glad"})
    );

    let error = serde_json::to_value(Event::error("x", "backend exploded")).unwrap();
    assert_eq!(
        error,
        serde_json::json!({"kind": "error", "key": "x", "error": "backend exploded"})
    );
}

#[tokio::test]
async fn every_subscriber_sees_events_in_publish_order() {
    let bus = EventBus::new();
    let mut subs: Vec<_> = (0..3).map(|_| bus.subscribe()).collect();

    assert_eq!(bus.publish(Event::ready("a", "a")), 3);
    assert_eq!(bus.publish(Event::error("b", "nope")), 3);

    for sub in &mut subs {
        assert_eq!(sub.recv().await, Some(Event::ready("a", "a")));
        assert_eq!(sub.recv().await, Some(Event::error("b", "nope")));
    }
}

#[tokio::test]
async fn closed_subscriber_is_evicted_without_affecting_others() {
    let bus = EventBus::new();
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();
    let mut third = bus.subscribe();

    second.close();

    assert_eq!(bus.publish(Event::ready("glad", "glad")), 2);
    assert_eq!(bus.subscriber_count(), 2);
    assert_eq!(first.recv().await, Some(Event::ready("glad", "glad")));
    assert_eq!(third.recv().await, Some(Event::ready("glad", "glad")));
    assert_eq!(second.try_recv(), None);

    assert_eq!(bus.publish(Event::ready("arg", "arg")), 2);
    assert_eq!(first.recv().await, Some(Event::ready("arg", "arg")));
    assert_eq!(third.recv().await, Some(Event::ready("arg", "arg")));
}

#[test]
fn dropped_subscription_unregisters_immediately() {
    let bus = EventBus::new();
    let keep = bus.subscribe();
    drop(bus.subscribe());
    assert_eq!(bus.subscriber_count(), 1);

    for _ in 0..1000 {
        drop(bus.subscribe().into_stream());
    }
    assert_eq!(bus.subscriber_count(), 1);

    drop(keep);
    assert_eq!(bus.subscriber_count(), 0);
}

#[tokio::test]
async fn stream_yields_events_then_ends_on_unsubscribe() {
    use tokio_stream::StreamExt;

    let bus = EventBus::new();
    let mut stream = bus.subscribe().into_stream();
    bus.publish(Event::ready("glad", "glad"));
    assert!(bus.unsubscribe(stream.id()));

    assert_eq!(stream.next().await, Some(Event::ready("glad", "glad")));
    assert_eq!(stream.next().await, None);
}

#[test]
fn subscription_outliving_the_bus_drops_cleanly() {
    let bus = EventBus::new();
    let sub = bus.subscribe();
    drop(bus);
    drop(sub);
}

#[tokio::test]
async fn late_subscriber_misses_earlier_events() {
    let bus = EventBus::new();
    assert_eq!(bus.publish(Event::ready("tidig", "tidig")), 0);

    let mut late = bus.subscribe();
    bus.publish(Event::ready("sen", "sen"));
    assert_eq!(late.recv().await, Some(Event::ready("sen", "sen")));
    assert_eq!(late.try_recv(), None);
}

#[tokio::test]
async fn unsubscribe_ends_the_stream() {
    let bus = EventBus::new();
    let mut sub = bus.subscribe();
    bus.publish(Event::ready("glad", "glad"));

    assert!(bus.unsubscribe(sub.id()));
    assert!(!bus.unsubscribe(sub.id()));

    // Already-delivered events drain before end-of-stream.
    assert_eq!(sub.recv().await, Some(Event::ready("glad", "glad")));
    assert_eq!(sub.recv().await, None);
}

#[tokio::test]
async fn close_all_ends_every_stream() {
    let bus = EventBus::new();
    let mut a = bus.subscribe();
    let mut b = bus.subscribe();

    bus.close_all();
    assert_eq!(bus.subscriber_count(), 0);
    assert_eq!(a.recv().await, None);
    assert_eq!(b.recv().await, None);
}

#[test]
fn subscriber_ids_are_unique() {
    let bus = EventBus::new();
    let a = bus.subscribe();
    let b = bus.subscribe();
    assert_ne!(a.id(), b.id());
    assert!(a.id().as_u64() < b.id().as_u64());
}
