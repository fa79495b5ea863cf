use super::*;
use crate::events::Event;
use crate::model::GenerationEntry;
use crate::store::MemoryStore;
use crate::testing::{ManualClock, StubBackend};

struct Fixture {
    worker: GenerationWorker,
    store: Arc<MemoryStore>,
    backend: Arc<StubBackend>,
    clock: Arc<ManualClock>,
}

/// Starts a worker and lets the scanner's startup pass run before returning.
async fn start(store: Arc<MemoryStore>, backend: StubBackend, events: Arc<EventBus>) -> Fixture {
    let clock = Arc::new(ManualClock::new());
    let backend = Arc::new(backend);
    let worker = GenerationWorker::start_with_clock(
        WorkerConfig {
            num_dispatchers: 2,
            shutdown_timeout: Duration::from_secs(2),
            ..WorkerConfig::default()
        },
        Arc::clone(&clock) as Arc<dyn TimeSource>,
        Arc::clone(&store) as Arc<dyn ItemStore>,
        Arc::clone(&backend) as Arc<dyn GenerationBackend>,
        events,
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    Fixture {
        worker,
        store,
        backend,
        clock,
    }
}

async fn wait_processed(worker: &GenerationWorker, n: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while worker.stats().processed < n {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("tasks were processed in time");
}

async fn next_event(sub: &mut Subscription) -> Event {
    tokio::time::timeout(Duration::from_secs(5), sub.recv())
        .await
        .expect("event arrived in time")
        .expect("subscription still open")
}

#[tokio::test]
async fn submit_generates_entry_and_announces_it() {
    let events = Arc::new(EventBus::new());
    let mut sub = events.subscribe();
    let f = start(Arc::new(MemoryStore::new()), StubBackend::new(), events).await;

    let submission = f.worker.submit("glad").await.unwrap();
    assert!(submission.created);
    assert!(submission.enqueued);
    assert!(submission.item.is_pending());

    assert_eq!(next_event(&mut sub).await, Event::ready("glad", "glad"));
    let item = f.worker.get("glad").await.unwrap();
    assert_eq!(item.entries.len(), 1);
    assert_eq!(
        serde_json::to_value(Event::ready("glad", "glad")).unwrap(),
        serde_json::json!({"kind": "ready", "key": "glad", "word": "glad"})
    );

    f.worker.shutdown().await;
}

#[tokio::test]
async fn submitting_twice_yields_one_entry() {
    let f = start(
        Arc::new(MemoryStore::new()),
        StubBackend::new(),
        Arc::new(EventBus::new()),
    )
    .await;

    let first = f.worker.submit("glad").await.unwrap();
    let second = f.worker.submit("  glad ").await.unwrap();
    assert!(first.created);
    assert!(!second.created);

    let queued = u64::from(first.enqueued) + u64::from(second.enqueued);
    wait_processed(&f.worker, queued).await;

    assert_eq!(f.backend.calls(), 1);
    assert_eq!(f.store.get("glad").await.unwrap().unwrap().entries.len(), 1);

    // Once generated, submitting again does not queue anything.
    let third = f.worker.submit("glad").await.unwrap();
    assert!(!third.enqueued);

    f.worker.shutdown().await;
}

#[tokio::test]
async fn retries_within_cooldown_call_backend_once() {
    let mut done = Item::new("glad");
    done.append(GenerationEntry::new("glad betyder lycklig", vec![]));
    let f = start(
        Arc::new(MemoryStore::with_items([done])),
        StubBackend::new(),
        Arc::new(EventBus::new()),
    )
    .await;

    f.worker.retry("glad").await.unwrap();
    f.worker.retry("glad").await.unwrap();
    wait_processed(&f.worker, 2).await;

    assert_eq!(f.backend.calls(), 1);
    let stats = f.worker.stats();
    assert_eq!(stats.generated, 1);
    assert_eq!(stats.suppressed, 1);
    assert_eq!(f.store.get("glad").await.unwrap().unwrap().entries.len(), 2);

    f.worker.shutdown().await;
}

#[tokio::test]
async fn retry_after_cooldown_appends_in_call_order() {
    let events = Arc::new(EventBus::new());
    let mut sub = events.subscribe();
    let f = start(Arc::new(MemoryStore::new()), StubBackend::new(), events).await;

    f.worker.submit("glad").await.unwrap();
    next_event(&mut sub).await;

    f.clock.advance(DEFAULT_COOLDOWN);
    let before = f.worker.retry("glad").await.unwrap();
    assert_eq!(before.entries.len(), 1);
    assert_eq!(next_event(&mut sub).await, Event::ready("glad", "glad"));

    let item = f.worker.get("glad").await.unwrap();
    let explanations: Vec<_> = item.entries.iter().map(|e| e.explanation.as_str()).collect();
    assert_eq!(
        explanations,
        ["explanation #1 of glad", "explanation #2 of glad"]
    );

    f.worker.shutdown().await;
}

#[tokio::test]
async fn backend_failure_leaves_item_pending_and_reports_error() {
    let events = Arc::new(EventBus::new());
    let mut sub = events.subscribe();
    let backend = StubBackend::new();
    backend.fail_for("x");
    let f = start(Arc::new(MemoryStore::new()), backend, events).await;

    f.worker.submit("x").await.unwrap();

    match next_event(&mut sub).await {
        Event::Error { key, .. } => assert_eq!(key, "x"),
        other => panic!("expected error event, got {other:?}"),
    }
    wait_processed(&f.worker, 1).await;
    assert!(f.worker.get("x").await.unwrap().is_pending());
    assert_eq!(f.worker.in_flight(), 0);

    f.worker.shutdown().await;
}

#[tokio::test]
async fn pending_items_from_previous_run_are_recovered() {
    let store = Arc::new(MemoryStore::with_items([
        Item::new("glad"),
        Item::new("ledsen"),
    ]));
    let events = Arc::new(EventBus::new());
    let mut sub = events.subscribe();

    let f = start(Arc::clone(&store), StubBackend::new(), events).await;

    let mut ready = vec![next_event(&mut sub).await, next_event(&mut sub).await];
    ready.sort_by(|a, b| a.key().cmp(b.key()));
    assert_eq!(
        ready,
        vec![Event::ready("glad", "glad"), Event::ready("ledsen", "ledsen")]
    );
    assert!(store.find_pending().await.unwrap().is_empty());

    f.worker.shutdown().await;
}

#[tokio::test]
async fn invalid_and_unknown_words_are_rejected() {
    let f = start(
        Arc::new(MemoryStore::new()),
        StubBackend::new(),
        Arc::new(EventBus::new()),
    )
    .await;

    assert!(matches!(
        f.worker.submit("   ").await,
        Err(Error::InvalidKey { .. })
    ));
    assert!(matches!(
        f.worker.retry("okänd").await,
        Err(Error::NotFound { key }) if key == "okänd"
    ));
    assert!(matches!(
        f.worker.get("okänd").await,
        Err(Error::NotFound { .. })
    ));

    f.worker.shutdown().await;
}

#[tokio::test]
async fn shutdown_refuses_work_and_ends_subscriptions() {
    let events = Arc::new(EventBus::new());
    let mut sub = events.subscribe();
    let f = start(Arc::new(MemoryStore::new()), StubBackend::new(), events).await;

    f.worker.shutdown().await;
    f.worker.shutdown().await;

    assert!(f.worker.is_shutdown());
    assert!(matches!(
        f.worker.submit("glad").await,
        Err(Error::ServiceShutdown)
    ));
    assert_eq!(sub.recv().await, None);
    assert!(f.store.is_empty());
}

#[tokio::test]
async fn dispatchers_share_the_queue() {
    let gate = Arc::new(tokio::sync::Semaphore::new(0));
    let f = start(
        Arc::new(MemoryStore::new()),
        StubBackend::gated(Arc::clone(&gate)),
        Arc::new(EventBus::new()),
    )
    .await;

    f.worker.submit("glad").await.unwrap();
    f.worker.submit("ledsen").await.unwrap();

    tokio::time::timeout(Duration::from_secs(5), async {
        while f.backend.calls() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("both dispatchers picked up work");
    assert_eq!(f.backend.max_active(), 2);
    assert_eq!(f.worker.in_flight(), 2);

    gate.add_permits(2);
    wait_processed(&f.worker, 2).await;
    f.worker.shutdown().await;
}
