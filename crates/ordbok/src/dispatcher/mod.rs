//! Dispatcher workers: turn queued tasks into persisted entries and events.
//!
//! Each worker runs [`Dispatcher::run`], pulling one [`Task`] at a time from
//! the shared [`TaskQueue`]. A pass over a task:
//!
//! 1. claims the key through the [`InFlightTracker`] (duplicates are dropped),
//! 2. loads the item (a vanished item is dropped),
//! 3. skips non-retry tasks for items that already have content,
//! 4. calls the backend on its own Tokio task,
//! 5. appends and saves the entry, then publishes a `ready` event, or
//!    publishes an `error` event and leaves the item untouched.
//!
//! The key is released when the pass ends, whatever the outcome. Failures are
//! terminal for the task: recovery comes from the scanner or an explicit
//! retry.

use crate::{
    backend::{BackendError, GenerationBackend},
    events::{Event, EventBus},
    inflight::InFlightTracker,
    model::{GenerationEntry, Item, Task},
    queue::TaskQueue,
    store::ItemStore,
    telemetry::{
        increment_duplicates_suppressed, increment_generation_errors, increment_generations,
        increment_tasks_dequeued, record_generation_duration,
    },
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::CancellationToken;


/// What a single dispatcher pass did with its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A new entry was persisted; `entries` is the item's new entry count.
    Generated { entries: usize },
    /// Non-retry task for an item that already has content.
    AlreadyGenerated,
    /// The key was in flight or cooling down.
    Suppressed,
    /// No item is stored under the key.
    Missing,
    /// The backend failed; an error event was published.
    BackendFailed,
    /// The store failed to load or save the item.
    StoreFailed,
}

/// Running totals across all dispatcher workers.
#[derive(Debug, Default)]
pub struct DispatchStats {
    processed: AtomicU64,
    generated: AtomicU64,
    skipped: AtomicU64,
    suppressed: AtomicU64,
    missing: AtomicU64,
    failed: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub processed: u64,
    pub generated: u64,
    pub skipped: u64,
    pub suppressed: u64,
    pub missing: u64,
    pub failed: u64,
}

impl DispatchStats {
    fn record(&self, outcome: &DispatchOutcome) {
        let counter = match outcome {
            DispatchOutcome::Generated { .. } => &self.generated,
            DispatchOutcome::AlreadyGenerated => &self.skipped,
            DispatchOutcome::Suppressed => &self.suppressed,
            DispatchOutcome::Missing => &self.missing,
            DispatchOutcome::BackendFailed | DispatchOutcome::StoreFailed => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        // Bumped last so a reader that sees `processed == n` sees all n outcomes.
        self.processed.fetch_add(1, Ordering::Release);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed: self.processed.load(Ordering::Acquire),
            generated: self.generated.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            missing: self.missing.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

pub struct Dispatcher {
    queue: Arc<TaskQueue>,
    tracker: Arc<InFlightTracker>,
    store: Arc<dyn ItemStore>,
    backend: Arc<dyn GenerationBackend>,
    events: Arc<EventBus>,
    stats: Arc<DispatchStats>,
}

impl Dispatcher {
    pub fn new(
        queue: Arc<TaskQueue>,
        tracker: Arc<InFlightTracker>,
        store: Arc<dyn ItemStore>,
        backend: Arc<dyn GenerationBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            queue,
            tracker,
            store,
            backend,
            events,
            stats: Arc::default(),
        }
    }

    pub fn stats(&self) -> &Arc<DispatchStats> {
        &self.stats
    }

    /// Worker loop. Runs until `shutdown` is cancelled or the queue closes.
    ///
    /// A task that has already been dequeued is always processed to
    /// completion; cancellation is only observed while waiting for work.
    pub async fn run(self: Arc<Self>, worker_id: usize, shutdown: CancellationToken) {
        tracing::trace!("Dispatcher {worker_id} started");

        loop {
            let task = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    tracing::debug!("Dispatcher {worker_id} received shutdown signal");
                    break;
                }
                task = self.queue.dequeue() => match task {
                    Some(task) => task,
                    None => break,
                },
            };

            increment_tasks_dequeued();
            let outcome = self.process(task).await;
            tracing::trace!(worker_id, ?outcome, "Dispatcher pass finished");
        }

        tracing::trace!("Dispatcher {worker_id} stopped");
    }

    /// Runs one dispatcher pass for `task`.
    #[tracing::instrument(skip_all, fields(key = %task.key, retry = task.retry))]
    pub async fn process(&self, task: Task) -> DispatchOutcome {
        let outcome = self.dispatch(task).await;
        self.stats.record(&outcome);
        outcome
    }

    async fn dispatch(&self, task: Task) -> DispatchOutcome {
        // Released on every return path below.
        let Some(_guard) = self.tracker.acquire(&task.key) else {
            tracing::debug!("Skipping, already in flight or cooling down");
            increment_duplicates_suppressed();
            return DispatchOutcome::Suppressed;
        };

        let item = match self.store.get(&task.key).await {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::warn!("Item vanished before processing");
                return DispatchOutcome::Missing;
            }
            Err(e) => {
                tracing::error!("Failed to load item: {e}");
                increment_generation_errors();
                return DispatchOutcome::StoreFailed;
            }
        };

        if !task.retry && !item.is_pending() {
            tracing::debug!(entries = item.entries.len(), "Already generated");
            return DispatchOutcome::AlreadyGenerated;
        }

        tracing::info!("Generating explanation for: {}", item.word());
        let started = Instant::now();
        let result = self.call_backend(&item).await;
        record_generation_duration(started.elapsed().as_secs_f64() * 1_000.0);

        match result {
            Ok(entry) => self.commit(item, entry).await,
            Err(e) => {
                tracing::error!("Error generating explanation: {e}");
                increment_generation_errors();
                self.events.publish(Event::error(&item.key, &e));
                DispatchOutcome::BackendFailed
            }
        }
    }

    /// Runs the backend on its own task so a slow call never stalls the
    /// scheduler, and a panic inside it becomes an ordinary failure.
    async fn call_backend(&self, item: &Item) -> Result<GenerationEntry, BackendError> {
        let backend = Arc::clone(&self.backend);
        let key = item.key.clone();
        let prior = item.entries.clone();

        tokio::spawn(async move { backend.generate(&key, &prior).await })
            .await
            .unwrap_or_else(|e| Err(BackendError::Aborted(e.to_string())))
    }

    async fn commit(&self, mut item: Item, entry: GenerationEntry) -> DispatchOutcome {
        item.append(entry);

        if let Err(e) = self.store.save(&item).await {
            tracing::error!("Failed to save generated entry: {e}");
            increment_generation_errors();
            self.events.publish(Event::error(&item.key, &e));
            return DispatchOutcome::StoreFailed;
        }

        increment_generations();
        tracing::info!(entries = item.entries.len(), "Successfully processed: {}", item.word());
        self.events.publish(Event::ready(&item.key, item.word()));
        DispatchOutcome::Generated {
            entries: item.entries.len(),
        }
    }
}
