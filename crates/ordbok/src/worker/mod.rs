//! The composition root of the generation worker.
//!
//! [`GenerationWorker`] owns the shared [`TaskQueue`], [`InFlightTracker`]
//! and the handles of every background loop: `num_dispatchers` dispatcher
//! workers plus one scanner. Collaborators (store, backend, event bus) are
//! injected; nothing here is global.
//!
//! The request layer talks to the worker through [`GenerationWorker::submit`]
//! and [`GenerationWorker::retry`], which only enqueue work. Results reach
//! clients as events on the [`EventBus`].

use crate::{
    Error, Result,
    backend::GenerationBackend,
    dispatcher::{Dispatcher, StatsSnapshot},
    events::{EventBus, SubscriberId, Subscription},
    inflight::{DEFAULT_COOLDOWN, InFlightTracker},
    model::{Item, normalize_key},
    queue::TaskQueue,
    scanner::{ScanPolicy, Scanner},
    store::ItemStore,
    time::{MonotonicClock, TimeSource},
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

/// Runtime settings for a [`GenerationWorker`].
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of dispatcher loops sharing the queue.
    pub num_dispatchers: usize,
    /// How long a key stays blocked after each acquisition.
    pub cooldown: Duration,
    pub scan: ScanPolicy,
    /// Upper bound on how long [`GenerationWorker::shutdown`] waits for the
    /// background loops.
    pub shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            num_dispatchers: 1,
            cooldown: DEFAULT_COOLDOWN,
            scan: ScanPolicy::default(),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Result of [`GenerationWorker::submit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// The item as stored when the submission was accepted.
    pub item: Item,
    /// `true` when this call created the item.
    pub created: bool,
    /// `true` when a generation task was queued.
    pub enqueued: bool,
}

pub struct GenerationWorker {
    config: WorkerConfig,
    queue: Arc<TaskQueue>,
    tracker: Arc<InFlightTracker>,
    store: Arc<dyn ItemStore>,
    events: Arc<EventBus>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl GenerationWorker {
    /// Builds the worker and spawns its dispatcher and scanner loops.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(
        config: WorkerConfig,
        store: Arc<dyn ItemStore>,
        backend: Arc<dyn GenerationBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::start_with_clock(
            config,
            Arc::new(MonotonicClock::new()),
            store,
            backend,
            events,
        )
    }

    /// Like [`GenerationWorker::start`], with cooldowns measured against
    /// `clock`.
    pub fn start_with_clock(
        config: WorkerConfig,
        clock: Arc<dyn TimeSource>,
        store: Arc<dyn ItemStore>,
        backend: Arc<dyn GenerationBackend>,
        events: Arc<EventBus>,
    ) -> Self {
        let queue = Arc::new(TaskQueue::new());
        let tracker = Arc::new(InFlightTracker::with_clock(config.cooldown, clock));
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&queue),
            Arc::clone(&tracker),
            Arc::clone(&store),
            backend,
            Arc::clone(&events),
        ));
        let shutdown = CancellationToken::new();

        let workers = config.num_dispatchers.max(1);
        let mut handles = Vec::with_capacity(workers + 1);
        for worker_id in 0..workers {
            handles.push(tokio::spawn(
                Arc::clone(&dispatcher).run(worker_id, shutdown.clone()),
            ));
        }

        let scanner = Scanner::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&tracker),
            config.scan,
        );
        handles.push(tokio::spawn(scanner.run(shutdown.clone())));

        tracing::info!(
            dispatchers = workers,
            cooldown = ?config.cooldown,
            "Generation worker started"
        );

        Self {
            config,
            queue,
            tracker,
            store,
            events,
            dispatcher,
            shutdown,
            handles: Mutex::new(handles),
        }
    }

    /// Registers interest in a word.
    ///
    /// Creates the item if it does not exist yet and queues a non-retry task
    /// when the item is new or still has no entries. Submitting a word that
    /// already has content is a no-op apart from returning it.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidKey`] if the word is empty or too long.
    /// - [`Error::Store`] if the item could not be created.
    /// - [`Error::ServiceShutdown`] after [`GenerationWorker::shutdown`].
    pub async fn submit(&self, word: &str) -> Result<Submission> {
        self.ensure_running()?;
        let key = normalize_key(word)?;
        let (item, created) = self.store.create(&key).await?;

        let enqueued = (created || item.is_pending()) && self.queue.enqueue(key.as_str(), false);
        tracing::debug!(%key, created, enqueued, "Submission accepted");

        Ok(Submission {
            item,
            created,
            enqueued,
        })
    }

    /// Queues a regeneration for an existing word. The new entry is appended
    /// to the ones already stored.
    ///
    /// Returns the item as it was before the retry ran.
    ///
    /// # Errors
    ///
    /// - [`Error::NotFound`] if the word was never submitted.
    /// - [`Error::InvalidKey`], [`Error::Store`] and
    ///   [`Error::ServiceShutdown`] as for [`GenerationWorker::submit`].
    pub async fn retry(&self, word: &str) -> Result<Item> {
        self.ensure_running()?;
        let item = self.get(word).await?;
        if !self.queue.enqueue(item.key.as_str(), true) {
            return Err(Error::ServiceShutdown);
        }
        tracing::debug!(key = %item.key, "Retry queued");
        Ok(item)
    }

    /// Loads the item for `word`.
    ///
    /// # Errors
    ///
    /// [`Error::NotFound`] when absent, [`Error::InvalidKey`] or
    /// [`Error::Store`] otherwise.
    pub async fn get(&self, word: &str) -> Result<Item> {
        let key = normalize_key(word)?;
        self.store
            .get(&key)
            .await?
            .ok_or(Error::NotFound { key })
    }

    /// All stored items ordered by key.
    pub async fn list(&self) -> Result<Vec<Item>> {
        Ok(self.store.list().await?)
    }

    pub fn subscribe(&self) -> Subscription {
        self.events.subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats().snapshot()
    }

    /// Number of keys currently being generated.
    pub fn in_flight(&self) -> usize {
        self.tracker.in_flight_count()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub const fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stops the worker.
    ///
    /// New submissions are refused, the queue is closed, and every background
    /// loop is given up to `shutdown_timeout` to finish its current task.
    /// Loops still running after that are aborted. Finally all subscribers
    /// are closed so their streams end. Calling this more than once is a
    /// no-op.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        tracing::info!("Refusing new submissions");
        self.shutdown.cancel();
        self.queue.close();

        let handles = std::mem::take(&mut *self.handles.lock());
        let aborts: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        tracing::debug!(
            "Waiting up to {:?} for {} background loops",
            self.config.shutdown_timeout,
            handles.len()
        );

        match tokio::time::timeout(
            self.config.shutdown_timeout,
            futures::future::join_all(handles),
        )
        .await
        {
            Ok(results) => {
                for e in results.into_iter().filter_map(core::result::Result::err) {
                    tracing::error!("Background loop ended abnormally: {e}");
                }
            }
            Err(_) => {
                tracing::warn!(
                    "Graceful shutdown timed out ({} keys still in flight)",
                    self.tracker.in_flight_count()
                );
                for abort in aborts {
                    abort.abort();
                }
            }
        }

        self.events.close_all();
        tracing::info!("Generation worker shutdown complete");
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::ServiceShutdown);
        }
        Ok(())
    }
}

impl Drop for GenerationWorker {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.queue.close();
    }
}
