//! Shared fakes for unit tests.

use crate::{
    backend::{BackendError, GenerationBackend},
    model::{GenerationEntry, Item},
    store::{ItemStore, MemoryStore, StoreError},
    time::TimeSource,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Semaphore;

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn current_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Backend that answers with numbered entries, fails for selected keys and
/// can be held at a gate to keep calls in flight.
#[derive(Default)]
pub struct StubBackend {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    failing: Mutex<HashSet<String>>,
    seen_prior: Mutex<Vec<(String, usize)>>,
    gate: Option<Arc<Semaphore>>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls block until `gate` hands out a permit.
    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn fail_for(&self, key: &str) {
        self.failing.lock().insert(key.to_string());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    /// `(key, number of prior entries)` for every call, in call order.
    pub fn seen_prior(&self) -> Vec<(String, usize)> {
        self.seen_prior.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    async fn generate(
        &self,
        key: &str,
        prior: &[GenerationEntry],
    ) -> Result<GenerationEntry, BackendError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen_prior.lock().push((key.to_string(), prior.len()));

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.lock().contains(key) {
            return Err(BackendError::Request(format!("stub refused {key}")));
        }
        Ok(GenerationEntry::new(
            format!("explanation #{call} of {key}"),
            vec!["lycklig".to_string()],
        ))
    }
}

/// Store whose `find_pending` and `save` can be made to fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    pending_failures: AtomicUsize,
    pending_calls: AtomicUsize,
    fail_saves: AtomicBool,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` `find_pending` calls fail.
    pub fn fail_next_scans(&self, n: usize) {
        self.pending_failures.store(n, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn scan_calls(&self) -> usize {
        self.pending_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemStore for FlakyStore {
    async fn get(&self, key: &str) -> Result<Option<Item>, StoreError> {
        self.inner.get(key).await
    }

    async fn save(&self, item: &Item) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk on fire".into()));
        }
        self.inner.save(item).await
    }

    async fn find_pending(&self) -> Result<Vec<Item>, StoreError> {
        self.pending_calls.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        self.inner.find_pending().await
    }

    async fn create(&self, key: &str) -> Result<(Item, bool), StoreError> {
        self.inner.create(key).await
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        self.inner.list().await
    }
}
