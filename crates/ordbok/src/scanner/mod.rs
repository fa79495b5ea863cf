//! Periodic rediscovery of items that never got content.
//!
//! Items can be left pending by a crash, a restart, a failed backend call or
//! a task dropped during its cooldown. The [`Scanner`] finds them and feeds
//! them back into the queue as non-retry tasks, so nothing stays stuck
//! without a client having to ask again.
//!
//! The scan interval adapts through [`ScanBackoff`]: any pass that finds work
//! snaps it back to the base interval, while a quiet system is polled less
//! and less often up to a ceiling.

use crate::{
    inflight::InFlightTracker, queue::TaskQueue, store::ItemStore, store::StoreError,
    telemetry::record_pending_found,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;


/// Tuning knobs for the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// Interval after a pass that found pending items, and the starting point.
    pub base: Duration,
    /// Upper bound for the interval while idle.
    pub ceiling: Duration,
    /// Fixed delay before retrying after a store failure.
    pub retry_delay: Duration,
    /// Consecutive empty passes required before the interval starts growing.
    pub idle_passes_before_backoff: u32,
}

impl Default for ScanPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(30),
            ceiling: Duration::from_secs(300),
            retry_delay: Duration::from_secs(5),
            idle_passes_before_backoff: 2,
        }
    }
}

/// Adaptive interval state for the scanner loop.
#[derive(Debug, Clone)]
pub struct ScanBackoff {
    policy: ScanPolicy,
    current: Duration,
    idle_streak: u32,
}

impl ScanBackoff {
    pub fn new(policy: ScanPolicy) -> Self {
        Self {
            current: policy.base,
            idle_streak: 0,
            policy,
        }
    }

    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Feeds the result of a pass and returns how long to sleep before the
    /// next one.
    pub fn record(&mut self, found: usize) -> Duration {
        if found > 0 {
            self.idle_streak = 0;
            self.current = self.policy.base;
        } else {
            self.idle_streak = self.idle_streak.saturating_add(1);
            if self.idle_streak >= self.policy.idle_passes_before_backoff {
                self.current = self
                    .current
                    .saturating_mul(2)
                    .min(self.policy.ceiling)
                    .max(self.policy.base);
            }
        }
        self.current
    }
}

pub struct Scanner {
    store: Arc<dyn ItemStore>,
    queue: Arc<TaskQueue>,
    tracker: Arc<InFlightTracker>,
    policy: ScanPolicy,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn ItemStore>,
        queue: Arc<TaskQueue>,
        tracker: Arc<InFlightTracker>,
        policy: ScanPolicy,
    ) -> Self {
        Self {
            store,
            queue,
            tracker,
            policy,
        }
    }

    /// Runs a single pass: enqueue a non-retry task for every pending item.
    ///
    /// Returns the number of pending items found.
    pub async fn pass(&self) -> Result<usize, StoreError> {
        let pending = self.store.find_pending().await?;
        for item in &pending {
            self.queue.enqueue(item.key.clone(), false);
        }

        let pruned = self.tracker.prune_expired();
        record_pending_found(pending.len());
        tracing::debug!(found = pending.len(), pruned, "Scanner pass complete");
        Ok(pending.len())
    }

    /// Scanner loop. The first pass runs immediately, which is what picks up
    /// work left behind by a previous process.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::trace!("Scanner started");
        let mut backoff = ScanBackoff::new(self.policy);

        loop {
            let delay = match self.pass().await {
                Ok(found) => {
                    if found > 0 {
                        tracing::info!("Found {found} pending items");
                    }
                    backoff.record(found)
                }
                Err(e) => {
                    tracing::error!(
                        "Scanner failed to query pending items, retrying in {:?}: {e}",
                        self.policy.retry_delay
                    );
                    self.policy.retry_delay
                }
            };

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(delay) => {}
            }
        }

        tracing::trace!("Scanner stopped");
    }
}
