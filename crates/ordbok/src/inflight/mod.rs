//! At-most-one-in-flight guard with a per-key cooldown.
//!
//! [`InFlightTracker`] keeps two pieces of state under a single lock:
//!
//! - the set of keys a dispatcher is currently working on, and
//! - the time of the last successful acquisition for every key.
//!
//! [`try_acquire`](InFlightTracker::try_acquire) checks both and records the
//! acquisition in one critical section, so two dispatchers (or a dispatcher
//! racing a scanner-fed duplicate) can never both win the same key. Releasing
//! a key clears only its in-flight membership; the timestamp stays, so the key
//! remains unavailable until the cooldown window has elapsed.

use crate::time::{MonotonicClock, TimeSource};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;


/// Default cooldown between two acquisitions of the same key.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

#[derive(Default)]
struct State {
    in_flight: HashSet<String>,
    last_attempt: HashMap<String, u64>,
}

pub struct InFlightTracker {
    state: Mutex<State>,
    cooldown_ms: u64,
    clock: Arc<dyn TimeSource>,
}

impl InFlightTracker {
    pub fn new(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, Arc::new(MonotonicClock::new()))
    }

    /// Creates a tracker that reads time from `clock`.
    pub fn with_clock(cooldown: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            state: Mutex::new(State::default()),
            cooldown_ms: u64::try_from(cooldown.as_millis()).unwrap_or(u64::MAX),
            clock,
        }
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Claims `key` if it is neither in flight nor cooling down.
    ///
    /// On success the key joins the in-flight set and its attempt time is
    /// recorded. Callers must pair a successful acquisition with
    /// [`release`](Self::release); prefer [`acquire`](Self::acquire), which
    /// does so on drop.
    pub fn try_acquire(&self, key: &str) -> bool {
        let now = self.clock.current_millis();
        let mut state = self.state.lock();

        if state.in_flight.contains(key) {
            return false;
        }
        if let Some(&last) = state.last_attempt.get(key) {
            if now.saturating_sub(last) < self.cooldown_ms {
                return false;
            }
        }

        state.in_flight.insert(key.to_owned());
        state.last_attempt.insert(key.to_owned(), now);
        true
    }

    /// Like [`try_acquire`](Self::try_acquire), but returns a guard that
    /// releases the key when dropped.
    pub fn acquire(self: &Arc<Self>, key: &str) -> Option<InFlightGuard> {
        self.try_acquire(key).then(|| InFlightGuard {
            tracker: Arc::clone(self),
            key: key.to_owned(),
        })
    }

    /// Removes `key` from the in-flight set. The cooldown timestamp is kept.
    pub fn release(&self, key: &str) {
        self.state.lock().in_flight.remove(key);
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.state.lock().in_flight.contains(key)
    }

    pub fn is_cooling_down(&self, key: &str) -> bool {
        let now = self.clock.current_millis();
        self.state
            .lock()
            .last_attempt
            .get(key)
            .is_some_and(|&last| now.saturating_sub(last) < self.cooldown_ms)
    }

    pub fn in_flight_count(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Forgets cooldown timestamps older than the window. Returns how many
    /// were dropped.
    pub fn prune_expired(&self) -> usize {
        let now = self.clock.current_millis();
        let cooldown_ms = self.cooldown_ms;
        let mut state = self.state.lock();
        let State {
            in_flight,
            last_attempt,
        } = &mut *state;

        let before = last_attempt.len();
        last_attempt.retain(|key, &mut last| {
            in_flight.contains(key) || now.saturating_sub(last) < cooldown_ms
        });
        before - last_attempt.len()
    }
}

/// Releases its key from the tracker when dropped.
#[must_use = "dropping the guard immediately releases the key"]
pub struct InFlightGuard {
    tracker: Arc<InFlightTracker>,
    key: String,
}

impl InFlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.tracker.release(&self.key);
    }
}
