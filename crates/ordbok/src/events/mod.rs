//! In-process publish/subscribe fanout for generation results.
//!
//! Every [`Subscription`] owns its own unbounded channel, so a subscriber sees
//! events in the order they were published and a slow subscriber never holds
//! up the others. [`EventBus::publish`] snapshots the subscriber set, sends
//! outside the lock and then evicts every subscriber whose receiver is gone.
//! A subscriber only sees events published after it joined; nothing is
//! persisted or replayed.

use core::pin::Pin;
use core::task::{Context, Poll};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio_stream::Stream;

use crate::telemetry::record_active_subscribers;

#[cfg(test)]
mod tests;

/// Notification emitted after a dispatcher pass finishes.
///
/// Serializes to `{"kind":"ready","key":..,"word":..}` or
/// `{"kind":"error","key":..,"error":..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    /// A new entry was appended and persisted.
    Ready { key: String, word: String },
    /// Generation or persistence failed; the item was not changed.
    Error { key: String, error: String },
}

impl Event {
    pub fn ready(key: impl Into<String>, word: impl Into<String>) -> Self {
        Self::Ready {
            key: key.into(),
            word: word.into(),
        }
    }

    pub fn error(key: impl Into<String>, error: impl ToString) -> Self {
        Self::Error {
            key: key.into(),
            error: error.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Ready { key, .. } | Self::Error { key, .. } => key,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Ready { .. } => "ready",
            Self::Error { .. } => "error",
        }
    }
}

/// Handle identifying one subscriber on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

type Subscribers = RwLock<HashMap<SubscriberId, mpsc::UnboundedSender<Event>>>;

/// Removes `id` and updates the gauge. Returns `false` if it was already gone.
fn remove_subscriber(subscribers: &Subscribers, id: SubscriberId) -> bool {
    let (removed, count) = {
        let mut subscribers = subscribers.write();
        let removed = subscribers.remove(&id).is_some();
        (removed, subscribers.len())
    };
    if removed {
        tracing::debug!(subscriber = id.0, count, "Subscriber disconnected");
        record_active_subscribers(count);
    }
    removed
}

/// The receiving end of one subscriber.
///
/// Dropping the subscription (or the stream made from it) unregisters it from
/// the bus. [`close`](Self::close) only stops delivery; the next publish then
/// evicts it.
#[derive(Debug)]
pub struct Subscription {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<Event>,
    bus: Weak<Subscribers>,
}

impl Subscription {
    pub const fn id(&self) -> SubscriberId {
        self.id
    }

    /// Waits for the next event. Returns `None` once the bus has dropped this
    /// subscriber (unsubscribe or shutdown).
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Closes the receiving side without unregistering.
    pub fn close(&mut self) {
        self.rx.close();
    }

    pub fn into_stream(self) -> SubscriptionStream {
        SubscriptionStream { inner: self }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(subscribers) = self.bus.upgrade() {
            remove_subscriber(&subscribers, self.id);
        }
    }
}

/// [`Stream`] of events for one subscriber; unregisters on drop.
#[derive(Debug)]
pub struct SubscriptionStream {
    inner: Subscription,
}

impl SubscriptionStream {
    pub const fn id(&self) -> SubscriberId {
        self.inner.id
    }
}

impl Stream for SubscriptionStream {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.inner.rx.poll_recv(cx)
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    next_id: AtomicU64,
    subscribers: Arc<Subscribers>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::unbounded_channel();
        let count = {
            let mut subscribers = self.subscribers.write();
            subscribers.insert(id, tx);
            subscribers.len()
        };
        tracing::debug!(subscriber = id.0, count, "Subscriber connected");
        record_active_subscribers(count);
        Subscription {
            id,
            rx,
            bus: Arc::downgrade(&self.subscribers),
        }
    }

    /// Removes a subscriber. Its receiver observes end-of-stream once drained.
    /// Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        remove_subscriber(&self.subscribers, id)
    }

    /// Delivers `event` to every current subscriber, best effort.
    ///
    /// Subscribers whose receiving side is closed are evicted. Returns the
    /// number of subscribers that received the event.
    pub fn publish(&self, event: Event) -> usize {
        let snapshot: Vec<_> = self
            .subscribers
            .read()
            .iter()
            .map(|(id, tx)| (*id, tx.clone()))
            .collect();

        let mut delivered = 0;
        let mut dead = Vec::new();
        for (id, tx) in snapshot {
            if tx.send(event.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let count = {
                let mut subscribers = self.subscribers.write();
                for id in &dead {
                    subscribers.remove(id);
                }
                subscribers.len()
            };
            tracing::debug!(evicted = dead.len(), count, "Evicted closed subscribers");
            record_active_subscribers(count);
        }

        tracing::trace!(kind = event.kind(), key = event.key(), delivered, "Published event");
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Drops every subscriber so their streams end. Used at shutdown.
    pub fn close_all(&self) {
        let closed = {
            let mut subscribers = self.subscribers.write();
            let closed = subscribers.len();
            subscribers.clear();
            closed
        };
        tracing::debug!(closed, "Closed all subscribers");
        record_active_subscribers(0);
    }
}
