//! Unbounded FIFO work queue shared by all dispatcher workers.
//!
//! Producers (the request layer and the scanner) call [`TaskQueue::enqueue`],
//! which never blocks. Consumers call [`TaskQueue::dequeue`], which suspends
//! until a task arrives or the queue is closed. The receiver sits behind an
//! async mutex so each task is handed to exactly one worker.
//!
//! No deduplication happens here. Duplicate tasks are filtered by the
//! in-flight tracker when they are dequeued.

use crate::model::Task;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, mpsc};

pub struct TaskQueue {
    // `None` once closed; dropping the only sender ends the stream.
    tx: parking_lot::Mutex<Option<mpsc::UnboundedSender<Task>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Task>>,
    len: AtomicUsize,
}

impl TaskQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: parking_lot::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
            len: AtomicUsize::new(0),
        }
    }

    /// Appends a task. Returns `false` only once the queue has been closed.
    pub fn enqueue(&self, key: impl Into<String>, retry: bool) -> bool {
        self.push(Task {
            key: key.into(),
            retry,
        })
    }

    pub fn push(&self, task: Task) -> bool {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            tracing::debug!(key = %task.key, "Dropping task, queue is closed");
            return false;
        };
        // Count first so a racing dequeue never observes an underflow.
        self.len.fetch_add(1, Ordering::AcqRel);
        if tx.send(task).is_err() {
            self.len.fetch_sub(1, Ordering::AcqRel);
            return false;
        }
        true
    }

    /// Waits for the next task in FIFO order.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn dequeue(&self) -> Option<Task> {
        let task = self.rx.lock().await.recv().await?;
        self.len.fetch_sub(1, Ordering::AcqRel);
        Some(task)
    }

    /// Stops accepting new tasks. Already queued tasks can still be dequeued,
    /// after which [`dequeue`](Self::dequeue) yields `None`.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}
