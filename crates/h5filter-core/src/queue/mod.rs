use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use crate::telemetry::{self, tags};

/// Entry handed through a [`WorkQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkItem<T> {
    Item(T),
    /// Producer is done. Closes the queue for every consumer.
    EndOfStream,
}

/// Outcome of [`WorkQueue::enqueue`].
#[derive(Debug, PartialEq, Eq)]
pub enum EnqueueStatus<T> {
    Queued,
    /// The end-of-stream marker was accepted and the queue is now closed.
    Closed,
    /// The queue was already closed; the item is handed back.
    Rejected(T),
}

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
    elmts_added: u64,
}

/// Unbounded multi-producer multi-consumer FIFO with blocking consumption.
///
/// Closing is sticky: once [`WorkItem::EndOfStream`] has been enqueued, every
/// consumer drains the remaining items and then observes `EndOfStream` on
/// each further call.
pub struct WorkQueue<T> {
    state: Mutex<QueueState<T>>,
    available: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                closed: false,
                elmts_added: 0,
            }),
            available: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<T>> {
        self.state.lock().expect("work queue mutex poisoned")
    }

    /// Appends an item or closes the queue. Never blocks on consumers.
    pub fn enqueue(&self, item: WorkItem<T>) -> EnqueueStatus<T> {
        let mut state = self.lock();
        match item {
            WorkItem::EndOfStream => {
                state.closed = true;
                let remaining = state.items.len();
                drop(state);
                self.available.notify_all();

                telemetry::increment_counter(
                    tags::METRIC_QUEUE_CLOSE_COUNT,
                    1,
                    &[("subsystem", "queue"), ("op", "close")],
                );
                tracing::debug!(
                    target: tags::TARGET_QUEUE,
                    op = "close",
                    remaining,
                    "work queue closed"
                );
                EnqueueStatus::Closed
            }
            WorkItem::Item(item) if state.closed => EnqueueStatus::Rejected(item),
            WorkItem::Item(item) => {
                state.items.push_back(item);
                state.elmts_added += 1;
                let depth = state.items.len();
                drop(state);
                self.available.notify_one();

                telemetry::increment_counter(
                    tags::METRIC_QUEUE_ENQUEUE_COUNT,
                    1,
                    &[("subsystem", "queue"), ("op", "enqueue")],
                );
                telemetry::set_gauge(
                    tags::METRIC_QUEUE_DEPTH,
                    depth as u64,
                    &[("subsystem", "queue"), ("op", "enqueue")],
                );
                EnqueueStatus::Queued
            }
        }
    }

    /// Convenience for `enqueue(WorkItem::Item(item))`.
    pub fn push(&self, item: T) -> EnqueueStatus<T> {
        self.enqueue(WorkItem::Item(item))
    }

    /// Convenience for `enqueue(WorkItem::EndOfStream)`.
    pub fn close(&self) {
        self.enqueue(WorkItem::EndOfStream);
    }

    /// Removes the head item, waiting while the queue is empty and open.
    pub fn dequeue(&self) -> WorkItem<T> {
        let mut state = self.lock();
        while state.items.is_empty() && !state.closed {
            state = self
                .available
                .wait(state)
                .expect("work queue mutex poisoned");
        }

        match state.items.pop_front() {
            Some(item) => WorkItem::Item(item),
            None => WorkItem::EndOfStream,
        }
    }

    /// Non-blocking variant of [`WorkQueue::dequeue`].
    ///
    /// Returns `None` when the queue is empty but still open.
    pub fn try_dequeue(&self) -> Option<WorkItem<T>> {
        let mut state = self.lock();
        match state.items.pop_front() {
            Some(item) => Some(WorkItem::Item(item)),
            None if state.closed => Some(WorkItem::EndOfStream),
            None => None,
        }
    }

    /// Total number of items ever enqueued.
    pub fn lifetime_count(&self) -> u64 {
        self.lock().elmts_added
    }

    /// Items currently waiting.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
