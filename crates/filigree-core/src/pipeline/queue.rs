//! Blocking multi-producer multi-consumer work queue.
//!
//! Stages of the threaded topologies are connected by `WorkQueue`s. A consumer
//! loops on [`WorkQueue::pop`] until it receives `None`, which happens when it
//! dequeues an end-of-stream marker or when the queue has been closed and
//! drained. The queue is unbounded; producers never block.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

enum Entry<T> {
    Item(T),
    EndOfStream,
}

struct State<T> {
    entries: VecDeque<Entry<T>>,
    closed: bool,
}

/// Unbounded blocking FIFO with end-of-stream markers.
pub struct WorkQueue<T> {
    state: Mutex<State<T>>,
    ready: Condvar,
}

impl<T> Default for WorkQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WorkQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                entries: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    // A worker that panicked while holding the lock cannot leave the deque in a
    // torn state, so the poison flag is ignored.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue an item. Never blocks on capacity.
    pub fn push(&self, item: T) {
        self.lock().entries.push_back(Entry::Item(item));
        self.ready.notify_one();
    }

    /// Enqueue one end-of-stream marker; the consumer that pops it stops.
    pub fn push_end_of_stream(&self) {
        self.lock().entries.push_back(Entry::EndOfStream);
        self.ready.notify_one();
    }

    /// Enqueue one end-of-stream marker per consumer.
    pub fn push_end_of_stream_n(&self, consumers: usize) {
        {
            let mut state = self.lock();
            state
                .entries
                .extend((0..consumers).map(|_| Entry::EndOfStream));
        }
        self.ready.notify_all();
    }

    /// Broadcast close: items already queued are still delivered, then every
    /// consumer receives `None`.
    pub fn close(&self) {
        self.lock().closed = true;
        self.ready.notify_all();
    }

    /// Close the queue and discard everything still pending.
    ///
    /// The discarded items are dropped after the lock is released.
    pub fn cancel(&self) {
        let pending = {
            let mut state = self.lock();
            state.closed = true;
            std::mem::take(&mut state.entries)
        };
        self.ready.notify_all();
        drop(pending);
    }

    /// Block until an entry is available.
    ///
    /// Returns `None` on an end-of-stream marker or once the queue is closed
    /// and empty.
    pub fn pop(&self) -> Option<T> {
        let mut state = self.lock();
        loop {
            match state.entries.pop_front() {
                Some(Entry::Item(item)) => return Some(item),
                Some(Entry::EndOfStream) => return None,
                None if state.closed => return None,
                None => {
                    state = self
                        .ready
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    /// Number of queued entries, markers included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

/// Type-erased handle used to cancel queues of different item types together.
pub trait Cancellable: Sync {
    fn cancel(&self);
}

impl<T: Send> Cancellable for WorkQueue<T> {
    fn cancel(&self) {
        WorkQueue::cancel(self)
    }
}
