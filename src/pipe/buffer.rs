use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Bounded queue that evicts its oldest item instead of refusing a new one.
///
/// Only the pipe's forwarding worker pushes; only the single consumer pops.
#[derive(Debug)]
pub(super) struct CoalescingBuffer<T> {
    state: Mutex<State<T>>,
    capacity: usize,
    notify: Notify,
}

#[derive(Debug)]
struct State<T> {
    queue: VecDeque<T>,
    closed: bool,
}

pub(super) enum Pop<T> {
    Item(T),
    Empty,
    Closed,
}

impl<T> CoalescingBuffer<T> {
    pub(super) fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueues `item`, first discarding the oldest queued item if full.
    /// Returns the discarded item.
    pub(super) fn push_evicting(&self, item: T) -> Option<T> {
        let evicted = {
            let mut state = self.lock();
            let evicted = if state.queue.len() >= self.capacity {
                state.queue.pop_front()
            } else {
                None
            };
            state.queue.push_back(item);
            evicted
        };
        self.notify.notify_one();
        evicted
    }

    /// Marks the buffer closed. Queued items stay readable.
    pub(super) fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_one();
    }

    pub(super) fn try_pop(&self) -> Pop<T> {
        let mut state = self.lock();
        match state.queue.pop_front() {
            Some(item) => Pop::Item(item),
            None if state.closed => Pop::Closed,
            None => Pop::Empty,
        }
    }

    /// Waits until a push or close happens after the last `try_pop`.
    ///
    /// A notification sent while nobody waits is kept, so a push racing with
    /// the preceding `try_pop` is not missed.
    pub(super) async fn wait(&self) {
        self.notify.notified().await;
    }

    pub(super) fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub(super) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
