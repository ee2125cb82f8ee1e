//! Blocking priority queue shared by dispatcher threads

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};

use crate::app::request::Priority;
use crate::app::sync::{lock, wait};

struct Queued<T> {
    priority: Priority,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for Queued<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for Queued<T> {}

impl<T> PartialOrd for Queued<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for Queued<T> {
    // Max-heap: higher priority first, then lower sequence first
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct HeapState<T> {
    heap: BinaryHeap<Queued<T>>,
    closed: bool,
}

/// Multi-producer, multi-consumer queue ordered by priority then sequence
///
/// Consumers block in [`pop`](Self::pop) until an item arrives or the queue
/// is closed. Closing wakes every consumer; items still queued stay available
/// through [`drain`](Self::drain).
pub struct PriorityQueue<T> {
    state: Mutex<HeapState<T>>,
    available: Condvar,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeapState {
                heap: BinaryHeap::new(),
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Enqueue an item; hands it back if the queue is closed
    pub fn push(&self, item: T, priority: Priority, sequence: u64) -> Result<(), T> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(item);
        }
        state.heap.push(Queued {
            priority,
            sequence,
            item,
        });
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Block until an item is available; `None` once the queue is closed
    pub fn pop(&self) -> Option<T> {
        let mut state = lock(&self.state);
        loop {
            if state.closed {
                return None;
            }
            if let Some(queued) = state.heap.pop() {
                return Some(queued.item);
            }
            state = wait(&self.available, state);
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        let mut state = lock(&self.state);
        if state.closed {
            return None;
        }
        state.heap.pop().map(|queued| queued.item)
    }

    /// Stop handing out items and wake every blocked consumer
    pub fn close(&self) {
        lock(&self.state).closed = true;
        self.available.notify_all();
    }

    pub fn reopen(&self) {
        lock(&self.state).closed = false;
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// Remove every queued item in dispatch order
    pub fn drain(&self) -> Vec<T> {
        let mut state = lock(&self.state);
        let mut items = Vec::with_capacity(state.heap.len());
        while let Some(queued) = state.heap.pop() {
            items.push(queued.item);
        }
        items
    }

    pub fn len(&self) -> usize {
        lock(&self.state).heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for PriorityQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("PriorityQueue")
            .field("len", &state.heap.len())
            .field("closed", &state.closed)
            .finish()
    }
}
