//! # Priority Queue
//!
//! Keys are served highest priority first and in arrival order within a
//! priority. A key is queued at most once; pushing it again at a higher
//! priority raises it. A key handed to a worker is not handed out again
//! until the worker calls `done`, and pushes that arrive meanwhile are
//! replayed then.

use crate::crd::WorkKey;
use crate::controller::priority::Priority;
use async_trait::async_trait;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;

/// Queue capability the engine depends on
#[async_trait]
pub trait PriorityQueue: Send + Sync {
    /// Insert a key, or raise its priority if already queued
    fn push(&self, key: WorkKey, priority: Priority);

    /// Wait for the next key; `None` once the queue is shut down
    async fn pop(&self) -> Option<WorkKey>;

    /// Mark a popped key as finished
    fn done(&self, key: &WorkKey);

    /// Number of queued keys (excluding keys being processed)
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued keys per priority
    fn depth_by_priority(&self) -> Vec<(Priority, usize)>;

    /// Stop handing out keys and wake every waiting worker
    fn shut_down(&self);
}

impl std::fmt::Debug for dyn PriorityQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityQueue")
            .field("len", &self.len())
            .finish()
    }
}

#[derive(Debug, PartialEq, Eq)]
struct HeapEntry {
    priority: Priority,
    sequence: u64,
    key: WorkKey,
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    /// May hold stale entries; `queued` says which one is live
    heap: BinaryHeap<HeapEntry>,
    queued: HashMap<WorkKey, (Priority, u64)>,
    processing: HashSet<WorkKey>,
    /// Pushed while processing; re-queued on `done`
    dirty: HashMap<WorkKey, Priority>,
    next_sequence: u64,
    shutting_down: bool,
}

impl QueueState {
    fn enqueue(&mut self, key: WorkKey, priority: Priority) -> bool {
        if self.processing.contains(&key) {
            let entry = self.dirty.entry(key).or_insert(priority);
            *entry = (*entry).max(priority);
            return false;
        }
        if let Some((current, _)) = self.queued.get(&key) {
            if *current >= priority {
                return false;
            }
        }
        self.next_sequence += 1;
        let sequence = self.next_sequence;
        self.queued.insert(key.clone(), (priority, sequence));
        self.heap.push(HeapEntry {
            priority,
            sequence,
            key,
        });
        true
    }

    fn dequeue(&mut self) -> Option<WorkKey> {
        while let Some(entry) = self.heap.pop() {
            if self.queued.get(&entry.key) == Some(&(entry.priority, entry.sequence)) {
                self.queued.remove(&entry.key);
                self.processing.insert(entry.key.clone());
                return Some(entry.key);
            }
        }
        None
    }
}

/// Binary-heap queue indexed by key
#[derive(Debug, Default)]
pub struct KeyedPriorityQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl KeyedPriorityQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PriorityQueue for KeyedPriorityQueue {
    fn push(&self, key: WorkKey, priority: Priority) {
        let mut state = self.state();
        if state.shutting_down {
            return;
        }
        if state.enqueue(key, priority) {
            drop(state);
            self.notify.notify_one();
        }
    }

    async fn pop(&self) -> Option<WorkKey> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.state();
                if state.shutting_down {
                    return None;
                }
                if let Some(key) = state.dequeue() {
                    let more = !state.queued.is_empty();
                    drop(state);
                    if more {
                        self.notify.notify_one();
                    }
                    return Some(key);
                }
            }
            notified.await;
        }
    }

    fn done(&self, key: &WorkKey) {
        let mut state = self.state();
        state.processing.remove(key);
        if let Some(priority) = state.dirty.remove(key) {
            if !state.shutting_down && state.enqueue(key.clone(), priority) {
                drop(state);
                self.notify.notify_one();
            }
        }
    }

    fn len(&self) -> usize {
        self.state().queued.len()
    }

    fn depth_by_priority(&self) -> Vec<(Priority, usize)> {
        let state = self.state();
        [Priority::High, Priority::Medium, Priority::Default]
            .into_iter()
            .map(|p| (p, state.queued.values().filter(|(q, _)| *q == p).count()))
            .collect()
    }

    fn shut_down(&self) {
        self.state().shutting_down = true;
        self.notify.notify_waiters();
    }
}
