//! # Delayed Requeue
//!
//! Timers that push a key back onto the queue after a delay. Only the most
//! recently scheduled timer for a key fires; older ones are superseded.

use crate::controller::priority::{Priority, PriorityQueue};
use crate::crd::WorkKey;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::trace;

pub struct DelayedRequeue {
    queue: Arc<dyn PriorityQueue>,
    pending: Mutex<HashMap<WorkKey, u64>>,
    next_token: AtomicU64,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for DelayedRequeue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayedRequeue")
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl DelayedRequeue {
    #[must_use]
    pub fn new(queue: Arc<dyn PriorityQueue>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            queue,
            pending: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(0),
            shutdown,
        })
    }

    /// Push `key` at `priority` once `after` has elapsed
    pub fn schedule(self: &Arc<Self>, key: WorkKey, priority: Priority, after: Duration) {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), token);

        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = this.shutdown.cancelled() => {}
                () = tokio::time::sleep(after) => {
                    if this.take_if_current(&key, token) {
                        trace!(work = %key, "Requeue timer fired");
                        this.queue.push(key, priority);
                    }
                }
            }
        });
    }

    /// Drop any pending timer for `key`
    pub fn cancel(&self, key: &WorkKey) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Number of keys with a pending timer
    pub fn pending(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn take_if_current(&self, key: &WorkKey, token: u64) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.get(key) == Some(&token) {
            pending.remove(key);
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::priority::KeyedPriorityQueue;

    #[tokio::test(start_paused = true)]
    async fn test_only_latest_timer_fires() {
        let queue = Arc::new(KeyedPriorityQueue::new());
        let requeue = DelayedRequeue::new(
            Arc::clone(&queue) as Arc<dyn PriorityQueue>,
            CancellationToken::new(),
        );
        let key = WorkKey::new("fleet-member-a", "w");

        requeue.schedule(key.clone(), Priority::Default, Duration::from_secs(5));
        requeue.schedule(key.clone(), Priority::Default, Duration::from_secs(60));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.is_empty());
        assert_eq!(requeue.pending(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(queue.len(), 1);
        assert_eq!(requeue.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_does_not_fire() {
        let queue = Arc::new(KeyedPriorityQueue::new());
        let requeue = DelayedRequeue::new(
            Arc::clone(&queue) as Arc<dyn PriorityQueue>,
            CancellationToken::new(),
        );
        let key = WorkKey::new("fleet-member-a", "w");

        requeue.schedule(key.clone(), Priority::Default, Duration::from_secs(5));
        requeue.cancel(&key);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(queue.is_empty());
    }
}
