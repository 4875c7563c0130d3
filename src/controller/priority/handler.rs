//! # Priority Event Handler
//!
//! Create, delete and externally triggered events are always high priority.
//! Updates are ranked by [`determine_update_event_priority`]; updates that
//! only touched the status are dropped.

use crate::controller::priority::{determine_update_event_priority, Priority, PriorityQueue};
use crate::crd::Work;
use crate::observability::metrics;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Lifecycle notification for a Work
#[derive(Debug, Clone)]
pub enum WorkEvent {
    Created(Work),
    Updated { old: Box<Work>, new: Box<Work> },
    Deleted(Work),
    /// Re-evaluation requested from outside the watch (e.g. resync after a relist)
    Generic(Work),
}

impl WorkEvent {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkEvent::Created(_) => "create",
            WorkEvent::Updated { .. } => "update",
            WorkEvent::Deleted(_) => "delete",
            WorkEvent::Generic(_) => "generic",
        }
    }
}

pub struct PriorityEventHandler {
    queue: Arc<dyn PriorityQueue>,
    fresh_threshold: Duration,
}

impl std::fmt::Debug for PriorityEventHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriorityEventHandler")
            .field("queued", &self.queue.len())
            .field("fresh_threshold", &self.fresh_threshold)
            .finish()
    }
}

impl PriorityEventHandler {
    #[must_use]
    pub fn new(queue: Arc<dyn PriorityQueue>, fresh_threshold: Duration) -> Self {
        Self {
            queue,
            fresh_threshold,
        }
    }

    /// Rank an event and enqueue its key; returns the priority used, if any
    pub fn handle(&self, event: &WorkEvent) -> Option<Priority> {
        let (work, priority) = match event {
            WorkEvent::Created(work) | WorkEvent::Deleted(work) | WorkEvent::Generic(work) => {
                (work, Priority::High)
            }
            WorkEvent::Updated { old, new } => {
                if is_status_only_update(old, new) {
                    trace!(work = %new.key(), "Ignoring status-only update");
                    return None;
                }
                (
                    new.as_ref(),
                    determine_update_event_priority(new, Utc::now(), self.fresh_threshold),
                )
            }
        };

        let key = work.key();
        debug!(work = %key, event = event.as_str(), priority = priority.as_str(), "Enqueueing Work");
        metrics::increment_events_enqueued(event.as_str(), priority.as_str());
        self.queue.push(key, priority);
        Some(priority)
    }
}

/// Old and new agree on every field reconciliation depends on
///
/// Status writes by the agent itself land here.
fn is_status_only_update(old: &Work, new: &Work) -> bool {
    let (o, n) = (&old.metadata, &new.metadata);
    o.generation == n.generation
        && o.labels == n.labels
        && o.annotations == n.annotations
        && o.finalizers == n.finalizers
        && o.deletion_timestamp == n.deletion_timestamp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::priority::KeyedPriorityQueue;
    use crate::crd::WorkSpec;

    fn work(generation: i64) -> Work {
        let mut work = Work::new("w", WorkSpec::default());
        work.metadata.namespace = Some("fleet-member-a".to_string());
        work.metadata.generation = Some(generation);
        work
    }

    #[test]
    fn test_status_only_update_is_dropped() {
        let queue = Arc::new(KeyedPriorityQueue::new());
        let handler = PriorityEventHandler::new(
            Arc::clone(&queue) as Arc<dyn PriorityQueue>,
            Duration::from_secs(300),
        );
        let event = WorkEvent::Updated {
            old: Box::new(work(1)),
            new: Box::new(work(1)),
        };
        assert_eq!(handler.handle(&event), None);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_create_delete_generic_are_high() {
        let queue = Arc::new(KeyedPriorityQueue::new());
        let handler = PriorityEventHandler::new(
            Arc::clone(&queue) as Arc<dyn PriorityQueue>,
            Duration::from_secs(300),
        );
        for event in [
            WorkEvent::Created(work(1)),
            WorkEvent::Deleted(work(1)),
            WorkEvent::Generic(work(1)),
        ] {
            assert_eq!(handler.handle(&event), Some(Priority::High));
        }
        assert_eq!(queue.len(), 1);
    }
}
