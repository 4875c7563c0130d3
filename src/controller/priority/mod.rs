//! # Priority Scheduling
//!
//! Work events are ranked before they enter the reconciliation queue so
//! fresh or regressed Work is processed ahead of steady-state Work.
//!
//! - `queue.rs` - the injected [`PriorityQueue`] capability and its keyed binary-heap implementation
//! - `handler.rs` - the event handler translating Work lifecycle events into prioritized keys

mod handler;
mod queue;

pub use handler::{PriorityEventHandler, WorkEvent};
pub use queue::{KeyedPriorityQueue, PriorityQueue};

use crate::crd::{
    is_condition_true, ApplyStrategyType, Work, WORK_CONDITION_APPLIED, WORK_CONDITION_AVAILABLE,
    WORK_CONDITION_DIFF_REPORTED,
};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Queue priority; `High` dequeues first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Default,
    Medium,
    High,
}

impl Priority {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Default => "default",
        }
    }
}

/// Priority of an update event for `work`
///
/// Pure function of the Work's age at `now`, its apply mode and its
/// conditions for the current generation.
#[must_use]
pub fn determine_update_event_priority(
    work: &Work,
    now: DateTime<Utc>,
    fresh_threshold: Duration,
) -> Priority {
    let Some(created) = creation_time(work) else {
        return Priority::High;
    };
    let age = now.signed_duration_since(created).to_std().unwrap_or_default();
    if age < fresh_threshold {
        return Priority::High;
    }

    let generation = work.metadata.generation;
    let conditions = work.conditions();
    let settled = match work.apply_strategy().r#type {
        ApplyStrategyType::ReportDiff => {
            is_condition_true(conditions, WORK_CONDITION_DIFF_REPORTED, generation)
        }
        ApplyStrategyType::ClientSideApply | ApplyStrategyType::ServerSideApply => {
            is_condition_true(conditions, WORK_CONDITION_APPLIED, generation)
                && is_condition_true(conditions, WORK_CONDITION_AVAILABLE, generation)
        }
    };
    if settled {
        Priority::Medium
    } else {
        Priority::High
    }
}

/// Creation timestamp of `work`, read through its RFC3339 wire form
#[must_use]
pub fn creation_time(work: &Work) -> Option<DateTime<Utc>> {
    let timestamp = work.metadata.creation_timestamp.as_ref()?;
    let raw = serde_json::to_value(timestamp).ok()?;
    DateTime::parse_from_rfc3339(raw.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
