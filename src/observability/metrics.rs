//! # Metrics
//!
//! Prometheus metrics for monitoring the work applier.
//!
//! ## Metrics Exposed
//!
//! - `work_applier_reconciliations_total` - Total number of Work reconciliations
//! - `work_applier_reconciliation_errors_total` - Reconciliations that ended in an error
//! - `work_applier_reconciliation_duration_seconds` - Duration of reconciliations
//! - `work_applier_manifests_processed_total` - Manifests processed, by apply result
//! - `work_applier_requeue_delay_seconds` - Requeue delays chosen by the rate limiter
//! - `work_applier_events_enqueued_total` - Work events enqueued, by event and priority
//! - `work_applier_queue_depth` - Queued Work keys, by priority
//! - `work_applier_namespace_association_writes_total` - Member status writes for namespace associations

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGaugeVec, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "work_applier_reconciliations_total",
        "Total number of Work reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "work_applier_reconciliation_errors_total",
        "Total number of Work reconciliations that ended in an error",
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "work_applier_reconciliation_duration_seconds",
            "Duration of Work reconciliation in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static MANIFESTS_PROCESSED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "work_applier_manifests_processed_total",
            "Total number of manifests processed by apply result",
        ),
        &["result"],
    )
    .expect("Failed to create MANIFESTS_PROCESSED_TOTAL metric - this should never happen")
});

static REQUEUE_DELAY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "work_applier_requeue_delay_seconds",
            "Requeue delay chosen after a reconciliation in seconds",
        )
        .buckets(vec![5.0, 10.0, 30.0, 60.0, 120.0, 300.0, 900.0, 3600.0]),
    )
    .expect("Failed to create REQUEUE_DELAY metric - this should never happen")
});

static EVENTS_ENQUEUED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "work_applier_events_enqueued_total",
            "Total number of Work events enqueued by event type and priority",
        ),
        &["event", "priority"],
    )
    .expect("Failed to create EVENTS_ENQUEUED_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGaugeVec> = LazyLock::new(|| {
    IntGaugeVec::new(
        prometheus::Opts::new("work_applier_queue_depth", "Queued Work keys by priority"),
        &["priority"],
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

static ASSOCIATION_WRITES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "work_applier_namespace_association_writes_total",
        "Total number of member status writes for namespace associations",
    )
    .expect("Failed to create ASSOCIATION_WRITES_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
/// Register every metric with the shared registry; fails if called twice
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(MANIFESTS_PROCESSED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUE_DELAY.clone()))?;
    REGISTRY.register(Box::new(EVENTS_ENQUEUED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;
    REGISTRY.register(Box::new(ASSOCIATION_WRITES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors() {
    RECONCILIATION_ERRORS_TOTAL.inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_manifests_processed(result: &str) {
    MANIFESTS_PROCESSED_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_requeue_delay(seconds: f64) {
    REQUEUE_DELAY.observe(seconds);
}

pub fn increment_events_enqueued(event: &str, priority: &str) {
    EVENTS_ENQUEUED_TOTAL
        .with_label_values(&[event, priority])
        .inc();
}

pub fn set_queue_depth(priority: &str, depth: usize) {
    QUEUE_DEPTH
        .with_label_values(&[priority])
        .set(i64::try_from(depth).unwrap_or(i64::MAX));
}

pub fn increment_association_writes() {
    ASSOCIATION_WRITES_TOTAL.inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        assert_eq!(RECONCILIATIONS_TOTAL.get(), before + 1);
    }

    #[test]
    fn test_manifests_processed_by_result() {
        let before = MANIFESTS_PROCESSED_TOTAL
            .with_label_values(&["Applied"])
            .get();
        increment_manifests_processed("Applied");
        increment_manifests_processed("Applied");
        let after = MANIFESTS_PROCESSED_TOTAL
            .with_label_values(&["Applied"])
            .get();
        assert_eq!(after, before + 2);
    }

    #[test]
    fn test_set_queue_depth() {
        set_queue_depth("high", 7);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["high"]).get(), 7);
        set_queue_depth("high", 0);
        assert_eq!(QUEUE_DEPTH.with_label_values(&["high"]).get(), 0);
    }

    #[test]
    fn test_observe_durations() {
        observe_reconciliation_duration(0.25);
        observe_requeue_delay(10.0);
    }
}
