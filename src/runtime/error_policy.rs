//! # Error Policy
//!
//! Error handling and backoff for failed reconciliations and watch errors.
//! Backoff state is tracked per Work so one failing Work does not slow down
//! the others.

use crate::constants::{ERROR_BACKOFF_MAX_SECS, ERROR_BACKOFF_MIN_SECS};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::reconciler::ReconcilerError;
use crate::crd::WorkKey;
use crate::observability;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone)]
struct BackoffState {
    backoff: FibonacciBackoff,
    error_count: u32,
}

#[derive(Debug, Default)]
pub struct ErrorPolicy {
    states: Mutex<HashMap<WorkKey, BackoffState>>,
}

impl ErrorPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed pass for `key` and return the retry delay
    pub fn on_error(&self, key: &WorkKey, err: &ReconcilerError) -> Duration {
        let error_span = tracing::span!(
            tracing::Level::ERROR,
            "controller.worker.reconciliation_error",
            work.namespace = key.namespace.as_str(),
            work.name = key.name.as_str(),
            error = %err
        );
        let _error_guard = error_span.enter();

        error!("Reconciliation error for {}: {}", key, err);
        observability::metrics::increment_reconciliation_errors();

        let (backoff_seconds, error_count) = {
            let mut states = self.states.lock().unwrap_or_else(PoisonError::into_inner);
            let state = states.entry(key.clone()).or_insert_with(|| BackoffState {
                backoff: FibonacciBackoff::new(ERROR_BACKOFF_MIN_SECS, ERROR_BACKOFF_MAX_SECS),
                error_count: 0,
            });
            state.error_count = state.error_count.saturating_add(1);
            (state.backoff.next_backoff_seconds(), state.error_count)
        };

        info!(
            "🔄 Retrying {} with Fibonacci backoff: {}s (error count: {})",
            key, backoff_seconds, error_count
        );
        Duration::from_secs(backoff_seconds)
    }

    /// Forget the error history of `key` after a successful pass
    pub fn on_success(&self, key: &WorkKey) {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    #[must_use]
    pub fn error_count(&self, key: &WorkKey) -> u32 {
        self.states
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |s| s.error_count)
    }
}

/// Log a Work watch error
///
/// The watcher re-lists on its own after an error, so errors are reported
/// and the stream keeps going.
pub fn handle_watch_stream_error(err: &kube_runtime::watcher::Error) {
    let error_string = err.to_string();
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    let is_410 = error_string.contains("410") || error_string.contains("too old resource version");
    let is_forbidden = error_string.contains("403") || error_string.contains("Forbidden");
    if is_410 {
        info!("Work watch resource version expired, re-listing");
    } else if is_forbidden {
        error!("Work watch forbidden; check the agent's hub RBAC: {}", error_string);
    } else {
        // Includes objects that fail to decode as a Work
        warn!("Work watch error, ignoring: {}", error_string);
    }
}
