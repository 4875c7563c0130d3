//! # Requeue Rate Limiter
//!
//! Decides how long to wait before a Work is reconciled again.
//!
//! Each Work key moves through three states:
//!
//! - **Fresh**: untracked; the first call resets and starts counting.
//! - **Fast**: requeue count ≤ `max_fast_attempts`; the fixed fast delay is returned.
//! - **Exponential**: `fast_delay × base^(count − max_fast_attempts)`, capped at `max_delay`.
//!
//! The count is reset whenever the Work's generation or the fingerprint of the
//! pass's outcome tuples changes, so new information is acted on quickly
//! while a stuck Work backs off.
//!
//! ```rust
//! use fleet_work_applier::controller::ratelimiter::BackoffRateLimiter;
//! use std::time::Duration;
//!
//! let limiter = BackoffRateLimiter::new(0, Duration::from_secs(5), 2.0, Duration::from_secs(60));
//! assert_eq!(limiter.delay_for_attempt(1), Duration::from_secs(10));
//! assert_eq!(limiter.delay_for_attempt(4), Duration::from_secs(60));
//! ```

use crate::config::ControllerConfig;
use crate::constants::{MAX_REQUEUE_DELAY_SECS, MIN_REQUEUE_DELAY_SECS};
use crate::controller::processor::ManifestProcessingBundle;
use crate::controller::processor::results::processing_fingerprint;
use crate::crd::{Work, WorkKey};
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Tracked state for one Work key
#[derive(Debug, Clone, Default)]
struct RequeueEntry {
    requeues: u32,
    generation: i64,
    fingerprint: Option<String>,
}

/// Per-Work requeue rate limiter
///
/// State is an in-memory cache keyed by Work identity; losing it on restart
/// only costs one fast requeue.
#[derive(Debug)]
pub struct BackoffRateLimiter {
    max_fast_attempts: u32,
    fast_delay: Duration,
    exponential_base: f64,
    max_delay: Duration,
    entries: Mutex<HashMap<WorkKey, RequeueEntry>>,
}

impl BackoffRateLimiter {
    /// Create a rate limiter, clamping out-of-range settings
    ///
    /// - `fast_delay` is raised to at least 5s
    /// - `max_delay` is clamped to [5s, 3600s]
    #[must_use]
    pub fn new(
        max_fast_attempts: u32,
        fast_delay: Duration,
        exponential_base: f64,
        max_delay: Duration,
    ) -> Self {
        let min = Duration::from_secs(MIN_REQUEUE_DELAY_SECS);
        let max = Duration::from_secs(MAX_REQUEUE_DELAY_SECS);

        let fast_delay = if fast_delay < min {
            warn!(
                configured_secs = fast_delay.as_secs_f64(),
                clamped_secs = min.as_secs(),
                "Fast requeue delay below minimum, clamping"
            );
            min
        } else {
            fast_delay
        };

        let max_delay = if max_delay < min || max_delay > max {
            let clamped = max_delay.clamp(min, max);
            warn!(
                configured_secs = max_delay.as_secs_f64(),
                clamped_secs = clamped.as_secs(),
                "Max requeue delay out of range, clamping"
            );
            clamped
        } else {
            max_delay
        };

        Self {
            max_fast_attempts,
            fast_delay,
            exponential_base,
            max_delay,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Build from agent configuration
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(
            config.max_fast_attempts,
            config.fast_delay(),
            config.exponential_base,
            config.max_delay(),
        )
    }

    /// Requeue delay for the pass that just produced `bundles`
    pub fn when(&self, work: &Work, bundles: &[ManifestProcessingBundle]) -> Duration {
        let key = work.key();
        let generation = work.metadata.generation.unwrap_or(0);
        let fingerprint = match processing_fingerprint(bundles.iter().map(|b| b.result_tuple())) {
            Ok(fingerprint) => Some(fingerprint),
            Err(e) => {
                warn!(
                    work = %key,
                    error = %e,
                    "Failed to fingerprint processing results, resetting requeue counter"
                );
                None
            }
        };

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let reset = match entries.get(&key) {
            None => true,
            Some(entry) => {
                entry.generation != generation
                    || fingerprint.is_none()
                    || entry.fingerprint != fingerprint
            }
        };
        let entry = entries.entry(key.clone()).or_default();
        if reset {
            entry.requeues = 0;
            entry.generation = generation;
            entry.fingerprint = fingerprint;
        }
        entry.requeues = entry.requeues.saturating_add(1);
        let requeues = entry.requeues;
        drop(entries);

        let delay = self.delay_for_attempt(requeues);
        debug!(
            work = %key,
            generation,
            requeues,
            reset,
            delay_secs = delay.as_secs_f64(),
            "Computed requeue delay"
        );
        delay
    }

    /// Delay for the `attempt`-th consecutive requeue (1-based)
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= self.max_fast_attempts {
            return self.fast_delay;
        }
        let exponent = i32::try_from(attempt - self.max_fast_attempts).unwrap_or(i32::MAX);
        let secs = self.fast_delay.as_secs_f64() * self.exponential_base.powi(exponent);
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }

    /// Drop all state for a Work
    pub fn forget(&self, key: &WorkKey) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Current requeue counter for a Work (0 when untracked)
    #[must_use]
    pub fn num_requeues(&self, key: &WorkKey) -> u32 {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .map_or(0, |entry| entry.requeues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::processor::results::{
        ApplyResultType, AvailabilityResultType, DiffReportResultType,
    };
    use crate::crd::WorkSpec;

    fn work(generation: i64) -> Work {
        let mut work = Work::new("work-1", WorkSpec::default());
        work.metadata.namespace = Some("fleet-member-a".to_string());
        work.metadata.generation = Some(generation);
        work
    }

    fn bundle(apply: ApplyResultType, availability: AvailabilityResultType) -> ManifestProcessingBundle {
        let mut bundle = ManifestProcessingBundle::new(0, serde_json::json!({}));
        bundle.apply_result = apply;
        bundle.availability_result = availability;
        bundle.report_diff_result = DiffReportResultType::Skipped;
        bundle
    }

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_zero_fast_attempts_goes_straight_to_exponential() {
        let limiter = BackoffRateLimiter::new(0, secs(5), 2.0, secs(60));
        let w = work(1);
        let bundles = vec![bundle(ApplyResultType::FailedToApply, AvailabilityResultType::Skipped)];
        let delays: Vec<Duration> = (0..5).map(|_| limiter.when(&w, &bundles)).collect();
        assert_eq!(delays, vec![secs(10), secs(20), secs(40), secs(60), secs(60)]);
        assert_eq!(limiter.num_requeues(&w.key()), 5);
    }

    #[test]
    fn test_fast_attempts_then_exponential() {
        let limiter = BackoffRateLimiter::new(2, secs(5), 2.0, secs(3600));
        let w = work(1);
        let bundles = vec![bundle(ApplyResultType::Applied, AvailabilityResultType::NotYetAvailable)];
        assert_eq!(limiter.when(&w, &bundles), secs(5));
        assert_eq!(limiter.when(&w, &bundles), secs(5));
        assert_eq!(limiter.when(&w, &bundles), secs(10));
        assert_eq!(limiter.when(&w, &bundles), secs(20));
    }

    #[test]
    fn test_generation_change_resets_counter() {
        let limiter = BackoffRateLimiter::new(0, secs(5), 2.0, secs(60));
        let bundles = vec![bundle(ApplyResultType::Applied, AvailabilityResultType::Available)];
        limiter.when(&work(1), &bundles);
        limiter.when(&work(1), &bundles);
        assert_eq!(limiter.num_requeues(&work(1).key()), 2);

        assert_eq!(limiter.when(&work(2), &bundles), secs(10));
        assert_eq!(limiter.num_requeues(&work(2).key()), 1);
    }

    #[test]
    fn test_fingerprint_change_resets_counter() {
        let limiter = BackoffRateLimiter::new(1, secs(5), 2.0, secs(60));
        let w = work(3);
        let pending = vec![bundle(ApplyResultType::Applied, AvailabilityResultType::NotYetAvailable)];
        let ready = vec![bundle(ApplyResultType::Applied, AvailabilityResultType::Available)];
        limiter.when(&w, &pending);
        limiter.when(&w, &pending);
        assert_eq!(limiter.when(&w, &pending), secs(20));
        assert_eq!(limiter.when(&w, &ready), secs(5));
    }

    #[test]
    fn test_forget_returns_to_fresh_state() {
        let limiter = BackoffRateLimiter::new(0, secs(5), 2.0, secs(60));
        let w = work(1);
        let bundles = vec![bundle(ApplyResultType::Applied, AvailabilityResultType::Available)];
        limiter.when(&w, &bundles);
        limiter.when(&w, &bundles);
        limiter.forget(&w.key());
        assert_eq!(limiter.num_requeues(&w.key()), 0);
        assert_eq!(limiter.when(&w, &bundles), secs(10));
    }

    #[test]
    fn test_out_of_range_settings_are_clamped() {
        let limiter = BackoffRateLimiter::new(1, secs(1), 2.0, secs(7200));
        assert_eq!(limiter.delay_for_attempt(1), secs(5));
        assert_eq!(limiter.delay_for_attempt(100), secs(3600));

        let limiter = BackoffRateLimiter::new(1, secs(5), 2.0, secs(1));
        assert_eq!(limiter.delay_for_attempt(30), secs(5));
    }

    #[test]
    fn test_huge_exponent_falls_back_to_max_delay() {
        let limiter = BackoffRateLimiter::new(0, secs(5), 10.0, secs(600));
        assert_eq!(limiter.delay_for_attempt(u32::MAX), secs(600));
    }

    #[test]
    fn test_delays_are_monotonic_until_capped() {
        let limiter = BackoffRateLimiter::new(3, secs(5), 1.5, secs(300));
        let w = work(7);
        let bundles = vec![bundle(ApplyResultType::FailedToApply, AvailabilityResultType::Skipped)];
        let mut previous = Duration::ZERO;
        for attempt in 1..=40u32 {
            let delay = limiter.when(&w, &bundles);
            assert!(delay >= previous, "delay decreased at attempt {attempt}");
            assert!(delay <= secs(300));
            assert_eq!(limiter.num_requeues(&w.key()), attempt);
            previous = delay;
        }
        assert_eq!(previous, secs(300));
    }
}
