//! # Fibonacci Backoff
//!
//! Progressive backoff for reconciliation errors (API failures, timeouts).
//! It grows more slowly than exponential backoff, so a Work hitting a
//! flapping API server keeps being retried without hammering it.
//!
//! Sequence with the default bounds: 1s, 1s, 2s, 3s, 5s, 8s, ... 300s (max).
//!
//! ## Usage
//!
//! ```rust
//! use fleet_work_applier::controller::backoff::FibonacciBackoff;
//!
//! let mut backoff = FibonacciBackoff::new(1, 300);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 1);
//! assert_eq!(backoff.next_backoff_seconds(), 2);
//! assert_eq!(backoff.next_backoff_seconds(), 3);
//! ```

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two, capped at `max_seconds`.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    prev_seconds: u64,
    current_seconds: u64,
    max_seconds: u64,
}

impl FibonacciBackoff {
    /// Create a backoff with the given bounds in seconds
    ///
    /// # Arguments
    ///
    /// * `min_seconds` - first two values of the sequence
    /// * `max_seconds` - cap
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Next backoff in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;
        let next = self.prev_seconds.saturating_add(self.current_seconds);
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);
        result
    }
}
