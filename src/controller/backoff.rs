//! # Fibonacci Backoff
//!
//! Requeue delays for failed reconciliations. The sequence grows more slowly
//! than exponential backoff, which suits a backend that is briefly unreachable
//! as well as one waiting on an operator fix.
//!
//! Delays are counted in minutes and capped: with bounds `1..=10` the sequence
//! is 1m, 1m, 2m, 3m, 5m, 8m, 10m, 10m, ...
//!
//! ```rust
//! use radosgw_user_controller::controller::backoff::FibonacciBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = FibonacciBackoff::new(1, 10);
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
//! ```

use crate::config::ControllerConfig;
use std::time::Duration;

/// Per-record Fibonacci delay generator
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    min_minutes: u64,
    max_minutes: u64,
    prev_minutes: u64,
    current_minutes: u64,
    attempts: u32,
}

impl FibonacciBackoff {
    /// A fresh sequence starting at `min_minutes`, never exceeding `max_minutes`
    #[must_use]
    pub fn new(min_minutes: u64, max_minutes: u64) -> Self {
        let min_minutes = min_minutes.max(1);
        Self {
            min_minutes,
            max_minutes: max_minutes.max(min_minutes),
            prev_minutes: 0,
            current_minutes: min_minutes,
            attempts: 0,
        }
    }

    /// Sequence bounded by the controller's configured backoff window
    #[must_use]
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self::new(config.backoff_min_minutes, config.backoff_max_minutes)
    }

    /// Next delay in seconds; advances the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let delay = self.current_minutes.saturating_mul(60);
        let next = self.prev_minutes.saturating_add(self.current_minutes);
        self.prev_minutes = self.current_minutes;
        self.current_minutes = next.min(self.max_minutes);
        self.attempts = self.attempts.saturating_add(1);
        delay
    }

    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }

    /// The capped delay, used for failures no retry will fix on its own
    #[must_use]
    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_minutes.saturating_mul(60))
    }

    /// Number of delays handed out since creation or the last reset
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Back to the first delay after a successful reconciliation
    pub fn reset(&mut self) {
        self.prev_minutes = 0;
        self.current_minutes = self.min_minutes;
        self.attempts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_capped() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        let delays: Vec<u64> = (0..9).map(|_| backoff.next_backoff_seconds()).collect();
        // 1m, 1m, 2m, 3m, 5m, 8m then the 10m cap
        assert_eq!(delays, vec![60, 60, 120, 180, 300, 480, 600, 600, 600]);
        assert_eq!(backoff.attempts(), 9);
    }

    #[test]
    fn test_reset_restarts_sequence() {
        let mut backoff = FibonacciBackoff::new(1, 10);
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();
        backoff.next_backoff_seconds();

        backoff.reset();

        assert_eq!(backoff.attempts(), 0);
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
    }

    #[test]
    fn test_independent_sequences() {
        let mut first = FibonacciBackoff::new(1, 10);
        let mut second = FibonacciBackoff::new(1, 10);

        for _ in 0..4 {
            first.next_backoff_seconds();
        }
        assert_eq!(second.next_backoff_seconds(), 60);
        assert_eq!(first.next_backoff_seconds(), 300);
    }

    #[test]
    fn test_degenerate_bounds() {
        // A zero minimum would never grow; it is lifted to one minute
        let mut backoff = FibonacciBackoff::new(0, 0);
        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.next_backoff_seconds(), 60);
        assert_eq!(backoff.max_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_from_config_uses_window() {
        let config = ControllerConfig {
            backoff_min_minutes: 2,
            backoff_max_minutes: 5,
            ..ControllerConfig::default()
        };
        let mut backoff = FibonacciBackoff::from_config(&config);
        assert_eq!(backoff.next_backoff_seconds(), 120);
        assert_eq!(backoff.max_backoff(), Duration::from_secs(300));
    }
}
