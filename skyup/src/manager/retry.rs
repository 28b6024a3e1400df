//! Retry policies for operations that can hit transient failures.
//!
//! Writes to removable media occasionally fail with stale file handles. The
//! writer consults a [`RetryPolicy`] to decide whether and when to try again.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use skyup::manager::RetryPolicy;
//!
//! // Ten attempts, 500 ms apart
//! let policy = RetryPolicy::stale_handle();
//! assert_eq!(policy.max_attempts(), 10);
//! assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
//! assert_eq!(policy.delay_for_attempt(10), None);
//! ```

use std::time::Duration;

/// Delay between attempts after a stale-handle failure (500ms).
pub const STALE_HANDLE_DELAY_MS: u64 = 500;

/// Attempts used when writes report progress to a UI.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 10;

/// Default maximum delay for exponential backoff (30 seconds).
pub const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Default multiplier for exponential backoff.
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Spacing of retries, as selected in configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay before every retry.
    #[default]
    Fixed,
    /// Delay doubles after each failure, capped.
    Exponential,
}

impl Backoff {
    /// Configuration name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Exponential => "exponential",
        }
    }

    /// Parse a configuration name, ignoring case.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fixed" => Some(Self::Fixed),
            "exponential" => Some(Self::Exponential),
            _ => None,
        }
    }
}

/// How an operation handles transient failures.
#[derive(Clone, Debug, PartialEq)]
pub enum RetryPolicy {
    /// No retries - fail immediately on error.
    None,

    /// Fixed number of attempts with constant delay between them.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Exponential backoff with configurable parameters.
    ExponentialBackoff {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Initial delay after the first failure.
        initial_delay: Duration,
        /// Maximum delay cap.
        max_delay: Duration,
        /// Multiplier applied to the delay after each failure.
        multiplier: f64,
    },
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::stale_handle()
    }
}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_attempts` - Maximum number of attempts (including initial)
    /// * `delay` - Fixed delay between attempts
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// The policy used for volume writes that report progress.
    pub fn stale_handle() -> Self {
        Self::fixed(
            DEFAULT_WRITE_ATTEMPTS,
            Duration::from_millis(STALE_HANDLE_DELAY_MS),
        )
    }

    /// Creates an exponential backoff policy starting at `initial_delay`.
    pub fn exponential(max_attempts: u32, initial_delay: Duration) -> Self {
        Self::ExponentialBackoff {
            max_attempts,
            initial_delay,
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }

    /// Policy for volume writes: `attempts` tries, the first retry after
    /// `delay`. A single attempt means no retries at all.
    pub fn for_writes(attempts: u32, delay: Duration, backoff: Backoff) -> Self {
        if attempts <= 1 {
            return Self::None;
        }
        match backoff {
            Backoff::Fixed => Self::fixed(attempts, delay),
            Backoff::Exponential => Self::exponential(attempts, delay),
        }
    }

    /// Calculates the delay to wait after the given failed attempt.
    ///
    /// `attempt` is 1-based: `1` is the initial attempt. Returns `None` once
    /// the attempt budget is spent.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::None => None,
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::ExponentialBackoff {
                max_attempts,
                initial_delay,
                max_delay,
                multiplier,
            } => {
                if attempt >= *max_attempts {
                    return None;
                }
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let delay_ms = initial_delay.as_millis() as f64 * multiplier.powi(exponent);
                let capped = delay_ms.min(max_delay.as_millis() as f64);
                Some(Duration::from_millis(capped as u64))
            }
        }
    }

    /// Returns the maximum number of attempts for this policy.
    pub fn max_attempts(&self) -> u32 {
        match self {
            Self::None => 1,
            Self::Fixed { max_attempts, .. } => (*max_attempts).max(1),
            Self::ExponentialBackoff { max_attempts, .. } => (*max_attempts).max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_stale_handle() {
        assert_eq!(RetryPolicy::default(), RetryPolicy::stale_handle());
        assert_eq!(RetryPolicy::default().max_attempts(), 10);
    }

    #[test]
    fn test_retry_policy_none() {
        let policy = RetryPolicy::None;
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_for_writes_fixed() {
        let policy = RetryPolicy::for_writes(3, Duration::from_millis(500), Backoff::Fixed);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for_attempt(3), None);
    }

    #[test]
    fn test_for_writes_exponential() {
        let policy =
            RetryPolicy::for_writes(4, Duration::from_millis(500), Backoff::Exponential);
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(1000)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(2000)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_single_write_attempt_never_retries() {
        for backoff in [Backoff::Fixed, Backoff::Exponential] {
            let policy = RetryPolicy::for_writes(1, Duration::from_millis(500), backoff);
            assert_eq!(policy, RetryPolicy::None);
        }
    }

    #[test]
    fn test_backoff_names() {
        assert_eq!(Backoff::parse("Exponential"), Some(Backoff::Exponential));
        assert_eq!(Backoff::parse(Backoff::Fixed.name()), Some(Backoff::Fixed));
        assert_eq!(Backoff::parse("linear"), None);
    }

    #[test]
    fn test_fixed_zero_attempts_still_runs_once() {
        let policy = RetryPolicy::fixed(0, Duration::from_millis(1));
        assert_eq!(policy.max_attempts(), 1);
        assert_eq!(policy.delay_for_attempt(1), None);
    }

    #[test]
    fn test_retry_policy_exponential() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 4,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(1), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for_attempt(2), Some(Duration::from_millis(200)));
        assert_eq!(policy.delay_for_attempt(3), Some(Duration::from_millis(400)));
        assert_eq!(policy.delay_for_attempt(4), None);
    }

    #[test]
    fn test_exponential_respects_max_delay() {
        let policy = RetryPolicy::ExponentialBackoff {
            max_attempts: 10,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2.0,
        };
        assert_eq!(policy.delay_for_attempt(8), Some(Duration::from_secs(5)));
    }
}
