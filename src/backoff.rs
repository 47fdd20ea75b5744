//! Retry delay strategy for the single resubmission the engine is allowed
//! when a submission hits an unavailable backend. All constructors and
//! configuration functions are `const`.
//!
//! # Example
//!
//! ```
//! # use chrono::TimeDelta;
//! # use respool::backoff::{BackoffStrategy, Strategy};
//! let strategy =
//!     BackoffStrategy::exponential(TimeDelta::seconds(2)).with_max(TimeDelta::seconds(30));
//!
//! assert_eq!(strategy.backoff(1), TimeDelta::seconds(2));
//! assert_eq!(strategy.backoff(2), TimeDelta::seconds(4));
//! assert_eq!(strategy.backoff(5), TimeDelta::seconds(30));
//! ```

use chrono::TimeDelta;

/// Type that can be used to implement a backoff strategy.
pub trait Strategy {
    /// Given an attempt number returns the [`TimeDelta`] to wait before
    /// retrying.
    fn backoff(&self, attempt: u16) -> TimeDelta;
}

/// Exponential backoff strategy.
///
/// Grows exponentially with each attempt, optionally capped via
/// [`BackoffStrategy::with_max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exponential {
    base: TimeDelta,
    max: Option<TimeDelta>,
}

impl Strategy for Exponential {
    fn backoff(&self, attempt: u16) -> TimeDelta {
        let mut seconds = self
            .base
            .num_seconds()
            .checked_pow(attempt.into())
            .unwrap_or(i64::MAX);
        if let Some(max) = self.max {
            seconds = seconds.min(max.num_seconds());
        }
        TimeDelta::seconds(seconds)
    }
}

/// Entry point for constructing a backoff strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffStrategy<T> {
    strategy: T,
}

impl BackoffStrategy<Exponential> {
    pub const fn exponential(base: TimeDelta) -> Self {
        Self {
            strategy: Exponential { base, max: None },
        }
    }

    pub const fn with_max(mut self, max: TimeDelta) -> Self {
        self.strategy.max = Some(max);
        self
    }
}

impl<T> Strategy for BackoffStrategy<T>
where
    T: Strategy,
{
    fn backoff(&self, attempt: u16) -> TimeDelta {
        self.strategy.backoff(attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_growth_with_cap() {
        let strategy =
            BackoffStrategy::exponential(TimeDelta::seconds(2)).with_max(TimeDelta::seconds(30));
        assert_eq!(strategy.backoff(1), TimeDelta::seconds(2));
        assert_eq!(strategy.backoff(2), TimeDelta::seconds(4));
        assert_eq!(strategy.backoff(3), TimeDelta::seconds(8));
        assert_eq!(strategy.backoff(4), TimeDelta::seconds(16));
        assert_eq!(strategy.backoff(5), TimeDelta::seconds(30));
        assert_eq!(strategy.backoff(6), TimeDelta::seconds(30));
    }

    #[test]
    fn exponential_overflow_saturates() {
        let strategy = BackoffStrategy::exponential(TimeDelta::seconds(2))
            .with_max(TimeDelta::seconds(60));
        assert_eq!(strategy.backoff(u16::MAX), TimeDelta::seconds(60));
    }
}
