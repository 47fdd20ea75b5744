//! Engine configuration.

use std::time::Duration;

use chrono::TimeDelta;

/// Tunables for the engine's background cadence and backend interaction.
///
/// Defaults suit a single shared office printer: a UI-refresh-speed
/// reconcile cadence, a week of retention, and a daily sweep.
///
/// # Example
///
/// ```
/// # use std::time::Duration;
/// # use chrono::TimeDelta;
/// # use respool::config::SpoolConfig;
/// let config = SpoolConfig::new()
///     .with_poll_interval(Duration::from_secs(10))
///     .with_retention(TimeDelta::days(30));
/// ```
#[derive(Debug, Clone)]
pub struct SpoolConfig {
    /// How often the reconcile pass runs.
    pub poll_interval: Duration,
    /// How long records and backing files are kept after submission.
    pub retention: TimeDelta,
    /// How often the retention sweeper runs.
    pub sweep_interval: Duration,
}

impl SpoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_retention(mut self, retention: TimeDelta) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(7),
            retention: TimeDelta::days(7),
            sweep_interval: Duration::from_secs(60 * 60 * 24),
        }
    }
}
