//! transport::retry
//!
//! Retry budget and backoff schedule for [`HttpTransport`](super::HttpTransport).

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

/// Default number of retries after the first attempt.
pub const DEFAULT_RETRY_MAX: u32 = 4;

/// Default lower bound on the wait between attempts.
pub const DEFAULT_RETRY_WAIT_MIN: Duration = Duration::from_secs(1);

/// Default upper bound on the wait between attempts.
pub const DEFAULT_RETRY_WAIT_MAX: Duration = Duration::from_secs(30);

/// Statuses retried unless configured otherwise.
pub const DEFAULT_RETRYABLE_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Construction-time retry configuration.
///
/// Network-level failures are always retryable; HTTP responses are retried
/// only when their status is in `retryable_statuses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// Maximum retries after the initial attempt.
    pub retry_max: u32,
    /// Minimum delay between attempts.
    pub wait_min: Duration,
    /// Maximum delay between attempts.
    pub wait_max: Duration,
    /// HTTP statuses that trigger a retry.
    pub retryable_statuses: Vec<u16>,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_max: DEFAULT_RETRY_MAX,
            wait_min: DEFAULT_RETRY_WAIT_MIN,
            wait_max: DEFAULT_RETRY_WAIT_MAX,
            retryable_statuses: DEFAULT_RETRYABLE_STATUSES.to_vec(),
            with_jitter: true,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn new(wait_min: Duration, wait_max: Duration, retry_max: u32) -> Self {
        Self {
            retry_max,
            wait_min,
            wait_max,
            ..Self::default()
        }
    }

    /// A configuration that never retries.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            retry_max: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    #[must_use]
    pub fn with_retryable_statuses(mut self, statuses: impl Into<Vec<u16>>) -> Self {
        self.retryable_statuses = statuses.into();
        self
    }

    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_statuses.contains(&status)
    }

    /// Build the exponential backoff strategy for this configuration.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.wait_min)
            .with_max_delay(self.wait_max)
            .with_max_times(self.retry_max as usize);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }

    /// Delays to wait before each retry, in order. Yields at most
    /// `retry_max` items, each clamped to `[wait_min, wait_max]`.
    pub(crate) fn schedule(&self) -> impl Iterator<Item = Duration> {
        let (min, max) = (self.wait_min, self.wait_max.max(self.wait_min));
        self.clone()
            .into_backoff()
            .build()
            .take(self.retry_max as usize)
            .map(move |d| d.clamp(min, max))
    }
}
