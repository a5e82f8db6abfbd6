use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::classifier::Diagnosis;

use super::config::BackoffKind;

/// Snapshot handed to a [`RetryObserver`] before each backoff wait.
#[derive(Debug, Clone)]
pub struct RetryAttempt {
    pub command: String,
    /// The attempt that just failed (1-based).
    pub attempt: u32,
    pub max_attempts: u32,
    /// Wait before the next attempt.
    pub delay: Duration,
    pub diagnosis: Diagnosis,
}

pub type RetryObserver = Arc<dyn Fn(&RetryAttempt) + Send + Sync>;

/// Retry behaviour for one retrying execution.
///
/// Delays produced by [`RetryPolicy::delay_for`] are always within
/// `[0, max_delay]`.
#[derive(Clone)]
pub struct RetryPolicy {
    /// At least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff: BackoffKind,
    /// Overall budget across all attempts and waits. Zero means none.
    pub timeout: Duration,
    pub observer: Option<RetryObserver>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self::new(1).with_backoff(BackoffKind::Fixed)
    }

    pub fn with_backoff(mut self, backoff: BackoffKind) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_delays(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&RetryAttempt) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn has_timeout(&self) -> bool {
        !self.timeout.is_zero()
    }

    /// Delay to wait after `attempt` (1-based) failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        crate::executor::backoff::compute_delay(self, attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff: BackoffKind::Exponential,
            timeout: Duration::ZERO,
            observer: None,
        }
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .field("backoff", &self.backoff)
            .field("timeout", &self.timeout)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}
