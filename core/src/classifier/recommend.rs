use std::time::Duration;

use crate::executor::types::{BackoffKind, RetryPolicy};

use super::diagnosis::{Diagnosis, ErrorKind};

/// Default retry policy for a diagnosis, or `None` when retrying cannot help.
pub fn recommend(diagnosis: &Diagnosis) -> Option<RetryPolicy> {
    if !diagnosis.retryable {
        return None;
    }

    let policy = match diagnosis.kind {
        ErrorKind::Timeout => RetryPolicy::new(2)
            .with_backoff(BackoffKind::Exponential)
            .with_delays(Duration::from_secs(2), Duration::from_secs(10)),
        ErrorKind::Network => RetryPolicy::new(3)
            .with_backoff(BackoffKind::Linear)
            .with_delays(Duration::from_secs(1), Duration::from_secs(10)),
        ErrorKind::Unknown => RetryPolicy::new(2)
            .with_backoff(BackoffKind::Exponential)
            .with_delays(Duration::from_secs(1), Duration::from_secs(5)),
        _ => RetryPolicy::new(1)
            .with_backoff(BackoffKind::Fixed)
            .with_delays(Duration::from_secs(1), Duration::from_secs(1)),
    };
    Some(policy)
}
