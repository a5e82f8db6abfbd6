use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::classifier::{classify, recommend};
use crate::error::ExecutorError;

use super::stats::RetryStats;
use super::traits::CommandRunner;
use super::types::{ExecutionResult, RetryAttempt, RetryPolicy};

/// Wraps a [`CommandRunner`] and retries classified, retryable failures.
pub struct RetryingExecutor {
    inner: Arc<dyn CommandRunner>,
    policy: RetryPolicy,
    auto: bool,
    stats: Mutex<RetryStats>,
}

impl RetryingExecutor {
    /// Retry every command with `policy`.
    pub fn new(inner: Arc<dyn CommandRunner>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            auto: false,
            stats: Mutex::new(RetryStats::default()),
        }
    }

    /// Pick the policy from the first failure's diagnosis. `base` only
    /// contributes its observer and overall timeout.
    pub fn auto(inner: Arc<dyn CommandRunner>, base: RetryPolicy) -> Self {
        Self {
            auto: true,
            ..Self::new(inner, base)
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Consistent copy of the statistics so far.
    pub fn stats(&self) -> RetryStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn summary(&self) -> String {
        self.stats().summary()
    }

    fn record(&self, f: impl FnOnce(&mut RetryStats)) {
        if let Ok(mut s) = self.stats.lock() {
            f(&mut s);
        }
    }

    /// Run `command`, retrying per `policy`. Invokes the inner runner at
    /// most `policy.max_attempts` times.
    #[tracing::instrument(name = "retry.run", skip(self, policy, cancel), fields(max_attempts = policy.max_attempts))]
    pub async fn run_with_retry(
        &self,
        command: &str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.drive(command, Some(policy.clone()), cancel).await
    }

    /// Run once, then retry with the policy the classifier recommends for
    /// the failure. The first attempt counts towards that policy.
    #[tracing::instrument(name = "retry.run_auto", skip(self, cancel))]
    pub async fn run_with_auto_retry(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        self.drive(command, None, cancel).await
    }

    async fn drive(
        &self,
        command: &str,
        mut policy: Option<RetryPolicy>,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let mut deadline = policy.as_ref().and_then(deadline_of);
        let mut attempt: u32 = 1;

        loop {
            self.record(|s| s.record_attempt(command));

            let err = match self.inner.run(command, cancel).await {
                Ok(result) => {
                    self.record(|s| s.record_success(command));
                    if attempt > 1 {
                        tracing::info!(attempt, "command succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(e) => e,
            };

            if err.is_fatal() {
                self.record(|s| s.record_failure(command, &err.to_string()));
                return Err(err);
            }

            let diagnosis = classify(err, command);
            tracing::warn!(attempt, kind = %diagnosis.kind, message = %diagnosis.message, "attempt failed");

            if !diagnosis.retryable {
                return Err(self.give_up(command, ExecutorError::NonRetryable(Box::new(diagnosis))));
            }

            if policy.is_none() {
                policy = recommend(&diagnosis).map(|p| self.adopt(p));
                deadline = policy.as_ref().and_then(deadline_of);
            }
            let Some(active) = policy.as_ref() else {
                return Err(self.give_up(command, ExecutorError::NonRetryable(Box::new(diagnosis))));
            };

            if attempt >= active.max_attempts {
                return Err(self.give_up(
                    command,
                    ExecutorError::MaxAttemptsExceeded {
                        attempts: attempt,
                        last: Box::new(diagnosis),
                    },
                ));
            }

            let delay = active.delay_for(attempt);
            self.record(|s| s.record_retry(command, delay));
            tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");

            if let Some(observer) = &active.observer {
                observer(&RetryAttempt {
                    command: command.to_string(),
                    attempt,
                    max_attempts: active.max_attempts,
                    delay,
                    diagnosis: diagnosis.clone(),
                });
            }

            if let Err(e) = wait(delay, deadline, cancel).await {
                self.record(|s| s.record_failure(command, &e.to_string()));
                return Err(e);
            }
            attempt += 1;
        }
    }

    /// Carry the configured observer and overall timeout into a
    /// recommended policy.
    fn adopt(&self, mut recommended: RetryPolicy) -> RetryPolicy {
        if recommended.observer.is_none() {
            recommended.observer = self.policy.observer.clone();
        }
        if !recommended.has_timeout() {
            recommended.timeout = self.policy.timeout;
        }
        recommended
    }

    fn give_up(&self, command: &str, err: ExecutorError) -> ExecutorError {
        tracing::warn!(error = %err, "giving up");
        self.record(|s| s.record_failure(command, &err.to_string()));
        err
    }
}

fn deadline_of(policy: &RetryPolicy) -> Option<Instant> {
    policy.has_timeout().then(|| Instant::now() + policy.timeout)
}

/// Backoff sleep, cut short by cancellation or the overall deadline.
async fn wait(
    delay: Duration,
    deadline: Option<Instant>,
    cancel: &CancellationToken,
) -> Result<(), ExecutorError> {
    let deadline_hit = async {
        match deadline {
            Some(d) => tokio::time::sleep_until(d).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        _ = tokio::time::sleep(delay) => Ok(()),
        _ = cancel.cancelled() => Err(ExecutorError::Cancelled("cancelled during retry backoff".to_string())),
        _ = deadline_hit => Err(ExecutorError::Cancelled("retry timeout exceeded".to_string())),
    }
}

#[async_trait]
impl CommandRunner for RetryingExecutor {
    async fn run(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        if self.auto {
            self.run_with_auto_retry(command, cancel).await
        } else {
            self.run_with_retry(command, &self.policy, cancel).await
        }
    }
}
