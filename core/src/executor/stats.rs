use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::JobStatus;

/// Retry bookkeeping for one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandRetryStats {
    pub attempts: u64,
    pub retries: u64,
    pub successes: u64,
    pub failures: u64,
    pub total_delay_ms: u64,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

/// Aggregate retry statistics plus per-command history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RetryStats {
    pub total_attempts: u64,
    pub total_retries: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    pub total_delay_ms: u64,
    pub commands: BTreeMap<String, CommandRetryStats>,
}

impl RetryStats {
    fn entry(&mut self, command: &str) -> &mut CommandRetryStats {
        self.commands.entry(command.to_string()).or_default()
    }

    pub fn record_attempt(&mut self, command: &str) {
        self.total_attempts += 1;
        let e = self.entry(command);
        e.attempts += 1;
        e.last_attempt_at = Some(Utc::now());
    }

    pub fn record_retry(&mut self, command: &str, delay: Duration) {
        let ms = delay.as_millis() as u64;
        self.total_retries += 1;
        self.total_delay_ms += ms;
        let e = self.entry(command);
        e.retries += 1;
        e.total_delay_ms += ms;
    }

    pub fn record_success(&mut self, command: &str) {
        self.total_successes += 1;
        self.entry(command).successes += 1;
    }

    pub fn record_failure(&mut self, command: &str, error: &str) {
        self.total_failures += 1;
        let e = self.entry(command);
        e.failures += 1;
        e.last_error = Some(error.to_string());
    }

    pub fn average_delay(&self) -> Duration {
        match self.total_retries {
            0 => Duration::ZERO,
            n => Duration::from_millis(self.total_delay_ms / n),
        }
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "retry stats: {} attempts, {} retries, {} succeeded, {} failed, avg delay {}ms",
            self.total_attempts,
            self.total_retries,
            self.total_successes,
            self.total_failures,
            self.average_delay().as_millis()
        );
        for (command, s) in self.commands.iter().filter(|(_, s)| s.retries > 0 || s.failures > 0) {
            out.push_str(&format!(
                "\n  {command}: {} attempts, {} retries",
                s.attempts, s.retries
            ));
            if let Some(err) = &s.last_error {
                out.push_str(&format!(", last error: {err}"));
            }
        }
        out
    }
}

/// Counters for one scheduler run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub running: usize,
    pub max_observed_concurrent: usize,
    /// Sum of per-job durations.
    pub total_duration_ms: u64,
    pub wall_time_ms: u64,
}

impl SchedulerStats {
    pub fn record_started(&mut self) {
        self.running += 1;
        self.max_observed_concurrent = self.max_observed_concurrent.max(self.running);
    }

    /// `was_running` is false for jobs cancelled before they started.
    pub fn record_finished(&mut self, status: JobStatus, duration_ms: u64, was_running: bool) {
        if was_running {
            self.running = self.running.saturating_sub(1);
        }
        self.total_duration_ms += duration_ms;
        match status {
            JobStatus::Completed => self.completed += 1,
            JobStatus::Failed => self.failed += 1,
            JobStatus::Cancelled => self.cancelled += 1,
            JobStatus::Pending | JobStatus::Running => {}
        }
    }

    pub fn finished(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }

    /// Average over jobs that actually ran.
    pub fn average_duration(&self) -> Duration {
        match self.completed + self.failed {
            0 => Duration::ZERO,
            n => Duration::from_millis(self.total_duration_ms / n as u64),
        }
    }
}
