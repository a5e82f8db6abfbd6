use std::collections::HashMap;

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::result::ExecutionResult;

/// Lifecycle of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// pending -> running | cancelled, running -> completed | failed | cancelled.
    pub fn can_transition_to(&self, to: JobStatus) -> bool {
        matches!(
            (self, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("invalid job transition from {from} to {to}")]
    Invalid { from: JobStatus, to: JobStatus },
    #[error("job is already in terminal state {0}")]
    FromTerminal(JobStatus),
}

/// Format: job-{YYYYMMDDHHmmss}-{random8}
pub fn generate_job_id() -> String {
    let ts = Local::now().format("%Y%m%d%H%M%S");
    let uuid = Uuid::new_v4().simple().to_string();
    format!("job-{}-{}", ts, &uuid[..8])
}

/// Unit of work submitted to the parallel scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub command: String,
    /// File the command line came from, for reporting.
    pub source_file: Option<String>,
    pub status: JobStatus,
    /// Set once the job completed.
    pub result: Option<ExecutionResult>,
    /// Set once the job failed or was cancelled.
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub metadata: HashMap<String, String>,
}

impl Job {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            command: command.into(),
            source_file: None,
            status: JobStatus::Pending,
            result: None,
            error: None,
            started_at: None,
            finished_at: None,
            duration_ms: 0,
            metadata: HashMap::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_source_file(mut self, file: impl Into<String>) -> Self {
        self.source_file = Some(file.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), TransitionError> {
        if self.status.is_terminal() {
            return Err(TransitionError::FromTerminal(self.status));
        }
        if !self.status.can_transition_to(to) {
            return Err(TransitionError::Invalid {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn mark_running(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    pub fn mark_completed(&mut self, result: ExecutionResult) -> Result<(), TransitionError> {
        self.transition(JobStatus::Completed)?;
        self.result = Some(result);
        self.finish();
        Ok(())
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(error.into());
        self.finish();
        Ok(())
    }

    pub fn mark_cancelled(&mut self, reason: impl Into<String>) -> Result<(), TransitionError> {
        self.transition(JobStatus::Cancelled)?;
        self.error = Some(reason.into());
        self.finish();
        Ok(())
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.finished_at = Some(now);
        if let Some(start) = self.started_at {
            self.duration_ms = (now - start).num_milliseconds().max(0) as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::collections::HashSet;
    use std::time::Duration;

    #[test]
    fn generate_job_id_format() {
        let id = generate_job_id();
        let re = Regex::new(r"^job-\d{14}-[a-f0-9]{8}$").unwrap();
        assert!(re.is_match(&id), "Generated ID: {}", id);
    }

    #[test]
    fn generate_job_id_uniqueness() {
        let mut ids = HashSet::new();
        for _ in 0..200 {
            let id = generate_job_id();
            assert!(ids.insert(id.clone()), "Duplicate ID: {}", id);
        }
    }

    #[test]
    fn happy_path_lifecycle() {
        let mut job = Job::new("usacloud server list");
        assert_eq!(job.status, JobStatus::Pending);

        job.mark_running().unwrap();
        assert!(job.started_at.is_some());

        let result = ExecutionResult::succeeded("usacloud server list", "ok", Duration::from_millis(5));
        job.mark_completed(result.clone()).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.result, Some(result));
        assert!(job.finished_at.is_some());
        assert!(job.error.is_none());
    }

    #[test]
    fn pending_job_can_be_cancelled_but_not_completed() {
        let mut job = Job::new("usacloud server list");
        let result = ExecutionResult::succeeded("x", "", Duration::ZERO);
        assert_eq!(
            job.mark_completed(result),
            Err(TransitionError::Invalid {
                from: JobStatus::Pending,
                to: JobStatus::Completed
            })
        );
        job.mark_cancelled("run cancelled").unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.error.as_deref(), Some("run cancelled"));
        assert_eq!(job.duration_ms, 0);
    }

    #[test]
    fn terminal_jobs_are_frozen() {
        let mut job = Job::new("usacloud server list");
        job.mark_running().unwrap();
        job.mark_failed("boom").unwrap();
        assert_eq!(
            job.mark_cancelled("late"),
            Err(TransitionError::FromTerminal(JobStatus::Failed))
        );
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn status_serializes_lowercase() {
        let v = serde_json::to_value(JobStatus::Cancelled).unwrap();
        assert_eq!(v, serde_json::json!("cancelled"));
    }
}
