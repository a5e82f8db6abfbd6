use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Outcome of running one command line.
///
/// When `skipped` is true only `skip_reason` carries meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Command text (the effective, zone-enforced command once validated).
    pub command: String,

    pub success: bool,

    /// Combined stdout/stderr.
    pub output: String,

    /// Error text, empty on success.
    pub error: String,

    pub duration_ms: u64,

    pub skipped: bool,

    pub skip_reason: String,
}

impl ExecutionResult {
    pub fn succeeded(command: impl Into<String>, output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            command: command.into(),
            success: true,
            output: output.into(),
            error: String::new(),
            duration_ms: elapsed.as_millis() as u64,
            skipped: false,
            skip_reason: String::new(),
        }
    }

    pub fn failed(
        command: impl Into<String>,
        output: impl Into<String>,
        error: impl Into<String>,
        elapsed: Duration,
    ) -> Self {
        Self {
            command: command.into(),
            success: false,
            output: output.into(),
            error: error.into(),
            duration_ms: elapsed.as_millis() as u64,
            skipped: false,
            skip_reason: String::new(),
        }
    }

    /// Skips count as successes so a batch of comments is not a failure.
    pub fn skipped(command: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            success: true,
            output: String::new(),
            error: String::new(),
            duration_ms: 0,
            skipped: true,
            skip_reason: reason.into(),
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}
