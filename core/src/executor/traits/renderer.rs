use serde::Serialize;

use crate::classifier::Diagnosis;
use crate::executor::stats::RetryStats;
use crate::executor::types::{ExecutionResult, Job, RetryAttempt};

/// Output renderer plugin (controls the output format)
pub trait OutputRendererPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn format(&self) -> &str;
    fn render(&self, event: &RenderEvent);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// One command at a time, one `ExecutionResult` per line.
    Sequential,
    /// Batch through the parallel scheduler, one `Job` per line.
    Parallel,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Sequential => "sequential",
            RunMode::Parallel => "parallel",
        }
    }
}

/// End-of-run totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: usize,
    pub duration_ms: u64,
    /// Parallel runs only.
    pub max_concurrent: Option<usize>,
    /// Present when retries were enabled.
    pub retry: Option<RetryStats>,
}

impl RunSummary {
    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.cancelled > 0
    }
}

/// Render events (unified event type)
#[derive(Debug, Clone)]
pub enum RenderEvent {
    RunStart {
        run_id: String,
        total: usize,
        mode: RunMode,
        dry_run: bool,
    },
    /// Sequential mode: one line finished.
    CommandResult {
        run_id: String,
        index: usize,
        result: ExecutionResult,
        diagnosis: Option<Diagnosis>,
    },
    /// Parallel mode: one job reached a terminal state.
    JobComplete {
        run_id: String,
        job: Job,
    },
    RetryScheduled {
        run_id: String,
        attempt: RetryAttempt,
    },
    RunEnd {
        run_id: String,
        summary: RunSummary,
    },
}
