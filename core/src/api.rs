//! Stable re-exports for consumers (`cli`, `plugins`, and external crates).
//!
//! Prefer importing from `sandrun_core::api` instead of reaching into internal modules.

pub use crate::classifier::{classify, classify_message, recommend, Diagnosis, ErrorKind};
pub use crate::config::{
    load_default, load_from, AppConfig, LoggingConfig, SandboxConfig,
};
pub use crate::error::{CliError, ErrorCode, ExecutorError, ProcessError, RunnerError};
pub use crate::executor::{
    BackoffKind, CommandExecutor, CommandRunner, ErrorPolicy, ExecutionResult, Job, JobStatus,
    OutputRendererPlugin, ParallelScheduler, RenderEvent, RetryAttempt, RetryConfig, RetryPolicy,
    RetryStats, RetryingExecutor, RunHandle, RunMode, RunSummary, SchedulerConfig,
    SchedulerStats, DRY_RUN_PREFIX,
};
pub use crate::runner::{ProcessOutput, ProcessRunner, ProcessSpec};
