//! Sandbox command execution
//!
//! Four layers, each one wrapping the next:
//!
//! ```text
//! ParallelScheduler   semaphore + token bucket + error policy, one task per job
//!   ↓ CommandRunner
//! RetryingExecutor    classify failure → retry with backoff, or give up
//!   ↓ CommandRunner
//! CommandExecutor     line triage → safety gate → zone enforcement → spawn
//!   ↓ ProcessRunner
//! external process
//! ```
//!
//! Config, safety and cancellation errors never enter the retry loop.

pub mod backoff;
mod command;
pub mod line;
mod progress;
mod rate_limit;
mod retry;
pub mod safety;
mod scheduler;
mod stats;
pub mod traits;
pub mod types;

pub use command::{CommandExecutor, DRY_RUN_PREFIX};
pub use progress::{ProgressMonitor, ProgressSnapshot};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use retry::RetryingExecutor;
pub use scheduler::{ParallelScheduler, RunHandle};
pub use stats::{CommandRetryStats, RetryStats, SchedulerStats};
pub use traits::{CommandRunner, OutputRendererPlugin, RenderEvent, RunMode, RunSummary};
pub use types::{
    BackoffKind, ErrorPolicy, ExecutionResult, Job, JobStatus, RetryAttempt, RetryConfig,
    RetryPolicy, SchedulerConfig,
};
