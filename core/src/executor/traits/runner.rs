use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::executor::types::ExecutionResult;

/// Anything that can run one command line: the sandbox executor, the
/// retrying wrapper around it, or a test double.
///
/// `cancel` aborts waits the runner controls (backoff sleeps). A process
/// already spawned is bounded by its own timeout instead.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError>;
}
