use async_trait::async_trait;

use crate::error::ProcessError;

use super::types::{ProcessOutput, ProcessSpec};

/// Spawns one external process and waits for it, bounded by
/// `spec.timeout`. Output is stdout followed by stderr.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError>;
}
