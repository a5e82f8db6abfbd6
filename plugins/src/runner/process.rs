use std::process::Stdio;
use std::time::Instant;

use async_trait::async_trait;
use tokio::process::Command;

use sandrun_core::error::ProcessError;
use sandrun_core::runner::{ProcessOutput, ProcessRunner, ProcessSpec};

/// Spawns the sandbox CLI directly (no shell) with `tokio::process`.
pub struct TokioProcessRunner {}

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for TokioProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    fn name(&self) -> &str {
        "tokio-process"
    }

    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
        let started = Instant::now();
        let child = Command::new(&spec.program)
            .args(&spec.args)
            .envs(&spec.envs)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProcessError::Spawn {
                program: spec.program.clone(),
                message: e.to_string(),
            })?;
        tracing::debug!(program = %spec.program, pid = ?child.id(), "process spawned");

        // Dropping the future on timeout drops the child, which kills it.
        let out = match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
            Ok(res) => res?,
            Err(_) => {
                tracing::debug!(program = %spec.program, timeout = ?spec.timeout, "process timed out");
                return Err(ProcessError::TimedOut(spec.timeout));
            }
        };

        let mut output = String::from_utf8_lossy(&out.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&out.stderr);
        if !stderr.is_empty() {
            if !output.is_empty() && !output.ends_with('\n') {
                output.push('\n');
            }
            output.push_str(&stderr);
        }

        let exit_code = out.status.code();
        tracing::debug!(program = %spec.program, ?exit_code, "process exited");
        Ok(ProcessOutput {
            exit_code,
            success: out.status.success(),
            output,
            duration: started.elapsed(),
        })
    }
}
