use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::SandboxConfig;
use crate::error::{ExecutorError, ProcessError};
use crate::runner::{ProcessOutput, ProcessRunner, ProcessSpec};

use super::line::{classify_line, LineAction};
use super::safety::{enforce_zone, render_command, tokenize, validate_command};
use super::traits::CommandRunner;
use super::types::ExecutionResult;

pub const DRY_RUN_PREFIX: &str = "[DRY RUN] Would execute:";

const AUTH_MARKERS: &[&str] = &["authentication", "unauthorized"];
const NOT_FOUND_MARKER: &str = "not found";

/// Validates one command line and runs it against the sandbox zone.
pub struct CommandExecutor {
    config: SandboxConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl CommandExecutor {
    pub fn new(config: SandboxConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Validate, rewrite and run one input line.
    ///
    /// Skipped lines come back as `Ok` with `skipped == true`. Safety
    /// violations are returned before anything is spawned.
    #[tracing::instrument(name = "command.execute", skip(self), fields(zone = %self.config.zone))]
    pub async fn execute(&self, line: &str) -> Result<ExecutionResult, ExecutorError> {
        self.config.validate()?;

        let segment = match classify_line(line, &self.config.cli_name) {
            LineAction::Skip(reason) => {
                tracing::debug!(%reason, "line skipped");
                return Ok(ExecutionResult::skipped(line.trim(), reason));
            }
            LineAction::Execute(segment) => segment,
        };

        let tokens = tokenize(&segment)?;
        validate_command(&tokens, &self.config.cli_name, &self.config.zone)?;
        let tokens = enforce_zone(&tokens, &self.config.zone);
        let effective = render_command(&tokens);
        tracing::debug!(%effective, "command validated");

        if self.config.dry_run {
            tracing::info!(%effective, "dry run");
            return Ok(ExecutionResult::succeeded(
                effective.clone(),
                format!("{DRY_RUN_PREFIX} {effective}"),
                std::time::Duration::ZERO,
            ));
        }

        let (program, args) = match tokens.split_first() {
            Some((program, args)) => (program.clone(), args.to_vec()),
            None => return Err(ExecutorError::Safety("empty command".to_string())),
        };
        let spec = ProcessSpec {
            program,
            args,
            envs: self.config.envs(),
            timeout: self.config.timeout(),
        };

        let started = Instant::now();
        let out = self
            .runner
            .run(&spec)
            .await
            .map_err(|e| self.map_process_error(e, &effective))?;
        let elapsed = started.elapsed();

        if self.config.debug {
            tracing::info!(%effective, exit_code = ?out.exit_code, output = %out.output, "command finished");
        } else {
            tracing::debug!(exit_code = ?out.exit_code, elapsed_ms = elapsed.as_millis() as u64, "command finished");
        }

        if !out.success {
            return Err(failure_error(out));
        }

        let output = format!(
            "{}\n[sandbox] executed in zone {} (non-production)",
            out.output.trim_end(),
            self.config.zone
        );
        Ok(ExecutionResult::succeeded(effective, output, elapsed))
    }

    fn map_process_error(&self, err: ProcessError, effective: &str) -> ExecutorError {
        match err {
            ProcessError::TimedOut(timeout) => ExecutorError::Timeout {
                command: effective.to_string(),
                timeout,
            },
            ProcessError::Spawn { program, message } => {
                ExecutorError::Spawn(format!("{program}: {message}"))
            }
            ProcessError::Io(e) => ExecutorError::Other(format!("process io error: {e}")),
        }
    }
}

/// Pick the most specific error for a process that exited unsuccessfully.
fn failure_error(out: ProcessOutput) -> ExecutorError {
    let lowered = out.output.to_lowercase();
    let message = last_meaningful_line(&out.output);

    if AUTH_MARKERS.iter().any(|m| lowered.contains(m)) {
        ExecutorError::Auth {
            message,
            output: out.output,
        }
    } else if lowered.contains(NOT_FOUND_MARKER) {
        ExecutorError::NotFound {
            message,
            output: out.output,
        }
    } else {
        ExecutorError::CommandFailed {
            code: out.exit_code,
            message,
            output: out.output,
        }
    }
}

fn last_meaningful_line(output: &str) -> String {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("process exited unsuccessfully")
        .to_string()
}

#[async_trait]
impl CommandRunner for CommandExecutor {
    async fn run(
        &self,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        if cancel.is_cancelled() {
            return Err(ExecutorError::Cancelled(
                "run cancelled before the command started".to_string(),
            ));
        }
        self.execute(command).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedProcessRunner;
    use std::time::Duration;

    fn config() -> SandboxConfig {
        SandboxConfig {
            access_token: "token".into(),
            access_token_secret: "secret".into(),
            timeout_secs: 5,
            ..SandboxConfig::default()
        }
    }

    fn executor(cfg: SandboxConfig, runner: &Arc<ScriptedProcessRunner>) -> CommandExecutor {
        CommandExecutor::new(cfg, runner.clone())
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_anything_else() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let exec = executor(SandboxConfig::default(), &runner);
        let err = exec.execute("# just a comment").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Config(_)));
        assert_eq!(runner.calls().len(), 0);
    }

    #[tokio::test]
    async fn foreign_commands_are_skipped_without_spawning() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let exec = executor(config(), &runner);
        for line in ["ls -la", "aws s3 ls", "", "# usacloud server list"] {
            let res = exec.execute(line).await.unwrap();
            assert!(res.skipped && res.success, "{line}");
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn destructive_commands_never_reach_the_runner() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let exec = executor(config(), &runner);
        let err = exec
            .execute("usacloud delete --force --zone=tk1v 123")
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Safety(_)));
        let err = exec.execute("usacloud server list --zone is1a").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Safety(_)));
        for line in [
            "usacloud --profile prod server delete 1234",
            "usacloud -o json server shutdown 1234",
            "usacloud --selector name=a disk delete",
        ] {
            let err = exec.execute(line).await.unwrap_err();
            assert!(matches!(err, ExecutorError::Safety(_)), "{line}: {err}");
        }
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_effective_command() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let exec = executor(
            SandboxConfig {
                dry_run: true,
                ..config()
            },
            &runner,
        );
        let res = exec
            .execute("usacloud disk read --selector name=mydisk")
            .await
            .unwrap();
        assert!(res.success && !res.skipped);
        assert!(res.output.starts_with(DRY_RUN_PREFIX));
        assert!(res.output.contains("--zone=tk1v"));
        assert_eq!(res.command, "usacloud --zone=tk1v disk read --selector name=mydisk");
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn spawns_with_enforced_zone_and_credentials() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        runner.push_output(true, Some(0), "[]");
        let exec = executor(config(), &runner);

        let res = exec
            .execute("cd /tmp && usacloud server list --zone tk1v | jq .")
            .await
            .unwrap();
        assert!(res.success);
        assert!(res.output.starts_with("[]"));
        assert!(res.output.contains("[sandbox]"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "usacloud");
        assert_eq!(calls[0].args, vec!["server", "list", "--zone=tk1v"]);
        assert_eq!(
            calls[0].envs.get("SAKURACLOUD_ACCESS_TOKEN").map(String::as_str),
            Some("token")
        );
        assert_eq!(calls[0].timeout, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn failure_output_maps_to_specific_errors() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        runner.push_output(false, Some(1), "Error: 401 Unauthorized");
        runner.push_output(false, Some(1), "Error: server not found");
        runner.push_output(false, Some(2), "something odd\n");
        let exec = executor(config(), &runner);

        let err = exec.execute("usacloud server list").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Auth { .. }), "{err}");

        let err = exec.execute("usacloud server read 1").await.unwrap_err();
        assert!(matches!(err, ExecutorError::NotFound { .. }), "{err}");

        let err = exec.execute("usacloud server list").await.unwrap_err();
        match err {
            ExecutorError::CommandFailed { code, message, output } => {
                assert_eq!(code, Some(2));
                assert_eq!(message, "something odd");
                assert_eq!(output, "something odd\n");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn process_timeout_becomes_timeout_error() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        runner.push_error(ProcessError::TimedOut(Duration::from_secs(5)));
        let exec = executor(config(), &runner);
        let err = exec.execute("usacloud server list").await.unwrap_err();
        assert!(matches!(err, ExecutorError::Timeout { .. }));
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_spawn() {
        let runner = Arc::new(ScriptedProcessRunner::new());
        let exec = executor(config(), &runner);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = exec.run("usacloud server list", &cancel).await.unwrap_err();
        assert!(err.is_cancelled());
        assert!(runner.calls().is_empty());
    }
}
