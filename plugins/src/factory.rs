use std::sync::Arc;

use anyhow::Result;

use sandrun_core::config::AppConfig;
use sandrun_core::executor::traits::{CommandRunner, OutputRendererPlugin};
use sandrun_core::executor::{CommandExecutor, ParallelScheduler, RetryingExecutor};
use sandrun_core::executor::types::RetryObserver;
use sandrun_core::runner::ProcessRunner;

use crate::executor::{JsonlRendererPlugin, TextRendererPlugin};
use crate::runner::TokioProcessRunner;

/// The executor chain built from configuration.
pub struct ExecutorChain {
    pub command: Arc<CommandExecutor>,
    /// Present when retries are enabled.
    pub retrying: Option<Arc<RetryingExecutor>>,
    /// Outermost runner: the retrying executor if any, else the plain one.
    pub runner: Arc<dyn CommandRunner>,
}

pub fn build_process_runner() -> Arc<dyn ProcessRunner> {
    Arc::new(TokioProcessRunner::new())
}

/// Assemble command executor → optional retrying executor.
///
/// Fails early when the sandbox configuration is unusable.
pub fn build_executor(
    cfg: &AppConfig,
    process: Arc<dyn ProcessRunner>,
    observer: Option<RetryObserver>,
) -> Result<ExecutorChain> {
    cfg.sandbox.validate()?;
    let command = Arc::new(CommandExecutor::new(cfg.sandbox.clone(), process));

    if !cfg.retry.enabled {
        return Ok(ExecutorChain {
            runner: command.clone(),
            command,
            retrying: None,
        });
    }

    let mut policy = cfg.retry.to_policy();
    policy.observer = observer;
    let inner: Arc<dyn CommandRunner> = command.clone();
    let retrying = Arc::new(if cfg.retry.auto {
        RetryingExecutor::auto(inner, policy)
    } else {
        RetryingExecutor::new(inner, policy)
    });

    Ok(ExecutorChain {
        runner: retrying.clone(),
        command,
        retrying: Some(retrying),
    })
}

pub fn build_scheduler(cfg: &AppConfig, runner: Arc<dyn CommandRunner>) -> ParallelScheduler {
    ParallelScheduler::new(cfg.scheduler.clone(), runner)
}

pub fn build_renderer(format: &str) -> Box<dyn OutputRendererPlugin> {
    match format {
        "jsonl" => Box::new(JsonlRendererPlugin::new(false)),
        // Anything other than jsonl renders as text.
        _ => Box::new(TextRendererPlugin::new(false)),
    }
}
