//! Full chain: scheduler -> retrying executor -> command executor -> process.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};
use tokio_util::sync::CancellationToken;

use sandrun_core::config::SandboxConfig;
use sandrun_core::executor::traits::CommandRunner;
use sandrun_core::executor::types::{ErrorPolicy, Job, JobStatus, RetryPolicy, SchedulerConfig};
use sandrun_core::executor::{CommandExecutor, ParallelScheduler, RetryingExecutor, DRY_RUN_PREFIX};
use sandrun_core::testing::ScriptedProcessRunner;

fn sandbox() -> SandboxConfig {
    SandboxConfig {
        access_token: "token".into(),
        access_token_secret: "secret".into(),
        inter_command_delay_ms: 0,
        ..SandboxConfig::default()
    }
}

fn scheduler_config(max_concurrency: usize, error_policy: ErrorPolicy) -> SchedulerConfig {
    SchedulerConfig {
        max_concurrency,
        error_policy,
        show_progress: false,
        ..SchedulerConfig::default()
    }
}

fn chain(sandbox: SandboxConfig, process: Arc<ScriptedProcessRunner>) -> Arc<RetryingExecutor> {
    let command: Arc<dyn CommandRunner> = Arc::new(CommandExecutor::new(sandbox, process));
    let policy = RetryPolicy::new(3).with_delays(Duration::from_millis(1), Duration::from_millis(5));
    Arc::new(RetryingExecutor::new(command, policy))
}

async fn drain(scheduler: &ParallelScheduler, jobs: Vec<Job>) -> Vec<Job> {
    let handle = scheduler.submit(jobs).await;
    handle.collect().await
}

fn count(jobs: &[Job], status: JobStatus) -> usize {
    jobs.iter().filter(|j| j.status == status).count()
}

#[tokio::test]
async fn dry_run_rewrites_zone_without_spawning() {
    let process = Arc::new(ScriptedProcessRunner::new());
    let mut cfg = sandbox();
    cfg.dry_run = true;
    let runner = chain(cfg, process.clone());

    let res = assert_ok!(
        runner
            .run("usacloud disk read --selector name=mydisk", &CancellationToken::new())
            .await
    );

    assert!(res.success);
    assert!(res.output.starts_with(DRY_RUN_PREFIX));
    assert!(res.output.contains("--zone=tk1v"));
    assert!(process.calls().is_empty());
}

#[tokio::test]
async fn flaky_command_recovers_through_the_scheduler() {
    let process = Arc::new(ScriptedProcessRunner::new());
    process.push_output(false, Some(1), "Error: dial tcp: connection refused");
    process.push_output(true, Some(0), "[{\"ID\":\"1\"}]");

    let runner = chain(sandbox(), process.clone());
    let scheduler = ParallelScheduler::new(
        scheduler_config(2, ErrorPolicy::ContinueOnError),
        runner.clone(),
    );
    let job = assert_ok!(scheduler.run_one(Job::new("usacloud server list")).await);

    assert_eq!(job.status, JobStatus::Completed);
    let result = job.result.unwrap();
    assert!(result.output.contains("executed in zone tk1v"));

    let calls = process.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].program, "usacloud");
    assert_eq!(calls[0].args[0], "--zone=tk1v");
    assert_eq!(
        calls[0].envs.get("SAKURACLOUD_ZONE").map(String::as_str),
        Some("tk1v")
    );

    let stats = runner.stats();
    assert_eq!(stats.total_attempts, 2);
    assert_eq!(stats.total_retries, 1);
    assert_eq!(stats.total_successes, 1);
}

#[tokio::test]
async fn unsafe_lines_fail_without_retry_or_spawn() {
    let process = Arc::new(ScriptedProcessRunner::new());
    let runner = chain(sandbox(), process.clone());
    let scheduler = ParallelScheduler::new(
        scheduler_config(4, ErrorPolicy::ContinueOnError),
        runner.clone(),
    );

    let jobs = drain(
        &scheduler,
        vec![
            Job::new("usacloud server delete 1"),
            Job::new("usacloud --zone is1a server list"),
            Job::new("usacloud zone list"),
        ],
    )
    .await;

    assert_eq!(jobs.len(), 3);
    assert_eq!(count(&jobs, JobStatus::Failed), 2);
    assert_eq!(count(&jobs, JobStatus::Completed), 1);
    for job in jobs.iter().filter(|j| j.status == JobStatus::Failed) {
        let error = job.error.as_deref().unwrap_or_default();
        assert!(error.contains("safety validation failed"), "{error}");
    }
    assert_eq!(process.calls().len(), 1);
    assert_eq!(runner.stats().total_retries, 0);
}

#[tokio::test]
async fn stop_on_error_cancels_the_rest_of_the_batch() {
    let process = Arc::new(ScriptedProcessRunner::new());
    process.push_output(false, Some(2), "Error: invalid argument --selector");

    let runner = chain(sandbox(), process.clone());
    let scheduler = ParallelScheduler::new(scheduler_config(1, ErrorPolicy::StopOnError), runner);

    let jobs = drain(
        &scheduler,
        vec![
            Job::new("usacloud server list --selector x"),
            Job::new("usacloud disk list"),
            Job::new("usacloud zone list"),
        ],
    )
    .await;

    assert_eq!(count(&jobs, JobStatus::Failed), 1);
    assert_eq!(count(&jobs, JobStatus::Cancelled), 2);
    assert_eq!(process.calls().len(), 1);

    let stats = scheduler.stats();
    assert_eq!(stats.total, 3);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.cancelled, 2);
    assert_eq!(stats.running, 0);
}

#[tokio::test]
async fn cancelled_token_stops_the_chain_before_spawn() {
    let process = Arc::new(ScriptedProcessRunner::new());
    let runner = chain(sandbox(), process.clone());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = assert_err!(runner.run("usacloud server list", &cancel).await);
    assert!(err.is_cancelled());
    assert!(process.calls().is_empty());
}
