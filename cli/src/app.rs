use std::io::{BufRead, BufReader};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use sandrun_core::classifier::{classify, Diagnosis};
use sandrun_core::config::AppConfig;
use sandrun_core::error::{CliError, ExecutorError, RunnerError};
use sandrun_core::executor::traits::{OutputRendererPlugin, RenderEvent, RunMode, RunSummary};
use sandrun_core::executor::types::{ExecutionResult, Job, JobStatus, RetryAttempt, RetryObserver};
use sandrun_core::runner::ProcessRunner;
use sandrun_plugins::factory::{build_executor, build_renderer, build_scheduler, ExecutorChain};

use crate::commands::cli::Args;

/// One line read from an input file or stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputLine {
    pub source: String,
    pub line_no: usize,
    pub text: String,
}

pub fn read_inputs(inputs: &[String]) -> Result<Vec<InputLine>, CliError> {
    if inputs.is_empty() {
        return read_lines("stdin", std::io::stdin().lock());
    }
    let mut lines = Vec::new();
    for input in inputs {
        if input == "-" {
            lines.extend(read_lines("stdin", std::io::stdin().lock())?);
        } else {
            let file = std::fs::File::open(input)
                .map_err(|e| CliError::Command(format!("open {input}: {e}")))?;
            lines.extend(read_lines(input, BufReader::new(file))?);
        }
    }
    Ok(lines)
}

fn read_lines(source: &str, reader: impl BufRead) -> Result<Vec<InputLine>, CliError> {
    reader
        .lines()
        .enumerate()
        .map(|(i, line)| -> Result<InputLine, CliError> {
            Ok(InputLine {
                source: source.to_string(),
                line_no: i + 1,
                text: line?,
            })
        })
        .collect()
}

pub async fn run_app(
    args: Args,
    cfg: AppConfig,
    process: Arc<dyn ProcessRunner>,
) -> Result<i32, CliError> {
    cfg.sandbox
        .validate()
        .map_err(|e| CliError::Runner(RunnerError::Executor(e)))?;

    let lines = read_inputs(&args.inputs)?;
    let summary = run_lines(&args, &cfg, process, lines).await?;

    if summary.has_failures() {
        return Err(CliError::Failures {
            failed: summary.failed + summary.cancelled,
            total: summary.total,
        });
    }
    Ok(0)
}

/// Run already-read lines and render every event; returns the totals.
pub async fn run_lines(
    args: &Args,
    cfg: &AppConfig,
    process: Arc<dyn ProcessRunner>,
    lines: Vec<InputLine>,
) -> Result<RunSummary, CliError> {
    let renderer: Arc<dyn OutputRendererPlugin> = Arc::from(build_renderer(args.format.as_str()));
    let run_id = uuid::Uuid::new_v4().to_string();

    let observer: RetryObserver = {
        let renderer = renderer.clone();
        let run_id = run_id.clone();
        Arc::new(move |attempt: &RetryAttempt| {
            renderer.render(&RenderEvent::RetryScheduled {
                run_id: run_id.clone(),
                attempt: attempt.clone(),
            })
        })
    };
    let chain = build_executor(cfg, process, Some(observer))?;

    let mode = if args.parallel {
        RunMode::Parallel
    } else {
        RunMode::Sequential
    };
    renderer.render(&RenderEvent::RunStart {
        run_id: run_id.clone(),
        total: lines.len(),
        mode,
        dry_run: cfg.sandbox.dry_run,
    });
    tracing::info!(run_id = %run_id, mode = mode.as_str(), total = lines.len(), "run started");

    let started = Instant::now();
    let mut summary = match mode {
        RunMode::Sequential => run_sequential(cfg, &chain, renderer.as_ref(), &run_id, lines).await,
        RunMode::Parallel => run_parallel(cfg, &chain, renderer.as_ref(), &run_id, lines).await,
    };
    summary.duration_ms = started.elapsed().as_millis() as u64;
    summary.retry = chain.retrying.as_ref().map(|r| r.stats());

    tracing::info!(
        run_id = %run_id,
        succeeded = summary.succeeded,
        failed = summary.failed,
        skipped = summary.skipped,
        cancelled = summary.cancelled,
        "run finished"
    );
    renderer.render(&RenderEvent::RunEnd {
        run_id,
        summary: summary.clone(),
    });
    Ok(summary)
}

/// Diagnosis shown next to a failed line. Retry exhaustion already carries
/// one; cancellations get none.
fn diagnose(e: ExecutorError, command: &str) -> Option<Diagnosis> {
    if let Some(d) = e.diagnosis() {
        return Some(d.clone());
    }
    if e.is_cancelled() {
        return None;
    }
    Some(classify(e, command))
}

fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling remaining commands");
            trigger.cancel();
        }
    });
    token
}

async fn run_sequential(
    cfg: &AppConfig,
    chain: &ExecutorChain,
    renderer: &dyn OutputRendererPlugin,
    run_id: &str,
    lines: Vec<InputLine>,
) -> RunSummary {
    let cancel = ctrl_c_token();
    let delay = cfg.sandbox.inter_command_delay();
    let mut summary = RunSummary {
        total: lines.len(),
        ..RunSummary::default()
    };
    let mut ran_before = false;

    for (index, line) in lines.into_iter().enumerate() {
        if cancel.is_cancelled() {
            summary.cancelled += 1;
            continue;
        }
        // Courtesy pause between real invocations.
        if ran_before && !cfg.sandbox.dry_run && !delay.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    summary.cancelled += 1;
                    continue;
                }
            }
        }

        let started = Instant::now();
        let (result, diagnosis) = match chain.runner.run(&line.text, &cancel).await {
            Ok(result) => (result, None),
            Err(e) => {
                let error = e.to_string();
                let output = e.output().unwrap_or_default().to_string();
                let diagnosis = diagnose(e, &line.text);
                let result =
                    ExecutionResult::failed(line.text.trim(), output, error, started.elapsed());
                (result, diagnosis)
            }
        };

        if result.skipped {
            summary.skipped += 1;
        } else {
            ran_before = true;
            if result.success {
                summary.succeeded += 1;
            } else if diagnosis.is_none() && result.error.starts_with("cancelled") {
                summary.cancelled += 1;
            } else {
                summary.failed += 1;
            }
        }

        renderer.render(&RenderEvent::CommandResult {
            run_id: run_id.to_string(),
            index: index + 1,
            result,
            diagnosis,
        });
    }
    summary
}

async fn run_parallel(
    cfg: &AppConfig,
    chain: &ExecutorChain,
    renderer: &dyn OutputRendererPlugin,
    run_id: &str,
    lines: Vec<InputLine>,
) -> RunSummary {
    let scheduler = build_scheduler(cfg, chain.runner.clone());
    let jobs: Vec<Job> = lines
        .into_iter()
        .map(|l| {
            Job::new(l.text)
                .with_source_file(l.source)
                .with_metadata("line", l.line_no.to_string())
        })
        .collect();

    let mut summary = RunSummary {
        total: jobs.len(),
        ..RunSummary::default()
    };

    let mut handle = scheduler.submit(jobs).await;
    let interrupt = ctrl_c_token();
    let run_cancel = handle.cancellation_token();
    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.cancelled() => run_cancel.cancel(),
            _ = run_cancel.cancelled() => {}
        }
    });

    while let Some(job) = handle.next().await {
        match job.status {
            JobStatus::Completed if job.result.as_ref().is_some_and(|r| r.skipped) => {
                summary.skipped += 1
            }
            JobStatus::Completed => summary.succeeded += 1,
            JobStatus::Failed => summary.failed += 1,
            JobStatus::Cancelled => summary.cancelled += 1,
            JobStatus::Pending | JobStatus::Running => {}
        }
        renderer.render(&RenderEvent::JobComplete {
            run_id: run_id.to_string(),
            job,
        });
    }

    summary.max_concurrent = Some(scheduler.stats().max_observed_concurrent);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use sandrun_core::testing::ScriptedProcessRunner;
    use std::io::Cursor;

    fn config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.sandbox.access_token = "t".into();
        cfg.sandbox.access_token_secret = "s".into();
        cfg.sandbox.inter_command_delay_ms = 0;
        cfg.scheduler.show_progress = false;
        cfg.retry.base_delay_ms = 1;
        cfg.retry.max_delay_ms = 5;
        cfg
    }

    fn lines(texts: &[&str]) -> Vec<InputLine> {
        read_lines("test", Cursor::new(texts.join("\n"))).unwrap()
    }

    #[test]
    fn reads_numbered_lines() {
        let got = lines(&["# header", "usacloud server list"]);
        assert_eq!(got.len(), 2);
        assert_eq!(got[1].line_no, 2);
        assert_eq!(got[1].text, "usacloud server list");
        assert_eq!(got[1].source, "test");
    }

    #[test]
    fn read_inputs_concatenates_files_in_order() {
        use std::io::Write;
        let mut a = tempfile::NamedTempFile::new().unwrap();
        writeln!(a, "usacloud server list\nusacloud disk list").unwrap();
        let mut b = tempfile::NamedTempFile::new().unwrap();
        writeln!(b, "usacloud zone list").unwrap();

        let paths = vec![
            a.path().display().to_string(),
            b.path().display().to_string(),
        ];
        let got = read_inputs(&paths).unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[2].text, "usacloud zone list");
        assert_eq!(got[2].line_no, 1);
        assert_eq!(got[2].source, paths[1]);
    }

    #[test]
    fn read_inputs_reports_missing_files() {
        let err = read_inputs(&["/definitely/missing/cmds.txt".to_string()]).unwrap_err();
        assert_eq!(err.exit_code(), 20);
    }

    #[tokio::test]
    async fn sequential_run_tallies_outcomes() {
        let process = Arc::new(ScriptedProcessRunner::new());
        process.push_output(true, Some(0), "[]");
        process.push_output(false, Some(1), "Error: disk not found");

        let args = Args::parse_from(["sandrun", "--format", "jsonl"]);
        let summary = run_lines(
            &args,
            &config(),
            process.clone(),
            lines(&[
                "# comment",
                "usacloud server list",
                "usacloud disk read 1",
                "usacloud server delete 1",
            ]),
        )
        .await
        .unwrap();

        assert_eq!(summary.total, 4);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 2);
        assert!(summary.has_failures());
        // The destructive line never reached the process runner.
        assert_eq!(process.calls().len(), 2);
    }

    #[tokio::test]
    async fn parallel_dry_run_succeeds() {
        let mut cfg = config();
        cfg.sandbox.dry_run = true;
        let process = Arc::new(ScriptedProcessRunner::new());
        let args = Args::parse_from(["sandrun", "--parallel", "--format", "jsonl"]);

        let summary = run_lines(
            &args,
            &cfg,
            process.clone(),
            lines(&["usacloud disk read --selector name=mydisk", "ls -la", "usacloud zone list"]),
        )
        .await
        .unwrap();

        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.skipped, 1);
        assert!(!summary.has_failures());
        assert!(summary.max_concurrent.is_some());
        assert!(process.calls().is_empty());
    }

    #[tokio::test]
    async fn rejected_lines_come_with_suggestions() {
        let chain = build_executor(&config(), Arc::new(ScriptedProcessRunner::new()), None).unwrap();
        let err = chain
            .runner
            .run("usacloud server delete 1", &CancellationToken::new())
            .await
            .unwrap_err();

        let d = diagnose(err, "usacloud server delete 1").unwrap();
        assert!(!d.retryable);
        assert!(d.suggestions.iter().any(|s| s.contains("run them manually")));
        assert!(diagnose(ExecutorError::Cancelled("ctrl-c".into()), "usacloud zone list").is_none());
    }

    #[tokio::test]
    async fn missing_credentials_exit_with_config_code() {
        let args = Args::parse_from(["sandrun", "--dry-run"]);
        let err = run_app(args, AppConfig::default(), Arc::new(ScriptedProcessRunner::new()))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 11);
    }
}
