use sandrun_core::classifier::classify_message;
use sandrun_core::executor::traits::{OutputRendererPlugin, RenderEvent};
use sandrun_core::executor::types::{ExecutionResult, JobStatus};

pub struct TextRendererPlugin {
    ascii_only: bool,
}

impl TextRendererPlugin {
    pub fn new(ascii_only: bool) -> Self {
        Self { ascii_only }
    }

    fn ok_word(&self) -> &'static str {
        if self.ascii_only {
            "OK"
        } else {
            "SUCCESS"
        }
    }

    fn fail_word(&self) -> &'static str {
        if self.ascii_only {
            "FAIL"
        } else {
            "FAILED"
        }
    }

    fn format_event(&self, event: &RenderEvent) -> String {
        match event {
            RenderEvent::RunStart {
                run_id,
                total,
                mode,
                dry_run,
            } => format!(
                "RUN START {} (mode {}, commands {}{})",
                run_id,
                mode.as_str(),
                total,
                if *dry_run { ", dry run" } else { "" }
            ),
            RenderEvent::CommandResult {
                index,
                result,
                diagnosis,
                ..
            } => {
                let mut out = self.format_result(*index, result);
                if let Some(d) = diagnosis {
                    out.push('\n');
                    out.push_str(&indent(&d.report()));
                }
                out
            }
            RenderEvent::JobComplete { job, .. } => {
                let status = match job.status {
                    JobStatus::Completed => self.ok_word(),
                    JobStatus::Failed => self.fail_word(),
                    _ => "CANCELLED",
                };
                let mut out = format!(
                    "JOB {} {} {} ({}ms)",
                    job.id, status, job.command, job.duration_ms
                );
                if let Some(file) = &job.source_file {
                    out.push_str(&format!(" [{file}]"));
                }
                if let Some(result) = &job.result {
                    if result.skipped {
                        out.push_str(&format!("\n  skipped: {}", result.skip_reason));
                    } else if !result.output.trim().is_empty() {
                        out.push('\n');
                        out.push_str(&indent(result.output.trim_end()));
                    }
                }
                match (job.status, &job.error) {
                    (JobStatus::Failed, Some(err)) => {
                        out.push('\n');
                        out.push_str(&indent(&classify_message(err, &job.command).report()));
                    }
                    (JobStatus::Cancelled, Some(reason)) => {
                        out.push_str(&format!("\n  {reason}"));
                    }
                    _ => {}
                }
                out
            }
            RenderEvent::RetryScheduled { attempt, .. } => format!(
                "RETRY {} (attempt {}/{}, next in {}ms): {}",
                attempt.command,
                attempt.attempt,
                attempt.max_attempts,
                attempt.delay.as_millis(),
                attempt.diagnosis
            ),
            RenderEvent::RunEnd { run_id, summary } => {
                let mut out = format!(
                    "RUN END {} (total {}, succeeded {}, failed {}, skipped {}, cancelled {}, duration {}ms",
                    run_id,
                    summary.total,
                    summary.succeeded,
                    summary.failed,
                    summary.skipped,
                    summary.cancelled,
                    summary.duration_ms
                );
                if let Some(peak) = summary.max_concurrent {
                    out.push_str(&format!(", peak concurrency {peak}"));
                }
                out.push(')');
                if let Some(retry) = &summary.retry {
                    out.push('\n');
                    out.push_str(&retry.summary());
                }
                out
            }
        }
    }

    fn format_result(&self, index: usize, result: &ExecutionResult) -> String {
        if result.skipped {
            return format!("[{}] SKIP {} ({})", index, result.command, result.skip_reason);
        }
        if result.success {
            let mut out = format!(
                "[{}] {} {} ({}ms)",
                index,
                self.ok_word(),
                result.command,
                result.duration_ms
            );
            if !result.output.trim().is_empty() {
                out.push('\n');
                out.push_str(&indent(result.output.trim_end()));
            }
            out
        } else {
            format!(
                "[{}] {} {}: {}",
                index,
                self.fail_word(),
                result.command,
                result.error
            )
        }
    }
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|l| format!("  {l}"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl OutputRendererPlugin for TextRendererPlugin {
    fn name(&self) -> &str {
        "text-renderer"
    }

    fn format(&self) -> &str {
        "text"
    }

    fn render(&self, event: &RenderEvent) {
        println!("{}", self.format_event(event));
    }
}
