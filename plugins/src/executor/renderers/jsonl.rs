use chrono::Local;
use sandrun_core::executor::traits::{OutputRendererPlugin, RenderEvent};
use serde_json::{json, Value};

pub struct JsonlRendererPlugin {
    pretty_print: bool,
}

impl JsonlRendererPlugin {
    pub fn new(pretty_print: bool) -> Self {
        Self { pretty_print }
    }

    fn event_to_json(&self, event: &RenderEvent) -> Value {
        let ts = Local::now().to_rfc3339();
        match event {
            RenderEvent::RunStart {
                run_id,
                total,
                mode,
                dry_run,
            } => json!({
                "v": 1,
                "event_type": "run.start",
                "ts": ts,
                "run_id": run_id,
                "metadata": {
                    "total": total,
                    "mode": mode,
                    "dry_run": dry_run,
                }
            }),
            RenderEvent::CommandResult {
                run_id,
                index,
                result,
                diagnosis,
            } => json!({
                "v": 1,
                "event_type": "command.result",
                "ts": ts,
                "run_id": run_id,
                "index": index,
                "result": result,
                "diagnosis": diagnosis,
            }),
            RenderEvent::JobComplete { run_id, job } => json!({
                "v": 1,
                "event_type": "job.end",
                "ts": ts,
                "run_id": run_id,
                "job_id": job.id,
                "job": job,
            }),
            RenderEvent::RetryScheduled { run_id, attempt } => json!({
                "v": 1,
                "event_type": "retry.scheduled",
                "ts": ts,
                "run_id": run_id,
                "command": attempt.command,
                "metadata": {
                    "attempt": attempt.attempt,
                    "max_attempts": attempt.max_attempts,
                    "delay_ms": attempt.delay.as_millis() as u64,
                    "kind": attempt.diagnosis.kind,
                    "message": attempt.diagnosis.message,
                }
            }),
            RenderEvent::RunEnd { run_id, summary } => json!({
                "v": 1,
                "event_type": "run.end",
                "ts": ts,
                "run_id": run_id,
                "metadata": summary,
            }),
        }
    }
}

impl OutputRendererPlugin for JsonlRendererPlugin {
    fn name(&self) -> &str {
        "jsonl-renderer"
    }

    fn format(&self) -> &str {
        "jsonl"
    }

    fn render(&self, event: &RenderEvent) {
        let json = self.event_to_json(event);
        let line = if self.pretty_print {
            serde_json::to_string_pretty(&json)
        } else {
            serde_json::to_string(&json)
        };
        match line {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!(error = %e, "failed to serialize render event"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sandrun_core::classifier::{Diagnosis, ErrorKind};
    use sandrun_core::executor::traits::{RunMode, RunSummary};
    use sandrun_core::executor::types::{ExecutionResult, Job, RetryAttempt};
    use std::time::Duration;

    #[test]
    fn every_event_is_versioned() {
        let renderer = JsonlRendererPlugin::new(false);
        let events = [
            RenderEvent::RunStart {
                run_id: "r".into(),
                total: 1,
                mode: RunMode::Parallel,
                dry_run: true,
            },
            RenderEvent::JobComplete {
                run_id: "r".into(),
                job: Job::new("usacloud server list").with_id("job-1"),
            },
            RenderEvent::RunEnd {
                run_id: "r".into(),
                summary: RunSummary::default(),
            },
        ];
        for event in &events {
            let v = renderer.event_to_json(event);
            assert_eq!(v["v"], 1);
            assert_eq!(v["run_id"], "r");
        }
        assert_eq!(renderer.event_to_json(&events[0])["metadata"]["mode"], "parallel");
        assert_eq!(renderer.event_to_json(&events[1])["job"]["status"], "pending");
    }

    #[test]
    fn command_result_carries_diagnosis_kind() {
        let v = JsonlRendererPlugin::new(false).event_to_json(&RenderEvent::CommandResult {
            run_id: "r".into(),
            index: 0,
            result: ExecutionResult::failed("usacloud x", "", "boom", Duration::ZERO),
            diagnosis: Some(Diagnosis::new(ErrorKind::Network, "network error: boom", "usacloud x")),
        });
        assert_eq!(v["event_type"], "command.result");
        assert_eq!(v["diagnosis"]["kind"], "network");
        assert_eq!(v["result"]["success"], false);
    }

    #[test]
    fn retry_event_reports_delay() {
        let v = JsonlRendererPlugin::new(false).event_to_json(&RenderEvent::RetryScheduled {
            run_id: "r".into(),
            attempt: RetryAttempt {
                command: "usacloud server list".into(),
                attempt: 1,
                max_attempts: 3,
                delay: Duration::from_millis(250),
                diagnosis: Diagnosis::new(ErrorKind::Timeout, "timed out", "usacloud server list"),
            },
        });
        assert_eq!(v["metadata"]["delay_ms"], 250);
        assert_eq!(v["metadata"]["kind"], "timeout");
    }
}
