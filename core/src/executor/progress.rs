use std::sync::Mutex;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};

use super::types::{Job, JobStatus};

const REDRAW_INTERVAL: Duration = Duration::from_secs(1);

/// Point-in-time view of a run's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Estimated time left, once at least one job has run.
    pub eta: Option<Duration>,
}

impl ProgressSnapshot {
    pub fn done(&self) -> usize {
        self.completed + self.failed + self.cancelled
    }
}

#[derive(Debug, Default)]
struct Counters {
    completed: usize,
    failed: usize,
    cancelled: usize,
    ran_ms: u64,
    last_draw: Option<Instant>,
}

/// Progress bar for a batch run
///
/// Counts terminal jobs against the submitted total and redraws at most
/// once per second. Hidden when disabled (e.g. JSONL output).
pub struct ProgressMonitor {
    bar: ProgressBar,
    total: usize,
    concurrency: usize,
    counters: Mutex<Counters>,
}

impl ProgressMonitor {
    pub fn new(total: usize, concurrency: usize, enabled: bool) -> Self {
        let bar = if enabled {
            let bar = ProgressBar::new(total as u64);
            if let Ok(style) = ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} jobs {msg}")
            {
                bar.set_style(style.progress_chars("█▓▒░  "));
            }
            bar
        } else {
            ProgressBar::hidden()
        };

        Self {
            bar,
            total,
            concurrency: concurrency.max(1),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Count a job that reached a terminal state.
    pub fn record(&self, job: &Job) {
        let Ok(mut c) = self.counters.lock() else {
            return;
        };
        match job.status {
            JobStatus::Completed => c.completed += 1,
            JobStatus::Failed => c.failed += 1,
            JobStatus::Cancelled => c.cancelled += 1,
            JobStatus::Pending | JobStatus::Running => return,
        }
        if job.status != JobStatus::Cancelled {
            c.ran_ms += job.duration_ms;
        }

        let done = c.completed + c.failed + c.cancelled;
        let due = c
            .last_draw
            .map_or(true, |t| t.elapsed() >= REDRAW_INTERVAL);
        if due || done >= self.total {
            c.last_draw = Some(Instant::now());
            let snap = self.snapshot_of(&c);
            drop(c);
            self.draw(&snap);
        }
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        match self.counters.lock() {
            Ok(c) => self.snapshot_of(&c),
            Err(_) => ProgressSnapshot {
                total: self.total,
                completed: 0,
                failed: 0,
                cancelled: 0,
                eta: None,
            },
        }
    }

    fn snapshot_of(&self, c: &Counters) -> ProgressSnapshot {
        let ran = c.completed + c.failed;
        let done = ran + c.cancelled;
        let eta = (ran > 0).then(|| {
            let avg = c.ran_ms / ran as u64;
            let remaining = self.total.saturating_sub(done) as u64;
            Duration::from_millis(avg * remaining / self.concurrency as u64)
        });
        ProgressSnapshot {
            total: self.total,
            completed: c.completed,
            failed: c.failed,
            cancelled: c.cancelled,
            eta,
        }
    }

    fn draw(&self, snap: &ProgressSnapshot) {
        self.bar.set_position(snap.done() as u64);
        let mut msg = format!("ok {} / failed {} / cancelled {}", snap.completed, snap.failed, snap.cancelled);
        if let Some(eta) = snap.eta.filter(|_| snap.done() < snap.total) {
            msg.push_str(&format!(" / eta {}s", eta.as_secs()));
        }
        self.bar.set_message(msg);
    }

    pub fn finish(&self) {
        let snap = self.snapshot();
        self.draw(&snap);
        self.bar.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::ExecutionResult;

    fn finished(status: JobStatus, ms: u64) -> Job {
        let mut job = Job::new("usacloud server list");
        if status != JobStatus::Cancelled {
            job.mark_running().unwrap();
        }
        match status {
            JobStatus::Completed => job
                .mark_completed(ExecutionResult::succeeded("c", "", Duration::ZERO))
                .unwrap(),
            JobStatus::Failed => job.mark_failed("boom").unwrap(),
            _ => job.mark_cancelled("stop").unwrap(),
        }
        job.duration_ms = ms;
        job
    }

    #[test]
    fn counts_terminal_jobs_and_estimates_remaining_time() {
        let monitor = ProgressMonitor::new(6, 2, false);
        monitor.record(&finished(JobStatus::Completed, 100));
        monitor.record(&finished(JobStatus::Failed, 300));
        monitor.record(&finished(JobStatus::Cancelled, 0));

        let snap = monitor.snapshot();
        assert_eq!((snap.completed, snap.failed, snap.cancelled), (1, 1, 1));
        assert_eq!(snap.done(), 3);
        // avg 200ms * 3 remaining / 2 workers
        assert_eq!(snap.eta, Some(Duration::from_millis(300)));
        monitor.finish();
    }

    #[test]
    fn no_eta_before_any_job_ran() {
        let monitor = ProgressMonitor::new(2, 1, false);
        assert_eq!(monitor.snapshot().eta, None);
        monitor.record(&finished(JobStatus::Cancelled, 0));
        assert_eq!(monitor.snapshot().eta, None);
    }

    #[test]
    fn enabled_monitor_draws_without_panicking() {
        let monitor = ProgressMonitor::new(2, 2, true);
        monitor.record(&finished(JobStatus::Completed, 10));
        monitor.record(&finished(JobStatus::Completed, 10));
        monitor.finish();
    }
}
