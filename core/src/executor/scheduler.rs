use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Instant;

use futures::stream::FuturesUnordered;
use futures::{Stream, StreamExt};
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::ExecutorError;

use super::progress::ProgressMonitor;
use super::rate_limit::RateLimiter;
use super::stats::SchedulerStats;
use super::traits::CommandRunner;
use super::types::{generate_job_id, ErrorPolicy, Job, JobStatus, SchedulerConfig, TransitionError};

type JobMap = Arc<RwLock<HashMap<String, Job>>>;

/// Runs batches of jobs concurrently through an injected [`CommandRunner`].
///
/// One task per job; a semaphore of `max_concurrency` permits bounds how
/// many run at once and an optional token bucket paces starts. Both are
/// shared by every run of the same scheduler.
pub struct ParallelScheduler {
    config: SchedulerConfig,
    executor: Arc<dyn CommandRunner>,
    jobs: JobMap,
    stats: Arc<Mutex<SchedulerStats>>,
    semaphore: Arc<Semaphore>,
    limiter: Option<Arc<RateLimiter>>,
    root: CancellationToken,
}

impl ParallelScheduler {
    pub fn new(config: SchedulerConfig, executor: Arc<dyn CommandRunner>) -> Self {
        let permits = config.max_concurrency.max(1);
        let limiter = RateLimiter::new(config.rate_limit, config.rate_burst).map(Arc::new);
        Self {
            config,
            executor,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(Mutex::new(SchedulerStats::default())),
            semaphore: Arc::new(Semaphore::new(permits)),
            limiter,
            root: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Stamp `jobs` pending, store them and start one task per job.
    ///
    /// The returned handle yields each job once it reaches a terminal
    /// state, in completion order, and ends when every job has.
    #[tracing::instrument(name = "scheduler.submit", skip_all, fields(jobs = jobs.len()))]
    pub async fn submit(&self, jobs: Vec<Job>) -> RunHandle {
        let run_id = Uuid::new_v4().to_string();
        let cancel = self.root.child_token();
        let total = jobs.len();

        let ids = self.register(jobs).await;
        if let Ok(mut s) = self.stats.lock() {
            s.total += total;
        }
        tracing::info!(
            run_id = %run_id,
            total,
            max_concurrency = self.config.max_concurrency,
            rate_limit = self.config.rate_limit,
            policy = ?self.config.error_policy,
            "run started"
        );

        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = Arc::new(RunContext {
            run_id: run_id.clone(),
            executor: self.executor.clone(),
            jobs: self.jobs.clone(),
            stats: self.stats.clone(),
            semaphore: self.semaphore.clone(),
            limiter: self.limiter.clone(),
            cancel: cancel.clone(),
            policy: self.config.error_policy,
            progress: ProgressMonitor::new(
                total,
                self.config.max_concurrency,
                self.config.show_progress,
            ),
            tx,
        });

        let watcher = self.config.timeout().map(|limit| {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        tracing::warn!(timeout_secs = limit.as_secs(), "run timed out, cancelling");
                        cancel.cancel();
                    }
                    _ = cancel.cancelled() => {}
                }
            })
        });

        let tasks: FuturesUnordered<_> = ids
            .into_iter()
            .map(|id| tokio::spawn(run_job(ctx.clone(), id)))
            .collect();

        tokio::spawn(async move {
            let started = Instant::now();
            let mut tasks = tasks;
            while let Some(joined) = tasks.next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "job task panicked");
                }
            }
            if let Some(w) = watcher {
                w.abort();
            }
            ctx.progress.finish();
            let wall_ms = started.elapsed().as_millis() as u64;
            if let Ok(mut s) = ctx.stats.lock() {
                s.wall_time_ms += wall_ms;
            }
            let snap = ctx.progress.snapshot();
            tracing::info!(
                run_id = %ctx.run_id,
                completed = snap.completed,
                failed = snap.failed,
                cancelled = snap.cancelled,
                wall_ms,
                "run finished"
            );
            // Dropping the last sender closes the handle's stream.
        });

        RunHandle {
            run_id,
            total,
            rx,
            cancel,
        }
    }

    /// Submit a single job and wait for its terminal state.
    pub async fn run_one(&self, job: Job) -> Result<Job, ExecutorError> {
        let mut handle = self.submit(vec![job]).await;
        handle
            .next()
            .await
            .ok_or_else(|| ExecutorError::Other("job finished without a result".to_string()))
    }

    async fn register(&self, jobs: Vec<Job>) -> Vec<String> {
        let mut map = self.jobs.write().await;
        let mut ids = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            if job.id.is_empty() || map.contains_key(&job.id) {
                if !job.id.is_empty() {
                    tracing::warn!(job_id = %job.id, "duplicate job id, assigning a new one");
                }
                job.id = unique_id(&map);
            }
            job.status = JobStatus::Pending;
            job.result = None;
            job.error = None;
            job.started_at = None;
            job.finished_at = None;
            job.duration_ms = 0;
            ids.push(job.id.clone());
            map.insert(job.id.clone(), job);
        }
        ids
    }

    /// Current state of one job.
    pub async fn job(&self, id: &str) -> Option<Job> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshot of every job this scheduler has seen.
    pub async fn jobs(&self) -> Vec<Job> {
        self.jobs.read().await.values().cloned().collect()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Cancel every run of this scheduler, current and future.
    pub fn cancel(&self) {
        self.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.root.is_cancelled()
    }
}

fn unique_id(map: &HashMap<String, Job>) -> String {
    loop {
        let id = generate_job_id();
        if !map.contains_key(&id) {
            return id;
        }
    }
}

struct RunContext {
    run_id: String,
    executor: Arc<dyn CommandRunner>,
    jobs: JobMap,
    stats: Arc<Mutex<SchedulerStats>>,
    semaphore: Arc<Semaphore>,
    limiter: Option<Arc<RateLimiter>>,
    cancel: CancellationToken,
    policy: ErrorPolicy,
    progress: ProgressMonitor,
    tx: mpsc::UnboundedSender<Job>,
}

impl RunContext {
    async fn update<F>(&self, id: &str, f: F) -> Option<Job>
    where
        F: FnOnce(&mut Job) -> Result<(), TransitionError>,
    {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(id)?;
        if let Err(e) = f(job) {
            tracing::warn!(job_id = id, error = %e, "job transition rejected");
        }
        Some(job.clone())
    }

    fn publish(&self, job: Job, was_running: bool) {
        if let Ok(mut s) = self.stats.lock() {
            s.record_finished(job.status, job.duration_ms, was_running);
        }
        self.progress.record(&job);
        tracing::debug!(job_id = %job.id, status = %job.status, "job finished");
        let _ = self.tx.send(job);
    }

    async fn cancel_pending(&self, id: &str, reason: &str) {
        if let Some(job) = self.update(id, |j| j.mark_cancelled(reason)).await {
            self.publish(job, false);
        }
    }
}

async fn run_job(ctx: Arc<RunContext>, id: String) {
    let Some(command) = ctx.jobs.read().await.get(&id).map(|j| j.command.clone()) else {
        return;
    };

    let permit = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => None,
        p = ctx.semaphore.clone().acquire_owned() => p.ok(),
    };
    let Some(_permit) = permit else {
        ctx.cancel_pending(&id, "cancelled while waiting for a worker slot").await;
        return;
    };

    if let Some(limiter) = &ctx.limiter {
        if let Err(e) = limiter.wait(&ctx.cancel).await {
            ctx.cancel_pending(&id, &e.to_string()).await;
            return;
        }
    }
    if ctx.cancel.is_cancelled() {
        ctx.cancel_pending(&id, "cancelled before start").await;
        return;
    }

    ctx.update(&id, Job::mark_running).await;
    if let Ok(mut s) = ctx.stats.lock() {
        s.record_started();
    }
    tracing::debug!(job_id = %id, "job running");

    let outcome = ctx.executor.run(&command, &ctx.cancel).await;

    let job = match outcome {
        Ok(result) => ctx.update(&id, |j| j.mark_completed(result)).await,
        Err(e) if e.is_cancelled() => {
            let msg = e.to_string();
            ctx.update(&id, |j| j.mark_cancelled(msg)).await
        }
        Err(e) => {
            let msg = e.to_string();
            if ctx.policy.should_cancel(&msg) {
                tracing::warn!(job_id = %id, error = %msg, policy = ?ctx.policy, "job failure cancels the run");
                ctx.cancel.cancel();
            }
            ctx.update(&id, |j| j.mark_failed(msg)).await
        }
    };

    if let Some(job) = job {
        ctx.publish(job, true);
    }
}

/// Stream of terminal jobs from one [`ParallelScheduler::submit`] call.
pub struct RunHandle {
    run_id: String,
    total: usize,
    rx: mpsc::UnboundedReceiver<Job>,
    cancel: CancellationToken,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn total(&self) -> usize {
        self.total
    }

    /// Cancel this run only. Jobs already executing finish on their own.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Stream for RunHandle {
    type Item = Job;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Job>> {
        self.get_mut().rx.poll_recv(cx)
    }
}
