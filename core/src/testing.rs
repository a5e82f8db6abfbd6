//! Scripted doubles for the runner seams, shared by unit and integration
//! tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ExecutorError, ProcessError};
use crate::executor::traits::CommandRunner;
use crate::executor::types::ExecutionResult;
use crate::runner::{ProcessOutput, ProcessRunner, ProcessSpec};

/// Records every spec it is asked to run and replays queued outcomes.
/// An empty queue yields a successful, empty output.
#[derive(Default)]
pub struct ScriptedProcessRunner {
    queue: Mutex<VecDeque<Result<ProcessOutput, ProcessError>>>,
    calls: Mutex<Vec<ProcessSpec>>,
}

impl ScriptedProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_output(&self, success: bool, exit_code: Option<i32>, output: &str) {
        self.push(Ok(ProcessOutput {
            exit_code,
            success,
            output: output.to_string(),
            duration: Duration::from_millis(1),
        }));
    }

    pub fn push_error(&self, err: ProcessError) {
        self.push(Err(err));
    }

    fn push(&self, outcome: Result<ProcessOutput, ProcessError>) {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(outcome);
        }
    }

    pub fn calls(&self) -> Vec<ProcessSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ProcessRunner for ScriptedProcessRunner {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, ProcessError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(spec.clone());
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| {
            Ok(ProcessOutput {
                exit_code: Some(0),
                success: true,
                output: String::new(),
                duration: Duration::ZERO,
            })
        })
    }
}

type ErrorFactory = Arc<dyn Fn(&str) -> ExecutorError + Send + Sync>;

/// Configurable [`CommandRunner`] double.
///
/// Fails the first `fail_first` calls, fails every command containing one
/// of `fail_matching`, sleeps `delay` per call and tracks how many calls
/// overlap.
#[derive(Clone)]
pub struct ScriptedCommandRunner {
    fail_first: usize,
    fail_matching: Vec<String>,
    delay: Duration,
    error: ErrorFactory,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    commands: Arc<Mutex<Vec<String>>>,
}

impl Default for ScriptedCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCommandRunner {
    pub fn new() -> Self {
        Self {
            fail_first: 0,
            fail_matching: Vec::new(),
            delay: Duration::ZERO,
            error: Arc::new(|_| ExecutorError::CommandFailed {
                code: Some(1),
                message: "connection refused".to_string(),
                output: "dial tcp: connection refused".to_string(),
            }),
            calls: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn fail_first(mut self, n: usize) -> Self {
        self.fail_first = n;
        self
    }

    pub fn fail_matching(mut self, pattern: impl Into<String>) -> Self {
        self.fail_matching.push(pattern.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> ExecutorError + Send + Sync + 'static,
    {
        self.error = Arc::new(f);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl CommandRunner for ScriptedCommandRunner {
    async fn run(
        &self,
        command: &str,
        _cancel: &CancellationToken,
    ) -> Result<ExecutionResult, ExecutorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut c) = self.commands.lock() {
            c.push(command.to_string());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let fails = call < self.fail_first || self.fail_matching.iter().any(|p| command.contains(p));
        if fails {
            Err((self.error)(command))
        } else {
            Ok(ExecutionResult::succeeded(command, "ok", self.delay))
        }
    }
}
