use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::policy::RetryPolicy;

/// Delay growth between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffKind {
    Fixed,
    Linear,
    #[default]
    Exponential,
    #[serde(alias = "exponential-with-jitter")]
    ExponentialJitter,
}

impl BackoffKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackoffKind::Fixed => "fixed",
            BackoffKind::Linear => "linear",
            BackoffKind::Exponential => "exponential",
            BackoffKind::ExponentialJitter => "exponential-jitter",
        }
    }
}

impl std::str::FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(BackoffKind::Fixed),
            "linear" => Ok(BackoffKind::Linear),
            "exponential" | "exponential-backoff" => Ok(BackoffKind::Exponential),
            "exponential-jitter" | "exponential-with-jitter" => Ok(BackoffKind::ExponentialJitter),
            other => Err(format!("unknown backoff kind: {other}")),
        }
    }
}

/// Substrings that make a failure "critical" for
/// [`ErrorPolicy::StopOnCriticalError`]. Matched case-insensitively.
pub const CRITICAL_PATTERNS: &[&str] = &[
    "authentication",
    "unauthorized",
    "forbidden",
    "api key",
    "token",
    "quota exceeded",
    "service unavailable",
];

/// How one job's failure affects the rest of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorPolicy {
    #[default]
    ContinueOnError,
    StopOnError,
    StopOnCriticalError,
}

impl ErrorPolicy {
    /// Whether a failure with this message cancels the whole run.
    pub fn should_cancel(&self, message: &str) -> bool {
        match self {
            ErrorPolicy::ContinueOnError => false,
            ErrorPolicy::StopOnError => true,
            ErrorPolicy::StopOnCriticalError => is_critical(message),
        }
    }
}

impl std::str::FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continue" | "continue-on-error" => Ok(ErrorPolicy::ContinueOnError),
            "stop" | "stop-on-error" => Ok(ErrorPolicy::StopOnError),
            "critical" | "stop-on-critical-error" => Ok(ErrorPolicy::StopOnCriticalError),
            other => Err(format!("unknown error policy: {other}")),
        }
    }
}

pub fn is_critical(message: &str) -> bool {
    let lowered = message.to_lowercase();
    CRITICAL_PATTERNS.iter().any(|p| lowered.contains(p))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_retry_enabled")]
    pub enabled: bool,
    /// Use the classifier's recommended policy instead of the fields below.
    #[serde(default)]
    pub auto: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default)]
    pub backoff: BackoffKind,
    /// Overall budget for one retrying execution; 0 disables it.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_retry_enabled(),
            auto: false,
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff: BackoffKind::default(),
            timeout_ms: 0,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts)
            .with_backoff(self.backoff)
            .with_delays(
                Duration::from_millis(self.base_delay_ms),
                Duration::from_millis(self.max_delay_ms),
            )
            .with_timeout(Duration::from_millis(self.timeout_ms))
    }
}

fn default_retry_enabled() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Operations per second admitted by the token bucket; 0 disables it.
    #[serde(default)]
    pub rate_limit: f64,
    #[serde(default = "default_rate_burst")]
    pub rate_burst: usize,
    #[serde(default)]
    pub error_policy: ErrorPolicy,
    /// Overall run budget; 0 disables it.
    #[serde(default)]
    pub timeout_secs: u64,
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            rate_limit: 0.0,
            rate_burst: default_rate_burst(),
            error_policy: ErrorPolicy::default(),
            timeout_secs: 0,
            show_progress: default_show_progress(),
        }
    }
}

impl SchedulerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_max_concurrency() -> usize {
    num_cpus::get().max(1)
}

fn default_rate_burst() -> usize {
    1
}

fn default_show_progress() -> bool {
    true
}
