use std::path::PathBuf;

use clap::Parser;

use sandrun_core::config::AppConfig;
use sandrun_core::executor::types::{BackoffKind, ErrorPolicy};

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Jsonl,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

/// Run rewritten usacloud command lines safely against the sandbox zone.
#[derive(Parser, Debug)]
#[command(name = "sandrun", version)]
pub struct Args {
    /// Files with one command per line. Reads stdin when empty or `-`.
    pub inputs: Vec<String>,

    /// Config file (default: ~/.sandrun/config.toml, then ./config.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Validate and print the effective commands without running them.
    #[arg(long)]
    pub dry_run: bool,

    /// Sandbox zone every command is forced into.
    #[arg(long)]
    pub zone: Option<String>,

    /// Run the batch through the parallel scheduler.
    #[arg(long)]
    pub parallel: bool,

    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Operations per second across the batch (0 = unlimited).
    #[arg(long)]
    pub rate_limit: Option<f64>,

    /// continue-on-error | stop-on-error | stop-on-critical-error
    #[arg(long)]
    pub error_policy: Option<ErrorPolicy>,

    /// Retry transient failures.
    #[arg(long, conflicts_with = "no_retry")]
    pub retry: bool,

    #[arg(long)]
    pub no_retry: bool,

    /// Pick the retry policy from the classified failure.
    #[arg(long)]
    pub auto_retry: bool,

    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// fixed | linear | exponential | exponential-jitter
    #[arg(long)]
    pub backoff: Option<BackoffKind>,

    /// Per-command timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[arg(long)]
    pub no_progress: bool,

    /// Log effective commands and captured output.
    #[arg(long)]
    pub debug: bool,
}

impl Args {
    /// Command-line flags win over the config file.
    pub fn apply(&self, cfg: &mut AppConfig) {
        if self.dry_run {
            cfg.sandbox.dry_run = true;
        }
        if self.debug {
            cfg.sandbox.debug = true;
        }
        if let Some(zone) = &self.zone {
            cfg.sandbox.zone = zone.clone();
        }
        if let Some(secs) = self.timeout {
            cfg.sandbox.timeout_secs = secs;
        }

        if let Some(n) = self.max_concurrency {
            cfg.scheduler.max_concurrency = n.max(1);
        }
        if let Some(rate) = self.rate_limit {
            cfg.scheduler.rate_limit = rate;
        }
        if let Some(policy) = self.error_policy {
            cfg.scheduler.error_policy = policy;
        }
        if self.no_progress || self.format == OutputFormat::Jsonl {
            cfg.scheduler.show_progress = false;
        }

        if self.retry || self.auto_retry {
            cfg.retry.enabled = true;
        }
        if self.no_retry {
            cfg.retry.enabled = false;
        }
        if self.auto_retry {
            cfg.retry.auto = true;
        }
        if let Some(n) = self.max_attempts {
            cfg.retry.max_attempts = n;
        }
        if let Some(backoff) = self.backoff {
            cfg.retry.backoff = backoff;
        }
    }
}
