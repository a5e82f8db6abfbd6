use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;
use crate::executor::types::{RetryConfig, SchedulerConfig};

pub const ENV_ACCESS_TOKEN: &str = "SAKURACLOUD_ACCESS_TOKEN";
pub const ENV_ACCESS_TOKEN_SECRET: &str = "SAKURACLOUD_ACCESS_TOKEN_SECRET";
pub const ENV_ZONE: &str = "SAKURACLOUD_ZONE";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_enabled")]
    pub enabled: bool,

    /// If true, log to stderr.
    #[serde(default = "default_logging_console")]
    pub console: bool,

    /// If true, log to a file under `directory` (or OS temp dir if unset).
    #[serde(default)]
    pub file: bool,

    /// EnvFilter string, e.g. "info" or "sandrun_core=debug".
    #[serde(default = "default_logging_level")]
    pub level: String,

    /// Optional directory for log files. If empty or unset, uses OS temp dir.
    #[serde(default)]
    pub directory: Option<String>,
}

fn default_logging_enabled() -> bool {
    true
}

fn default_logging_console() -> bool {
    true
}

fn default_logging_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: default_logging_enabled(),
            console: default_logging_console(),
            file: false,
            level: default_logging_level(),
            directory: None,
        }
    }
}

/// Everything the command executor needs to talk to the sandbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub access_token_secret: String,

    /// Non-production zone every command is forced into.
    #[serde(default = "default_zone")]
    pub zone: String,

    /// Name of the managed CLI binary.
    #[serde(default = "default_cli_name")]
    pub cli_name: String,

    /// Per-command timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub dry_run: bool,

    #[serde(default)]
    pub debug: bool,

    /// Pause between commands in sequential mode.
    #[serde(default = "default_inter_command_delay_ms")]
    pub inter_command_delay_ms: u64,

    /// Forwarded to every spawned process.
    #[serde(default)]
    pub extra_envs: HashMap<String, String>,
}

fn default_zone() -> String {
    "tk1v".to_string()
}

fn default_cli_name() -> String {
    "usacloud".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_inter_command_delay_ms() -> u64 {
    500
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            access_token_secret: String::new(),
            zone: default_zone(),
            cli_name: default_cli_name(),
            timeout_secs: default_timeout_secs(),
            dry_run: false,
            debug: false,
            inter_command_delay_ms: default_inter_command_delay_ms(),
            extra_envs: HashMap::new(),
        }
    }
}

impl SandboxConfig {
    /// Fails before any command runs when credentials or the zone are missing.
    pub fn validate(&self) -> Result<(), ExecutorError> {
        let mut missing = Vec::new();
        if self.access_token.trim().is_empty() {
            missing.push(ENV_ACCESS_TOKEN);
        }
        if self.access_token_secret.trim().is_empty() {
            missing.push(ENV_ACCESS_TOKEN_SECRET);
        }
        if !missing.is_empty() {
            return Err(ExecutorError::Config(format!(
                "missing credentials: {}",
                missing.join(", ")
            )));
        }
        if self.zone.trim().is_empty() {
            return Err(ExecutorError::Config("sandbox zone is not set".to_string()));
        }
        if self.cli_name.trim().is_empty() {
            return Err(ExecutorError::Config("cli_name is not set".to_string()));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn inter_command_delay(&self) -> Duration {
        Duration::from_millis(self.inter_command_delay_ms)
    }

    /// Environment handed to spawned commands.
    pub fn envs(&self) -> HashMap<String, String> {
        let mut envs = self.extra_envs.clone();
        envs.insert(ENV_ACCESS_TOKEN.to_string(), self.access_token.clone());
        envs.insert(
            ENV_ACCESS_TOKEN_SECRET.to_string(),
            self.access_token_secret.clone(),
        );
        envs.insert(ENV_ZONE.to_string(), self.zone.clone());
        envs
    }
}
