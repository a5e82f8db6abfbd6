use std::time::Duration;

use thiserror::Error;

use crate::classifier::{Diagnosis, ErrorKind};

/// Numeric error codes surfaced in rendered output and exit statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    Success = 0,
    GeneralError = 1,
    ConfigError = 2,
    SafetyViolation = 3,
    CommandSyntax = 10,
    ResourceNotFound = 11,
    Timeout = 30,
    Cancelled = 31,
    NetworkError = 40,
    AuthError = 41,
    PermissionDenied = 51,
}

impl ErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl From<ErrorKind> for ErrorCode {
    fn from(kind: ErrorKind) -> Self {
        match kind {
            ErrorKind::Timeout => ErrorCode::Timeout,
            ErrorKind::Network => ErrorCode::NetworkError,
            ErrorKind::Auth => ErrorCode::AuthError,
            ErrorKind::Permission => ErrorCode::PermissionDenied,
            ErrorKind::ResourceNotFound => ErrorCode::ResourceNotFound,
            ErrorKind::CommandSyntax => ErrorCode::CommandSyntax,
            ErrorKind::Unknown => ErrorCode::GeneralError,
        }
    }
}

/// Errors produced while validating, running or retrying a sandbox command.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("safety validation failed: {0}")]
    Safety(String),

    #[error("command timed out after {}s: {command}", timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },

    #[error("authentication failed: {message}")]
    Auth { message: String, output: String },

    #[error("resource not found: {message}")]
    NotFound { message: String, output: String },

    #[error("command failed{}: {message}", exit_suffix(*code))]
    CommandFailed {
        code: Option<i32>,
        message: String,
        output: String,
    },

    #[error("failed to spawn command: {0}")]
    Spawn(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("non-retryable error: {0}")]
    NonRetryable(Box<Diagnosis>),

    #[error("max attempts ({attempts}) exceeded: {last}")]
    MaxAttemptsExceeded { attempts: u32, last: Box<Diagnosis> },

    #[error("{0}")]
    Other(String),
}

fn exit_suffix(code: Option<i32>) -> String {
    match code {
        Some(c) => format!(" (exit code {c})"),
        None => String::new(),
    }
}

impl ExecutorError {
    /// Config, safety and cancellation errors are final: they never enter
    /// the retry loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Safety(_) | Self::Cancelled(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Captured process output, when the failure came from a finished process.
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Auth { output, .. }
            | Self::NotFound { output, .. }
            | Self::CommandFailed { output, .. } => Some(output.as_str()),
            _ => None,
        }
    }

    /// Diagnosis attached by the retrying executor, if any.
    pub fn diagnosis(&self) -> Option<&Diagnosis> {
        match self {
            Self::NonRetryable(d) => Some(d),
            Self::MaxAttemptsExceeded { last, .. } => Some(last),
            _ => None,
        }
    }

    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Safety(_) => ErrorCode::SafetyViolation,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Auth { .. } => ErrorCode::AuthError,
            Self::NotFound { .. } => ErrorCode::ResourceNotFound,
            Self::Cancelled(_) => ErrorCode::Cancelled,
            Self::NonRetryable(d) => d.kind.into(),
            Self::MaxAttemptsExceeded { last, .. } => last.kind.into(),
            Self::CommandFailed { .. } | Self::Spawn(_) | Self::Other(_) => {
                ErrorCode::GeneralError
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors_are_config_safety_and_cancellation() {
        assert!(ExecutorError::Config("x".into()).is_fatal());
        assert!(ExecutorError::Safety("x".into()).is_fatal());
        assert!(ExecutorError::Cancelled("x".into()).is_fatal());
        assert!(!ExecutorError::Spawn("x".into()).is_fatal());
        assert!(!ExecutorError::Timeout {
            command: "usacloud server list".into(),
            timeout: Duration::from_secs(1),
        }
        .is_fatal());
    }

    #[test]
    fn command_failed_display_includes_exit_code() {
        let err = ExecutorError::CommandFailed {
            code: Some(2),
            message: "boom".into(),
            output: "boom".into(),
        };
        assert_eq!(err.to_string(), "command failed (exit code 2): boom");
        assert_eq!(err.output(), Some("boom"));

        let err = ExecutorError::CommandFailed {
            code: None,
            message: "killed".into(),
            output: String::new(),
        };
        assert_eq!(err.to_string(), "command failed: killed");
    }

    #[test]
    fn timeout_display_mentions_timed_out() {
        let err = ExecutorError::Timeout {
            command: "usacloud server list".into(),
            timeout: Duration::from_millis(1500),
        };
        assert!(err.to_string().contains("timed out after 1.5s"));
        assert_eq!(err.error_code(), ErrorCode::Timeout);
    }
}
