use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ExecutorError;

/// Failure category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    Timeout,
    Network,
    Auth,
    Permission,
    ResourceNotFound,
    CommandSyntax,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::Network => "network",
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::ResourceNotFound => "resource-not-found",
            ErrorKind::CommandSyntax => "command-syntax",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Transient kinds are worth another attempt; the rest need a human.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Network | ErrorKind::Unknown
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure. Never mutated once the classifier hands it out.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnosis {
    pub kind: ErrorKind,
    /// Human readable summary, including the raw error text.
    pub message: String,
    /// Command that produced the failure.
    pub command: String,
    pub timestamp: DateTime<Utc>,
    pub retryable: bool,
    /// Remediation hints, most useful first.
    pub suggestions: Vec<String>,
    pub context: BTreeMap<String, String>,
    /// The original error, kept for `source()` chains.
    #[serde(skip)]
    pub source: Option<Arc<ExecutorError>>,
}

impl Diagnosis {
    pub fn new(kind: ErrorKind, message: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            command: command.into(),
            timestamp: Utc::now(),
            retryable: kind.is_retryable(),
            suggestions: Vec::new(),
            context: BTreeMap::new(),
            source: None,
        }
    }

    pub fn with_suggestions<I, S>(mut self, suggestions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.suggestions = suggestions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_source(mut self, source: ExecutorError) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Multi-line rendering used by the text output: message followed by
    /// numbered suggestions.
    pub fn report(&self) -> String {
        let mut out = format!("[{}] {}", self.kind, self.message);
        for (i, s) in self.suggestions.iter().enumerate() {
            out.push_str(&format!("\n  {}. {}", i + 1, s));
        }
        out
    }
}

impl fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl std::error::Error for Diagnosis {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn retryable_flag_follows_kind() {
        assert!(Diagnosis::new(ErrorKind::Timeout, "t", "c").retryable);
        assert!(Diagnosis::new(ErrorKind::Network, "n", "c").retryable);
        assert!(Diagnosis::new(ErrorKind::Unknown, "u", "c").retryable);
        assert!(!Diagnosis::new(ErrorKind::Auth, "a", "c").retryable);
        assert!(!Diagnosis::new(ErrorKind::Permission, "p", "c").retryable);
        assert!(!Diagnosis::new(ErrorKind::ResourceNotFound, "r", "c").retryable);
        assert!(!Diagnosis::new(ErrorKind::CommandSyntax, "s", "c").retryable);
    }

    #[test]
    fn source_exposes_wrapped_error() {
        let d = Diagnosis::new(ErrorKind::Unknown, "boom", "usacloud server list")
            .with_source(ExecutorError::Other("boom".into()));
        let src = d.source().map(|e| e.to_string());
        assert_eq!(src.as_deref(), Some("boom"));
    }

    #[test]
    fn report_numbers_suggestions() {
        let d = Diagnosis::new(ErrorKind::Auth, "bad token", "usacloud server list")
            .with_suggestions(["check API credentials", "re-issue the token"]);
        assert_eq!(
            d.report(),
            "[auth] bad token\n  1. check API credentials\n  2. re-issue the token"
        );
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let v = serde_json::to_value(ErrorKind::ResourceNotFound).unwrap();
        assert_eq!(v, serde_json::json!("resource-not-found"));
    }
}
