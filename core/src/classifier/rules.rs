//! Ordered substring rules that turn raw error text into a [`Diagnosis`].
//!
//! Matching is heuristic: vendor specific wording can land in the wrong
//! bucket, and anything unmatched falls through to `unknown`.

use crate::error::ExecutorError;

use super::diagnosis::{Diagnosis, ErrorKind};

struct Rule {
    kind: ErrorKind,
    summary: &'static str,
    patterns: &'static [&'static str],
    suggestions: &'static [&'static str],
}

// Evaluated top to bottom; first hit wins.
const RULES: &[Rule] = &[
    Rule {
        kind: ErrorKind::Timeout,
        summary: "command timed out",
        patterns: &["timeout", "timed out", "deadline exceeded"],
        suggestions: &[
            "retry the command; the sandbox API may be slow",
            "increase the per-command timeout",
            "check the sandbox service status",
        ],
    },
    Rule {
        kind: ErrorKind::Network,
        summary: "network error",
        patterns: &[
            "connection refused",
            "connection reset",
            "network",
            "no such host",
            "dns",
            "unreachable",
            "broken pipe",
            "tls handshake",
            "unexpected eof",
        ],
        suggestions: &[
            "check network connectivity",
            "verify proxy and firewall settings",
            "retry after a short wait",
        ],
    },
    Rule {
        kind: ErrorKind::Auth,
        summary: "authentication failed",
        patterns: &[
            "unauthorized",
            "authentication",
            "invalid token",
            "access token",
            "credential",
        ],
        suggestions: &[
            "check API credentials",
            "confirm the access token and secret belong to the sandbox account",
            "re-issue the API key if it was revoked",
        ],
    },
    Rule {
        kind: ErrorKind::Permission,
        summary: "permission denied",
        patterns: &[
            "forbidden",
            "permission denied",
            "access denied",
            "not allowed",
            "insufficient privilege",
        ],
        suggestions: &[
            "check the API key's permission level",
            "confirm the operation is allowed in the sandbox zone",
        ],
    },
    Rule {
        kind: ErrorKind::ResourceNotFound,
        summary: "resource not found",
        patterns: &["not found", "no such", "does not exist"],
        suggestions: &[
            "verify resource exists in this zone",
            "check the resource ID or selector",
            "list resources to confirm the name",
        ],
    },
    Rule {
        kind: ErrorKind::CommandSyntax,
        summary: "invalid command syntax",
        patterns: &[
            "unknown command",
            "unknown flag",
            "unknown shorthand flag",
            "invalid argument",
            "invalid value",
            "required flag",
            "usage:",
            "syntax error",
        ],
        suggestions: &[
            "check the command syntax with --help",
            "re-run the rewriting step for this line",
        ],
    },
];

/// Display prefixes of the errors raised before a process is spawned.
const SAFETY_PREFIX: &str = "safety validation failed:";
const CONFIG_PREFIX: &str = "configuration error:";

struct Rejection {
    prefix: &'static str,
    /// Empty matches any message under `prefix`.
    needle: &'static str,
    kind: ErrorKind,
    suggestions: &'static [&'static str],
}

// Checked ahead of RULES: a rejected line can mention words like "token"
// or "not allowed" that the runtime rules key on.
const REJECTIONS: &[Rejection] = &[
    Rejection {
        prefix: SAFETY_PREFIX,
        needle: "destructive operation",
        kind: ErrorKind::Permission,
        suggestions: &[
            "destructive operations are never executed in the sandbox; run them manually",
            "remove the line or mark it [manual] in the input",
        ],
    },
    Rejection {
        prefix: SAFETY_PREFIX,
        needle: "zone",
        kind: ErrorKind::Permission,
        suggestions: &[
            "set --zone to the sandbox zone or omit it",
            "the sandbox zone is inserted when --zone is absent",
        ],
    },
    Rejection {
        prefix: SAFETY_PREFIX,
        needle: "",
        kind: ErrorKind::CommandSyntax,
        suggestions: &[
            "only lines that start with the managed CLI are executed",
            "check the line's quoting",
        ],
    },
    Rejection {
        prefix: CONFIG_PREFIX,
        needle: "credentials",
        kind: ErrorKind::Auth,
        suggestions: &[
            "set SAKURACLOUD_ACCESS_TOKEN and SAKURACLOUD_ACCESS_TOKEN_SECRET",
            "or set access_token and access_token_secret under [sandbox] in config.toml",
        ],
    },
    Rejection {
        prefix: CONFIG_PREFIX,
        needle: "",
        kind: ErrorKind::Unknown,
        suggestions: &[
            "set zone and cli_name under [sandbox] in config.toml",
            "or export SANDRUN_ZONE",
        ],
    },
];

const UNKNOWN_SUGGESTIONS: &[&str] = &[
    "inspect the command output for details",
    "retry the command",
    "run with debug enabled for more context",
];

/// Classify an error raised while running `command`.
///
/// Total: every error maps to exactly one diagnosis, `unknown` when no rule
/// matches. The original error is kept as the diagnosis source.
pub fn classify(err: ExecutorError, command: &str) -> Diagnosis {
    let raw = err.to_string();
    classify_message(&raw, command).with_source(err)
}

/// Classify raw error text.
pub fn classify_message(raw: &str, command: &str) -> Diagnosis {
    let lowered = raw.to_lowercase();

    if let Some(d) = rejection(raw, &lowered, command) {
        return d;
    }

    for rule in RULES {
        if let Some(pattern) = rule.patterns.iter().find(|p| lowered.contains(*p)) {
            tracing::debug!(kind = %rule.kind, pattern, "classified failure");
            return Diagnosis::new(rule.kind, format!("{}: {}", rule.summary, raw), command)
                .with_suggestions(rule.suggestions.iter().copied())
                .with_context("matched_pattern", *pattern)
                .with_context("raw_error", raw);
        }
    }

    Diagnosis::new(ErrorKind::Unknown, format!("unknown error: {raw}"), command)
        .with_suggestions(UNKNOWN_SUGGESTIONS.iter().copied())
        .with_context("raw_error", raw)
}

/// Safety and configuration rejections are never retryable, whatever
/// kind they are filed under.
fn rejection(raw: &str, lowered: &str, command: &str) -> Option<Diagnosis> {
    let hit = REJECTIONS
        .iter()
        .find(|r| lowered.starts_with(r.prefix) && lowered.contains(r.needle))?;
    tracing::debug!(kind = %hit.kind, prefix = hit.prefix, "classified rejection");

    let mut d = Diagnosis::new(hit.kind, raw, command)
        .with_suggestions(hit.suggestions.iter().copied())
        .with_context("rejected_by", hit.prefix.trim_end_matches(':'))
        .with_context("raw_error", raw);
    d.retryable = false;
    Some(d)
}
