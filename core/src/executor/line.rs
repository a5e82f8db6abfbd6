//! Per-line triage: what to skip, and which segment of a compound shell
//! line to run.

/// Markers the rewriting stage leaves on lines it could not convert
/// automatically. Matched case-insensitively.
pub const MANUAL_MARKERS: &[&str] = &["# manual", "[manual]", "manual intervention"];

pub const REASON_EMPTY: &str = "empty line";
pub const REASON_COMMENT: &str = "comment line";
pub const REASON_MANUAL: &str = "requires manual intervention";
pub const REASON_NOTHING: &str = "nothing to execute";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    Skip(String),
    Execute(String),
}

/// Decide what to do with one input line.
pub fn classify_line(line: &str, cli_name: &str) -> LineAction {
    let trimmed = line.trim();

    if trimmed.is_empty() {
        return LineAction::Skip(REASON_EMPTY.to_string());
    }
    if trimmed.starts_with('#') {
        return LineAction::Skip(REASON_COMMENT.to_string());
    }

    let lowered = trimmed.to_lowercase();
    if MANUAL_MARKERS.iter().any(|m| lowered.contains(m)) {
        return LineAction::Skip(REASON_MANUAL.to_string());
    }

    if !mentions_cli(trimmed, cli_name) {
        return LineAction::Skip(format!("not a {cli_name} command"));
    }

    split_control_operators(trimmed)
        .into_iter()
        .map(|s| s.trim().to_string())
        .find(|segment| segment.split_whitespace().next() == Some(cli_name))
        .map(LineAction::Execute)
        .unwrap_or_else(|| LineAction::Skip(REASON_NOTHING.to_string()))
}

fn mentions_cli(line: &str, cli_name: &str) -> bool {
    line.split(|c: char| c.is_whitespace() || matches!(c, ';' | '&' | '|' | '(' | ')'))
        .any(|word| word == cli_name)
}

/// Split on `&&`, `||`, `;` and `|`, ignoring operators inside quotes.
pub fn split_control_operators(line: &str) -> Vec<String> {
    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    quote = None;
                } else if c == '\\' && q == '"' {
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
            }
            None => match c {
                '\'' | '"' => {
                    quote = Some(c);
                    current.push(c);
                }
                '\\' => {
                    current.push(c);
                    if let Some(next) = chars.next() {
                        current.push(next);
                    }
                }
                ';' => segments.push(std::mem::take(&mut current)),
                '&' if chars.peek() == Some(&'&') => {
                    chars.next();
                    segments.push(std::mem::take(&mut current));
                }
                '|' => {
                    if chars.peek() == Some(&'|') {
                        chars.next();
                    }
                    segments.push(std::mem::take(&mut current));
                }
                _ => current.push(c),
            },
        }
    }
    segments.push(current);

    segments
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect()
}
