//! Safety gate for sandbox commands: must target the managed CLI, must not
//! name a production zone, must not run a destructive operation. Commands
//! that pass get their zone forced to the sandbox zone.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::ExecutorError;

/// Operations never executed, even in the sandbox.
pub const DESTRUCTIVE_OPERATIONS: &[&str] = &[
    "delete", "shutdown", "reset", "power-off", "poweroff", "boot", "reboot",
];

const ZONE_FLAG: &str = "--zone";

lazy_static! {
    static ref NEEDS_QUOTING: Regex = Regex::new(r#"[\s'"\\$`;&|<>(){}*?!#]"#).unwrap();
}

/// Split a command segment into words, honouring single quotes, double
/// quotes and backslash escapes.
pub fn tokenize(command: &str) -> Result<Vec<String>, ExecutorError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated('\'')),
                    }
                }
            }
            '"' => {
                in_token = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.next() {
                            Some(ch) => current.push(ch),
                            None => return Err(unterminated('"')),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err(unterminated('"')),
                    }
                }
            }
            '\\' => {
                in_token = true;
                if let Some(ch) = chars.next() {
                    current.push(ch);
                }
            }
            c if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                in_token = true;
                current.push(c);
            }
        }
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

fn unterminated(q: char) -> ExecutorError {
    ExecutorError::Safety(format!("unterminated {q} quote in command"))
}

/// Every zone named by `--zone X` / `--zone=X`. A trailing `--zone` with no
/// value yields an empty string.
pub fn zone_values(tokens: &[String]) -> Vec<String> {
    let mut zones = Vec::new();
    let mut iter = tokens.iter().skip(1);
    while let Some(tok) = iter.next() {
        if tok == ZONE_FLAG {
            zones.push(iter.next().cloned().unwrap_or_default());
        } else if let Some(v) = tok.strip_prefix("--zone=") {
            zones.push(v.to_string());
        }
    }
    zones
}

/// Reject commands that are not safe to run in the sandbox.
///
/// Checks, in order: the command starts with `cli_name`; any zone flag
/// names `sandbox_zone`; no word after the CLI name is a destructive
/// operation. Flag values are words too, so `--profile prod server delete`
/// is rejected wherever the operation lands.
pub fn validate_command(
    tokens: &[String],
    cli_name: &str,
    sandbox_zone: &str,
) -> Result<(), ExecutorError> {
    match tokens.first() {
        Some(first) if first == cli_name => {}
        Some(first) => {
            return Err(ExecutorError::Safety(format!(
                "command must start with '{cli_name}', got '{first}'"
            )))
        }
        None => return Err(ExecutorError::Safety("empty command".to_string())),
    }

    for zone in zone_values(tokens) {
        if zone != sandbox_zone {
            return Err(ExecutorError::Safety(format!(
                "zone '{zone}' is not the sandbox zone '{sandbox_zone}'"
            )));
        }
    }

    for word in positional_words(tokens) {
        let op = word.to_ascii_lowercase();
        if DESTRUCTIVE_OPERATIONS.contains(&op.as_str()) {
            return Err(ExecutorError::Safety(format!(
                "destructive operation '{op}' is not allowed"
            )));
        }
    }

    Ok(())
}

/// Every word after the CLI name that is not itself a flag. Values of
/// spaced flags are included; `--flag=value` tokens are not.
fn positional_words(tokens: &[String]) -> impl Iterator<Item = &String> {
    tokens.iter().skip(1).filter(|t| !t.starts_with('-'))
}

/// Force the zone to `sandbox_zone`, rewriting `--zone X` and `--zone=X`
/// or inserting `--zone=<sandbox>` right after the CLI name.
pub fn enforce_zone(tokens: &[String], sandbox_zone: &str) -> Vec<String> {
    let forced = format!("{ZONE_FLAG}={sandbox_zone}");
    let mut out = Vec::with_capacity(tokens.len() + 1);
    let mut found = false;
    let mut iter = tokens.iter().enumerate();

    while let Some((i, tok)) = iter.next() {
        if i > 0 && tok == ZONE_FLAG {
            iter.next();
            out.push(forced.clone());
            found = true;
        } else if i > 0 && tok.starts_with("--zone=") {
            out.push(forced.clone());
            found = true;
        } else {
            out.push(tok.clone());
        }
    }

    if !found {
        let at = out.len().min(1);
        out.insert(at, forced);
    }
    out
}

/// Join tokens back into a single shell-safe line.
pub fn render_command(tokens: &[String]) -> String {
    tokens
        .iter()
        .map(|t| {
            if t.is_empty() {
                "''".to_string()
            } else if NEEDS_QUOTING.is_match(t) {
                format!("'{}'", t.replace('\'', r"'\''"))
            } else {
                t.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLI: &str = "usacloud";
    const ZONE: &str = "tk1v";

    fn toks(s: &str) -> Vec<String> {
        tokenize(s).unwrap()
    }

    #[test]
    fn tokenize_handles_quotes_and_escapes() {
        assert_eq!(
            toks(r#"usacloud server create --name 'my server' --desc "a \"b\"" x\ y"#),
            vec![
                "usacloud", "server", "create", "--name", "my server", "--desc", "a \"b\"",
                "x y"
            ]
        );
        assert_eq!(toks("usacloud  ''  list"), vec!["usacloud", "", "list"]);
        assert!(matches!(
            tokenize("usacloud 'oops"),
            Err(ExecutorError::Safety(_))
        ));
    }

    #[test]
    fn rejects_other_programs() {
        let err = validate_command(&toks("aws ec2 describe-instances"), CLI, ZONE).unwrap_err();
        assert!(matches!(err, ExecutorError::Safety(_)));
    }

    #[test]
    fn rejects_foreign_zone_in_both_spellings() {
        assert!(validate_command(&toks("usacloud server list --zone is1a"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud server list --zone=is1a"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud server list --zone"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud server list --zone=tk1v"), CLI, ZONE).is_ok());
    }

    #[test]
    fn rejects_destructive_operations() {
        for op in DESTRUCTIVE_OPERATIONS {
            let cmd = format!("usacloud {op} --force mydisk");
            assert!(
                validate_command(&toks(&cmd), CLI, ZONE).is_err(),
                "{cmd} should be rejected"
            );
        }
        assert!(validate_command(&toks("usacloud server delete 1234"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud Server REBOOT"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud --zone tk1v server delete 1"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud --profile prod server delete 1234"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud -o json server shutdown 1234"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud --selector name=a disk delete"), CLI, ZONE).is_err());
        assert!(validate_command(&toks("usacloud server list --name=reboot"), CLI, ZONE).is_ok());
        assert!(validate_command(&toks("usacloud disk read --selector name=mydisk"), CLI, ZONE).is_ok());
    }

    #[test]
    fn enforce_zone_rewrites_or_inserts() {
        assert_eq!(
            render_command(&enforce_zone(&toks("usacloud disk read --selector name=mydisk"), ZONE)),
            "usacloud --zone=tk1v disk read --selector name=mydisk"
        );
        assert_eq!(
            render_command(&enforce_zone(&toks("usacloud server list --zone is1a -o json"), ZONE)),
            "usacloud server list --zone=tk1v -o json"
        );
        assert_eq!(
            render_command(&enforce_zone(&toks("usacloud server list --zone=is1a"), ZONE)),
            "usacloud server list --zone=tk1v"
        );
    }

    #[test]
    fn enforced_commands_always_carry_sandbox_zone() {
        for cmd in [
            "usacloud server list",
            "usacloud server list --zone is1b",
            "usacloud server list --zone=tk1a --zone is1a",
            "usacloud server list --zone",
        ] {
            let enforced = enforce_zone(&toks(cmd), ZONE);
            let zones = zone_values(&enforced);
            assert!(!zones.is_empty(), "{cmd}");
            assert!(zones.iter().all(|z| z == ZONE), "{cmd}: {zones:?}");
            assert!(enforced.iter().all(|t| !t.contains("is1") && !t.contains("tk1a")));
        }
    }

    #[test]
    fn render_quotes_special_words() {
        assert_eq!(
            render_command(&["usacloud".into(), "my server".into(), "it's".into()]),
            r#"usacloud 'my server' 'it'\''s'"#
        );
    }
}
