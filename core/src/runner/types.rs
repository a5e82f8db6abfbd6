use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Environment set on the child in addition to what it inherits.
    pub envs: HashMap<String, String>,
    pub timeout: Duration,
}

impl ProcessSpec {
    /// Program and args joined back into one line, for logs and results.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// None when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
    pub duration: Duration,
}
