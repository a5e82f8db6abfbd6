use thiserror::Error;

use super::executor::ExecutorError;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("runner failed: {0}")]
    Runner(#[from] RunnerError),
    #[error("command failed: {0}")]
    Command(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("{failed} of {total} commands failed")]
    Failures { failed: usize, total: usize },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("config error: {0}")]
    Config(String),
    #[error("executor error: {0}")]
    Executor(#[from] ExecutorError),
    #[error("plugin error: {0}")]
    Plugin(String),
}

impl CliError {
    /// Process exit code for the binary.
    ///
    /// 11: config error, 20: runner / IO error, 30: one or more commands
    /// failed, 50: internal.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 11,
            CliError::Runner(re) => match re {
                RunnerError::Config(_) => 11,
                RunnerError::Executor(ExecutorError::Config(_)) => 11,
                RunnerError::Executor(_) => 20,
                RunnerError::Plugin(_) => 50,
            },
            CliError::Io(_) => 20,
            CliError::Command(_) => 20,
            CliError::Failures { .. } => 30,
            CliError::Anyhow(_) => 50,
        }
    }
}
