use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`crate::runner::ProcessRunner`].
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("failed to spawn '{program}': {message}")]
    Spawn { program: String, message: String },

    #[error("process timed out after {0:?}")]
    TimedOut(Duration),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
