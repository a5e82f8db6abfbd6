#[allow(clippy::module_inception)]
pub mod error;
pub mod executor;
pub mod process;

pub use error::{CliError, RunnerError};
pub use executor::{ErrorCode, ExecutorError};
pub use process::ProcessError;
