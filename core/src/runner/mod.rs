mod traits;
pub mod types;

pub use traits::ProcessRunner;
pub use types::{ProcessOutput, ProcessSpec};
