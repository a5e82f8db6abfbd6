pub mod process;

pub use process::TokioProcessRunner;
