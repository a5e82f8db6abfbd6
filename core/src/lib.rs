pub mod api;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod runner;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
