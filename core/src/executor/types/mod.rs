pub mod config;
pub mod job;
pub mod policy;
pub mod result;

pub use config::*;
pub use job::*;
pub use policy::*;
pub use result::*;
