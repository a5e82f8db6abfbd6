pub mod renderer;
pub mod runner;

pub use renderer::*;
pub use runner::*;
