//! Error classification: raw failures in, typed [`Diagnosis`] out.

mod diagnosis;
mod recommend;
mod rules;

pub use diagnosis::{Diagnosis, ErrorKind};
pub use recommend::recommend;
pub use rules::{classify, classify_message};
