//! Cached virtual environments

mod builder;
mod cache;

pub use builder::{env_python, CapturedOutput, EnvironmentBuilder, VenvBuilder};
pub use cache::{purge_root, EnvironmentCache};
