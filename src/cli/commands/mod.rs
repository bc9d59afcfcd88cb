//! CLI command implementations

pub mod clean;
pub mod run;

pub use clean::execute as clean;
pub use run::execute as run;
