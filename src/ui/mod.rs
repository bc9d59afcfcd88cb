//! Terminal progress output
//!
//! Uses `cliclack` spinners and `indicatif` bars in interactive terminals,
//! with plain stderr lines in CI/non-interactive environments.

mod context;
mod progress;

pub use context::UiContext;
pub use progress::{BuildProgress, TaskSpinner};
