//! idae - run Python scripts with inline dependency metadata
//!
//! Reads the `# /// script` block of a script, finds a matching
//! interpreter, builds or reuses a content-addressed virtual environment
//! and relays the script's terminal session.

pub mod cli;
pub mod config;
pub mod deps;
pub mod error;
pub mod metadata;
pub mod python;
pub mod relay;
pub mod ui;
pub mod venv;

pub use error::{IdaeError, IdaeResult};
