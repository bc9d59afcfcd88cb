//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// idae - run Python scripts with inline dependencies
///
/// Reads the `# /// script` block of a script, builds (or reuses) a cached
/// virtual environment with those dependencies and runs the script in it.
#[derive(Parser, Debug)]
#[command(name = "idae")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "IDAE_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a script in its cached environment
    Run(RunArgs),

    /// Delete cached environments
    Clean(CleanArgs),
}

/// Where environments are cached
#[derive(Args, Debug, Clone, Default)]
pub struct CacheLocationArgs {
    /// Use a cache directory under the current working directory
    #[arg(long)]
    pub local: bool,

    /// Cache directory to use instead of the default
    #[arg(long, env = "IDAE_CACHE_DIR", value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Extra interpreter flags, split like a shell would (repeatable)
    #[arg(long = "python-flags", value_name = "FLAGS", allow_hyphen_values = true)]
    pub python_flags: Vec<String>,

    /// Ignore the script's requires-python and use the default interpreter
    #[arg(short, long)]
    pub ignore_version: bool,

    /// Use this version constraint instead of the script's
    #[arg(short, long, value_name = "VERSION", conflicts_with = "ignore_version")]
    pub force_version: Option<String>,

    /// Delete the cache before running
    #[arg(long)]
    pub clean: bool,

    #[command(flatten)]
    pub cache: CacheLocationArgs,

    /// Script to run
    pub script: PathBuf,

    /// Arguments passed to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

/// Arguments for the clean command
#[derive(Parser, Debug)]
pub struct CleanArgs {
    #[command(flatten)]
    pub cache: CacheLocationArgs,
}
