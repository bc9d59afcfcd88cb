//! idae - run Python scripts with inline dependencies
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use idae::cli::{Cli, Commands};
use idae::config::{Config, ConfigManager, LogFormat};
use idae::error::IdaeResult;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

/// Process exit codes are a single byte
fn exit_code(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}

async fn run() -> IdaeResult<i32> {
    let cli = Cli::parse();

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    tracing::debug!("Loaded configuration from {}", config_manager.path().display());

    match cli.command {
        Commands::Run(args) => idae::cli::commands::run(args, &config).await,
        Commands::Clean(args) => idae::cli::commands::clean(args, &config).await.map(|()| 0),
    }
}

/// 0 = warn (spinners only), 1 = info, 2+ = debug. Always on stderr.
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("idae=warn"),
        1 => EnvFilter::new("idae=info"),
        _ => EnvFilter::new("idae=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    match config.general.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
