//! Wharf CLI - Main entry point

use clap::Parser;
use std::process;
use tracing::error;
use wharf_cli::{Cli, Commands};
use wharf_core::logging::{init_logging, LogConfig, LogLevel};

#[tokio::main]
async fn main() {
    // Load .env for local development before anything reads the environment
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Verbose flag lowers the console threshold; environment variables
    // still take precedence.
    let log_config = if cli.verbose {
        LogConfig::new().with_level(LogLevel::Debug)
    } else {
        LogConfig::new().with_level(LogLevel::Warn)
    };
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    // The CLI should keep working even if logging cannot initialize
    let _ = init_logging(&log_config);

    let result = execute_command(cli).await;

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Execute the CLI command
async fn execute_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Transfer(args) => wharf_cli::commands::transfer::run(args).await,
        Commands::Jsonpaths { file, index } => {
            wharf_cli::commands::jsonpaths::run(&file, index)
        }
        Commands::CreateUser(args) => wharf_cli::commands::create_user::run(args).await,
    }
}
