//! Main entry point for the blessing service CLI

#![forbid(unsafe_code)]

use clap::Parser;
use dotenvy::dotenv;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blessing_service::cli::commands::{self, Commands};
use blessing_service::core::config::AppConfig;

/// Blessing Service - AI greeting generator with rate limiting
#[derive(Parser, Debug)]
#[command(name = "blessing-service", version, about, long_about = None)]
struct Args {
    /// Load configuration from a JSON file instead of the environment
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv().ok();

    let args = Args::parse();

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("blessing_service={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::from_env(),
    };

    // Execute command
    match args.command {
        Some(Commands::Server { host, port, debug }) => {
            commands::handle_server(config, host, port, debug).await?;
        }
        Some(Commands::Generate(blessing)) => {
            commands::handle_generate(config, blessing).await?;
        }
        Some(Commands::Prompt(blessing)) => {
            commands::handle_prompt(blessing)?;
        }
        None => {
            println!("Please specify a command. Use --help for more information.");
        }
    }

    Ok(())
}
