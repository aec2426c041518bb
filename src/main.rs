//! AIOrg - streaming chat with a locally hosted language model
//!
#![doc = "AIOrg - streaming chat CLI"]
#![doc = "Main entry point for the AIOrg application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use aiorg::cli::{Cli, Commands};
use aiorg::commands;
use aiorg::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Initialize tracing
    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;
    tracing::debug!(
        "Using model server {} with model {}",
        config.ollama.host,
        config.ollama.model
    );

    // Execute command
    match cli.command {
        Commands::Chat => {
            commands::chat::run_chat(config).await?;
            Ok(())
        }
        Commands::Ask { prompt } => {
            tracing::info!("Starting one-shot question");
            commands::ask::run_ask(config, prompt).await?;
            Ok(())
        }
        Commands::Status => {
            commands::status::run_status(config).await?;
            Ok(())
        }
        Commands::Models { json } => {
            tracing::info!("Starting model listing");
            commands::models::list_models(&config, json).await?;
            Ok(())
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "aiorg=debug" } else { "aiorg=info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
