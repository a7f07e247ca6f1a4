//! Kaiwa - Gemini chat assistant CLI
//!
#![doc = "Kaiwa - Gemini chat assistant CLI"]
#![doc = "Main entry point for the Kaiwa application."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kaiwa::cli::{Cli, Commands};
use kaiwa::commands;
use kaiwa::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load configuration
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(&config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    // Execute command
    match cli.command {
        Commands::Chat { session } => {
            tracing::info!("Starting interactive chat");
            if let Some(s) = &session {
                tracing::debug!("Resuming conversation: {}", s);
            }
            commands::chat::run_chat(config, session).await
        }
        Commands::Ask { prompt, stream } => {
            tracing::debug!("One-shot prompt (stream={})", stream);
            commands::ask::run_ask(&config, &prompt, stream).await
        }
        Commands::Sessions { command } => commands::sessions::handle_sessions(&config, command),
        Commands::Models { command } => commands::models::handle_models(&config, command).await,
    }
}

/// Default configuration file location
fn default_config_path() -> String {
    "config/config.yaml".to_string()
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kaiwa=info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
