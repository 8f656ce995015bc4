//! bearer-policy - Bearer token authorization CLI
//!
#![doc = "Main entry point for the bearer-policy command line tool."]

use anyhow::Result;

use bearer_policy::cli::{Cli, Commands};
use bearer_policy::commands;
use bearer_policy::config::Config;
use bearer_policy::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    // Load and validate configuration before logging so the configured
    // level applies from the first event
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;
    config.validate()?;

    init_logging(&config.logging)?;

    match cli.command {
        Commands::Challenge { values } => {
            tracing::debug!("Parsing {} challenge value(s)", values.len());
            commands::challenge::run_challenge(values)?;
            Ok(())
        }
        Commands::Get {
            url,
            token_env,
            expires_in,
            ..
        } => {
            tracing::debug!("Reading token from {}", token_env);
            commands::get::run_get(config, url, token_env, expires_in).await?;
            Ok(())
        }
    }
}
