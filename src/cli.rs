//! Command-line interface for bearer-policy
//!
//! This module defines the CLI structure using clap's derive API.

use clap::{Parser, Subcommand};

use crate::credential::DEFAULT_TOKEN_ENV_VAR;

/// bearer-policy - Bearer token authorization with challenge handling
///
/// Inspect `WWW-Authenticate` challenges and send authorized requests that
/// answer step-up challenges automatically.
#[derive(Parser, Debug, Clone)]
#[command(name = "bearer-policy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for bearer-policy
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Parse WWW-Authenticate header values and print the result as JSON
    Challenge {
        /// Header values, one per WWW-Authenticate occurrence
        #[arg(required = true)]
        values: Vec<String>,
    },

    /// Send an authorized GET request and print the response
    Get {
        /// Target URL
        url: String,

        /// Scope to request (repeatable); overrides configured scopes
        #[arg(short, long)]
        scope: Vec<String>,

        /// Allow sending the token over plain http
        #[arg(long)]
        allow_insecure: bool,

        /// Environment variable holding the bearer token
        #[arg(long, default_value = DEFAULT_TOKEN_ENV_VAR)]
        token_env: String,

        /// Lifetime assumed for the token, in seconds
        #[arg(long, default_value_t = 3600)]
        expires_in: i64,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
