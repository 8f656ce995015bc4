//! Configuration management for bearer-policy
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::cache::{DEFAULT_REFRESH_WINDOW_SECONDS, MAX_REFRESH_WINDOW_SECONDS};
use crate::cli::{Cli, Commands};
use crate::error::{AuthError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Log levels accepted by `logging.level`.
pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for bearer-policy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Authorization policy settings
    #[serde(default)]
    pub policy: PolicyConfig,

    /// HTTP transport settings
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Authorization policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Scopes requested for every token
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Allow tokens to be sent to plain `http` endpoints
    #[serde(default)]
    pub allow_insecure_transport: bool,

    /// Seconds before expiration at which a cached token is refreshed early;
    /// zero disables early refresh
    #[serde(default = "default_refresh_window_seconds")]
    pub refresh_window_seconds: i64,
}

fn default_refresh_window_seconds() -> i64 {
    DEFAULT_REFRESH_WINDOW_SECONDS
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            scopes: Vec::new(),
            allow_insecure_transport: false,
            refresh_window_seconds: default_refresh_window_seconds(),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit logs as JSON lines
    #[serde(default)]
    pub json_format: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI
    ///
    /// A missing file is not an error: defaults are used instead.
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the YAML configuration file
    /// * `cli` - Parsed command line, applied last
    ///
    /// # Errors
    ///
    /// Returns error if the file exists but cannot be read or parsed
    pub fn load(path: &str, cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::debug!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Parse configuration from a YAML file
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AuthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(scopes) = std::env::var("BEARER_POLICY_SCOPES") {
            self.policy.scopes = scopes
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        if let Ok(allow) = std::env::var("BEARER_POLICY_ALLOW_INSECURE") {
            match allow.to_lowercase().as_str() {
                "1" | "true" | "yes" => self.policy.allow_insecure_transport = true,
                "0" | "false" | "no" => self.policy.allow_insecure_transport = false,
                _ => tracing::warn!("Invalid BEARER_POLICY_ALLOW_INSECURE: {}", allow),
            }
        }

        if let Ok(window) = std::env::var("BEARER_POLICY_REFRESH_WINDOW_SECONDS") {
            if let Ok(value) = window.parse() {
                self.policy.refresh_window_seconds = value;
            } else {
                tracing::warn!("Invalid BEARER_POLICY_REFRESH_WINDOW_SECONDS: {}", window);
            }
        }

        if let Ok(timeout) = std::env::var("BEARER_POLICY_TIMEOUT_SECONDS") {
            if let Ok(value) = timeout.parse() {
                self.transport.timeout_seconds = value;
            } else {
                tracing::warn!("Invalid BEARER_POLICY_TIMEOUT_SECONDS: {}", timeout);
            }
        }

        if let Ok(level) = std::env::var("BEARER_POLICY_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            self.logging.level = "debug".to_string();
        }
        if cli.json_logs {
            self.logging.json_format = true;
        }

        if let Commands::Get {
            scope,
            allow_insecure,
            ..
        } = &cli.command
        {
            if !scope.is_empty() {
                self.policy.scopes = scope.clone();
            }
            if *allow_insecure {
                self.policy.allow_insecure_transport = true;
            }
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if a scope is empty, the refresh window is negative or
    /// longer than a day, the timeout is zero, or the log level is unknown
    pub fn validate(&self) -> Result<()> {
        if self.policy.scopes.iter().any(|s| s.trim().is_empty()) {
            return Err(AuthError::Config(
                "policy.scopes cannot contain empty values".to_string(),
            )
            .into());
        }

        if !(0..=MAX_REFRESH_WINDOW_SECONDS).contains(&self.policy.refresh_window_seconds) {
            return Err(AuthError::Config(format!(
                "policy.refresh_window_seconds must be between 0 and {}",
                MAX_REFRESH_WINDOW_SECONDS
            ))
            .into());
        }

        if self.transport.timeout_seconds == 0 {
            return Err(AuthError::Config(
                "transport.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(AuthError::Config(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                VALID_LOG_LEVELS.join(", ")
            ))
            .into());
        }

        Ok(())
    }
}
