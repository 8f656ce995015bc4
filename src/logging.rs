//! Structured logging setup
//!
//! Provides JSON-formatted and human-readable logging on stderr, leaving
//! stdout to command output. `RUST_LOG` overrides the configured level.

use crate::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize logging based on configuration.
///
/// # Errors
///
/// Returns error if the level is not a valid filter directive or a global
/// subscriber is already installed.
///
/// # Examples
///
/// ```no_run
/// use bearer_policy::config::LoggingConfig;
/// use bearer_policy::logging::init_logging;
///
/// let config = LoggingConfig {
///     level: "debug".to_string(),
///     json_format: true,
/// };
/// init_logging(&config).unwrap();
/// ```
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(env_filter);

    if config.json_format {
        let layer = fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()?;
    } else {
        let layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_writer(std::io::stderr);
        registry.with(layer).try_init()?;
    }

    Ok(())
}

fn build_filter(level: &str) -> Result<EnvFilter> {
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?)
}
