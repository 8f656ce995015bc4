//! Command handlers for bearer-policy
//!
//! Each submodule implements one CLI subcommand.

/// `challenge` command: parse `WWW-Authenticate` values and report them
pub mod challenge {
    use serde::Serialize;

    use crate::challenge::{parse_challenges, parse_step_up_challenge, AuthChallenge};
    use crate::error::Result;

    /// What the policy would see in a set of `WWW-Authenticate` values.
    #[derive(Debug, Clone, Serialize)]
    pub struct ChallengeReport {
        /// Every challenge the parser recognized, in header order
        pub challenges: Vec<AuthChallenge>,
        /// Whether the parser consumed the values completely
        pub exhaustive: bool,
        /// Number of Bearer challenges, counted from raw text when parsing
        /// was not exhaustive
        pub bearer_count: usize,
        /// The step-up challenge the policy would answer, claims decoded
        pub step_up: Option<AuthChallenge>,
    }

    /// Builds the report for `values`.
    ///
    /// # Errors
    ///
    /// Returns an error if a step-up challenge carries invalid claims.
    pub fn inspect(values: &[String]) -> Result<ChallengeReport> {
        let parsed = parse_challenges(values);
        let summary = parse_step_up_challenge(values)?;
        Ok(ChallengeReport {
            challenges: parsed.challenges,
            exhaustive: parsed.exhaustive,
            bearer_count: summary.bearer_count,
            step_up: summary.step_up,
        })
    }

    /// Prints the report for `values` as pretty JSON on stdout.
    pub fn run_challenge(values: Vec<String>) -> Result<()> {
        let report = inspect(&values)?;
        tracing::debug!(
            challenges = report.challenges.len(),
            exhaustive = report.exhaustive,
            "Parsed challenges"
        );
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

}

/// `get` command: send an authorized GET request
pub mod get {
    use std::sync::Arc;

    use reqwest::Method;
    use tokio_util::sync::CancellationToken;
    use url::Url;

    use crate::config::Config;
    use crate::credential::{EnvironmentCredential, TokenCredential};
    use crate::error::{AuthError, Result};
    use crate::pipeline::http::HttpTransport;
    use crate::pipeline::{Request, Response, Transport};
    use crate::policy::{AuthorizationHandler, AuthorizationPolicy, AuthorizedTransport};

    /// Builds the authorized transport described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build_transport(
        config: &Config,
        token_env: &str,
        expires_in: i64,
    ) -> Result<AuthorizedTransport> {
        let credential: Arc<dyn TokenCredential> = Arc::new(EnvironmentCredential::new(
            token_env,
            chrono::Duration::seconds(expires_in),
        ));
        let policy = AuthorizationPolicy::from_config(
            Some(credential),
            &config.policy,
            AuthorizationHandler::default(),
        );
        let http = HttpTransport::new(std::time::Duration::from_secs(
            config.transport.timeout_seconds,
        ))?;
        Ok(AuthorizedTransport::new(Arc::new(policy), Arc::new(http)))
    }

    /// Sends `GET url` through the policy and returns the response.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the request fails.
    pub async fn fetch(
        config: &Config,
        url: &str,
        token_env: &str,
        expires_in: i64,
        cancel: CancellationToken,
    ) -> Result<Response> {
        let url = Url::parse(url)
            .map_err(|e| AuthError::Config(format!("Invalid URL {}: {}", url, e)))?;
        let transport = build_transport(config, token_env, expires_in)?;
        tracing::info!(
            scopes = ?transport.policy().scopes(),
            "Sending GET {}",
            url
        );
        let request = Request::new(Method::GET, url).with_cancellation(cancel);
        transport.send(&request).await
    }

    /// Runs the command, printing the status line and body on stdout.
    ///
    /// Ctrl-C cancels the request.
    pub async fn run_get(
        config: Config,
        url: String,
        token_env: String,
        expires_in: i64,
    ) -> Result<()> {
        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted; cancelling request");
                on_signal.cancel();
            }
        });

        let response = fetch(&config, &url, &token_env, expires_in, cancel).await?;
        println!("HTTP {}", response.status);
        if !response.body.is_empty() {
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        Ok(())
    }
}
