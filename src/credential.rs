//! Credential contract consumed by the authorization policy
//!
//! The policy never mints tokens itself. It asks a [`TokenCredential`] for
//! one through the single-flight cache, so implementations need not
//! deduplicate concurrent calls but must be safe to call from many tasks.
//!
//! Two simple implementations are provided:
//!
//! - [`StaticTokenCredential`] -- always returns the same token.
//! - [`EnvironmentCredential`] -- reads the token from an environment
//!   variable on every acquisition (used by the CLI).

use std::fmt;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, Result};
use crate::token::{AccessToken, TokenRequestOptions};

/// Environment variable read by [`EnvironmentCredential::default`].
pub const DEFAULT_TOKEN_ENV_VAR: &str = "BEARER_POLICY_TOKEN";

/// A source of bearer tokens.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use bearer_policy::credential::TokenCredential;
/// use bearer_policy::token::{AccessToken, TokenRequestOptions};
/// use chrono::{Duration, Utc};
/// use tokio_util::sync::CancellationToken;
///
/// #[derive(Debug)]
/// struct Fixed;
///
/// #[async_trait]
/// impl TokenCredential for Fixed {
///     async fn get_token(
///         &self,
///         _options: &TokenRequestOptions,
///         _cancel: &CancellationToken,
///     ) -> bearer_policy::Result<AccessToken> {
///         Ok(AccessToken::new("fixed", Utc::now() + Duration::hours(1)))
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait TokenCredential: Send + Sync + fmt::Debug {
    /// Acquires a token satisfying `options`.
    ///
    /// `cancel` is the cancellation token of the caller that triggered the
    /// acquisition; implementations should stop early when it fires.
    ///
    /// # Errors
    ///
    /// Returns whatever error the underlying identity provider produced.
    async fn get_token(
        &self,
        options: &TokenRequestOptions,
        cancel: &CancellationToken,
    ) -> Result<AccessToken>;
}

/// A credential that always returns the same token.
#[derive(Debug, Clone)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    /// Creates a credential returning `token` for every request.
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait::async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(
        &self,
        _options: &TokenRequestOptions,
        _cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        Ok(self.token.clone())
    }
}

/// A credential that reads the token from an environment variable.
///
/// The variable is read on every acquisition, so rotating it takes effect
/// the next time the policy's cached token expires or is invalidated.
/// Tokens are stamped as expiring `lifetime` after they are read.
#[derive(Debug, Clone)]
pub struct EnvironmentCredential {
    var: String,
    lifetime: Duration,
}

impl EnvironmentCredential {
    /// Creates a credential reading `var`, with tokens valid for `lifetime`.
    pub fn new(var: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            var: var.into(),
            lifetime,
        }
    }

    /// Name of the environment variable this credential reads.
    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvironmentCredential {
    fn default() -> Self {
        Self::new(DEFAULT_TOKEN_ENV_VAR, Duration::hours(1))
    }
}

#[async_trait::async_trait]
impl TokenCredential for EnvironmentCredential {
    async fn get_token(
        &self,
        options: &TokenRequestOptions,
        _cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        let token = std::env::var(&self.var).map_err(|_| {
            AuthError::Acquisition(format!("environment variable {} is not set", self.var))
        })?;
        if token.trim().is_empty() {
            return Err(
                AuthError::Acquisition(format!("environment variable {} is empty", self.var))
                    .into(),
            );
        }
        if options.claims.is_some() {
            tracing::warn!(
                "{} cannot satisfy step-up claims; returning the configured token",
                self.var
            );
        }
        Ok(AccessToken::new(token.trim(), Utc::now() + self.lifetime))
    }
}
