//! Access tokens and token request options
//!
//! [`AccessToken`] is what a [`TokenCredential`](crate::credential::TokenCredential)
//! returns; [`TokenRequestOptions`] is what the policy asks it for.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A bearer token and the instant it stops being valid.
///
/// The `Debug` implementation redacts the token value so that tokens never
/// end up in logs.
///
/// # Examples
///
/// ```
/// use bearer_policy::token::AccessToken;
/// use chrono::{Duration, Utc};
///
/// let token = AccessToken::new("secret", Utc::now() + Duration::hours(1));
/// assert!(!token.is_expired());
/// assert!(!format!("{token:?}").contains("secret"));
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The opaque token string presented in the `Authorization` header.
    pub token: String,

    /// UTC timestamp at which the token expires.
    pub expires_on: DateTime<Utc>,
}

impl AccessToken {
    /// Creates a token expiring at `expires_on`.
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_on,
        }
    }

    /// Returns `true` when `expires_on` is at or before the current time.
    pub fn is_expired(&self) -> bool {
        self.expires_on <= Utc::now()
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Options handed to a credential for a single token acquisition.
///
/// A fresh value is built for every acquisition and is never modified once
/// passed to the credential.
///
/// # Examples
///
/// ```
/// use bearer_policy::token::TokenRequestOptions;
///
/// let options = TokenRequestOptions::new(vec!["api://default".to_string()])
///     .with_claims(r#"{"access_token":{"foo":1}}"#);
/// assert_eq!(options.scopes, vec!["api://default".to_string()]);
/// assert!(options.claims.is_some());
/// assert!(!options.enable_step_up);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRequestOptions {
    /// Permission scopes the token must carry, in order.
    pub scopes: Vec<String>,

    /// Additional claims required by a step-up challenge (decoded JSON text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<String>,

    /// Whether the caller can handle step-up challenges for this token.
    ///
    /// The policy always sets this before acquiring.
    #[serde(default)]
    pub enable_step_up: bool,

    /// Tenant to request the token from, when the credential supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl TokenRequestOptions {
    /// Creates options requesting `scopes` with no claims.
    pub fn new(scopes: Vec<String>) -> Self {
        Self {
            scopes,
            ..Self::default()
        }
    }

    /// Sets the claims required by a step-up challenge.
    pub fn with_claims(mut self, claims: impl Into<String>) -> Self {
        self.claims = Some(claims.into());
        self
    }

    /// Sets the tenant to request the token from.
    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }
}
