//! Error types for bearer-policy
//!
//! This module defines the error types used throughout the crate, using
//! `thiserror` for the error enum and `anyhow` for propagation.
//!
//! Errors produced by the authorization policy's own logic are wrapped in
//! [`NonRetriableError`] so that an outer retry layer can tell an
//! unfixable authentication failure apart from an ordinary transport error.
//! Use [`is_non_retriable`] to check an error chain for the marker.

use std::fmt;

use thiserror::Error;

use crate::pipeline::Response;

/// Main error type for bearer-policy operations
///
/// Covers the policy's pre-flight checks, token acquisition, challenge
/// handling, hook failures, transport failures and configuration loading.
#[derive(Error, Debug)]
pub enum AuthError {
    /// The request targets a non-TLS endpoint and insecure transport is not allowed
    #[error("authenticated requests are not permitted for non TLS protected (https) endpoints")]
    InsecureTransport,

    /// The credential could not produce a token
    #[error("Token acquisition failed: {0}")]
    Acquisition(String),

    /// A step-up challenge carried a `claims` value that could not be decoded
    ///
    /// Holds the raw, still-encoded claims value. The decoder's own error
    /// text is intentionally not included.
    #[error("authentication challenge contains invalid claims: {0}")]
    InvalidChallengeClaims(String),

    /// A `401` response carried a challenge this policy could not handle
    #[error("Unhandled authentication challenge: HTTP {}", .response.status)]
    UnhandledChallenge {
        /// The unauthorized response returned by the server
        response: Box<Response>,
    },

    /// A caller-supplied authorization hook failed
    #[error("Authorization hook failed: {0}")]
    Hook(String),

    /// The caller's cancellation token fired while waiting
    #[error("Operation cancelled")]
    Cancelled,

    /// Transport-level failures (connection, timeout, body read)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for bearer-policy operations
///
/// Uses `anyhow::Error` so that provider errors, hook errors and the
/// crate's own [`AuthError`] values propagate through one type.
pub type Result<T> = anyhow::Result<T>;

/// Marks an error as not worth retrying.
///
/// Display and the error chain are those of the wrapped error, so
/// `downcast`-style inspection through [`find_auth_error`] still works.
#[derive(Debug)]
pub struct NonRetriableError(anyhow::Error);

impl NonRetriableError {
    /// Returns the wrapped error.
    pub fn into_inner(self) -> anyhow::Error {
        self.0
    }
}

impl fmt::Display for NonRetriableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for NonRetriableError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.0)
    }
}

/// Wraps `err` in a [`NonRetriableError`] unless it is already marked.
///
/// # Examples
///
/// ```
/// use bearer_policy::error::{is_non_retriable, non_retriable, AuthError};
///
/// let err = non_retriable(AuthError::InsecureTransport.into());
/// assert!(is_non_retriable(&err));
/// ```
pub fn non_retriable(err: anyhow::Error) -> anyhow::Error {
    if is_non_retriable(&err) {
        return err;
    }
    anyhow::Error::new(NonRetriableError(err))
}

/// Returns `true` when any error in the chain is a [`NonRetriableError`].
pub fn is_non_retriable(err: &anyhow::Error) -> bool {
    err.chain().any(|e| e.is::<NonRetriableError>())
}

/// Returns the first [`AuthError`] found in the error chain.
///
/// # Examples
///
/// ```
/// use bearer_policy::error::{find_auth_error, non_retriable, AuthError};
///
/// let err = non_retriable(AuthError::Hook("denied".to_string()).into());
/// assert!(matches!(find_auth_error(&err), Some(AuthError::Hook(_))));
/// ```
pub fn find_auth_error(err: &anyhow::Error) -> Option<&AuthError> {
    err.chain().find_map(|e| e.downcast_ref::<AuthError>())
}

/// Returns `true` when the error chain contains [`AuthError::Cancelled`].
pub fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(find_auth_error(err), Some(AuthError::Cancelled))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderMap;
    use reqwest::StatusCode;

    #[test]
    fn test_insecure_transport_display() {
        let error = AuthError::InsecureTransport;
        assert!(error.to_string().contains("non TLS protected (https)"));
    }

    #[test]
    fn test_invalid_claims_display_contains_raw_value_only() {
        let error = AuthError::InvalidChallengeClaims("not*base64".to_string());
        assert_eq!(
            error.to_string(),
            "authentication challenge contains invalid claims: not*base64"
        );
    }

    #[test]
    fn test_unhandled_challenge_display_includes_status() {
        let error = AuthError::UnhandledChallenge {
            response: Box::new(Response::new(StatusCode::UNAUTHORIZED, HeaderMap::new())),
        };
        assert_eq!(
            error.to_string(),
            "Unhandled authentication challenge: HTTP 401 Unauthorized"
        );
    }

    #[test]
    fn test_config_error_display() {
        let error = AuthError::Config("invalid format".to_string());
        assert_eq!(error.to_string(), "Configuration error: invalid format");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error: AuthError = io_error.into();
        assert!(matches!(error, AuthError::Io(_)));
    }

    #[test]
    fn test_yaml_error_conversion() {
        let yaml_error = serde_yaml::from_str::<serde_yaml::Value>("invalid: : yaml").unwrap_err();
        let error: AuthError = yaml_error.into();
        assert!(matches!(error, AuthError::Yaml(_)));
    }

    #[test]
    fn test_non_retriable_marks_and_preserves_display() {
        let err = non_retriable(AuthError::Hook("nope".to_string()).into());
        assert!(is_non_retriable(&err));
        assert_eq!(err.to_string(), "Authorization hook failed: nope");
    }

    #[test]
    fn test_non_retriable_is_idempotent() {
        let err = non_retriable(non_retriable(AuthError::Cancelled.into()));
        let markers = err
            .chain()
            .filter(|e| e.is::<NonRetriableError>())
            .count();
        assert_eq!(markers, 1);
    }

    #[test]
    fn test_plain_error_is_retriable() {
        let err: anyhow::Error = AuthError::Transport("connection reset".to_string()).into();
        assert!(!is_non_retriable(&err));
    }

    #[test]
    fn test_find_auth_error_through_context() {
        let err = anyhow::Error::from(AuthError::Cancelled).context("while waiting for token");
        assert!(is_cancelled(&err));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthError>();
        assert_send_sync::<NonRetriableError>();
    }
}
