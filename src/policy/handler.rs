//! Caller-supplied hooks for the authorization policy
//!
//! Both hooks are optional. When [`AuthorizationHandler::on_request`] is
//! `None` the policy authorizes every request with its configured scopes;
//! when [`AuthorizationHandler::on_challenge`] is `None` only step-up
//! challenges are handled.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::pipeline::{Request, Response};
use crate::policy::Authorizer;

/// Customizes how a request is authorized before it is sent.
///
/// Implementations typically pick scopes or a tenant from the request and
/// call [`Authorizer::authorize`] with them.
#[async_trait::async_trait]
pub trait OnRequest: Send + Sync {
    /// Authorizes `request`.
    ///
    /// # Errors
    ///
    /// Any error is surfaced to the caller as non-retriable.
    async fn on_request(&self, request: &mut Request, authorizer: &Authorizer<'_>) -> Result<()>;
}

/// Handles a `401` challenge the policy does not handle on its own.
///
/// Called when no step-up challenge is present, or when the response carries
/// more than one Bearer challenge. On success the policy resends the request
/// once.
#[async_trait::async_trait]
pub trait OnChallenge: Send + Sync {
    /// Re-authorizes `request` in response to `response`.
    ///
    /// # Errors
    ///
    /// Any error is surfaced to the caller as non-retriable and the request
    /// is not resent.
    async fn on_challenge(
        &self,
        request: &mut Request,
        response: &Response,
        authorizer: &Authorizer<'_>,
    ) -> Result<()>;
}

/// The pair of optional hooks a policy is built with.
///
/// # Examples
///
/// ```
/// use bearer_policy::policy::AuthorizationHandler;
///
/// let handler = AuthorizationHandler::default();
/// assert!(handler.on_request.is_none());
/// assert!(handler.on_challenge.is_none());
/// ```
#[derive(Clone, Default)]
pub struct AuthorizationHandler {
    /// Replaces the default request authorization.
    pub on_request: Option<Arc<dyn OnRequest>>,

    /// Handles challenges other than a lone step-up challenge.
    pub on_challenge: Option<Arc<dyn OnChallenge>>,
}

impl AuthorizationHandler {
    /// Sets the request hook.
    pub fn with_on_request(mut self, hook: Arc<dyn OnRequest>) -> Self {
        self.on_request = Some(hook);
        self
    }

    /// Sets the challenge hook.
    pub fn with_on_challenge(mut self, hook: Arc<dyn OnChallenge>) -> Self {
        self.on_challenge = Some(hook);
        self
    }
}

impl fmt::Debug for AuthorizationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationHandler")
            .field("on_request", &self.on_request.is_some())
            .field("on_challenge", &self.on_challenge.is_some())
            .finish()
    }
}
