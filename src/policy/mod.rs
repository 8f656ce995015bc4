//! Bearer token authorization policy
//!
//! [`AuthorizationPolicy`] sits in front of a [`Transport`]. For every
//! request it attaches `Authorization: Bearer <token>` using a single-flight
//! token cache, and when the server answers `401 Unauthorized` it interprets
//! the `WWW-Authenticate` challenges:
//!
//! - a lone step-up (`insufficient_claims`) challenge is answered by
//!   acquiring a token carrying the demanded claims and resending once;
//! - anything else is delegated to the [`OnChallenge`] hook when one is
//!   configured, with one further step-up pass if the server challenges the
//!   resend;
//! - otherwise the challenge is reported as
//!   [`AuthError::UnhandledChallenge`].
//!
//! Errors produced by the policy itself are marked non-retriable so an
//! outer retry layer never repeats them. Transport errors pass through
//! untouched.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use bearer_policy::credential::EnvironmentCredential;
//! use bearer_policy::pipeline::http::HttpTransport;
//! use bearer_policy::pipeline::{Request, Transport};
//! use bearer_policy::policy::{AuthorizationPolicy, AuthorizedTransport, BearerTokenOptions};
//! use reqwest::Method;
//! use url::Url;
//!
//! # #[tokio::main]
//! # async fn main() -> bearer_policy::Result<()> {
//! let policy = AuthorizationPolicy::new(
//!     Some(Arc::new(EnvironmentCredential::default())),
//!     vec!["https://api.example.com/.default".to_string()],
//!     BearerTokenOptions::default(),
//! );
//! let transport = AuthorizedTransport::new(
//!     Arc::new(policy),
//!     Arc::new(HttpTransport::new(Duration::from_secs(30))?),
//! );
//!
//! let request = Request::new(Method::GET, Url::parse("https://api.example.com/items")?);
//! let response = transport.send(&request).await?;
//! println!("{}", response.status);
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;

use crate::cache::{
    Acquisition, CachedResource, DEFAULT_REFRESH_WINDOW_SECONDS, MAX_REFRESH_WINDOW_SECONDS,
};
use crate::challenge::{parse_step_up_challenge, www_authenticate_values, AuthChallenge};
use crate::config::PolicyConfig;
use crate::credential::TokenCredential;
use crate::error::{non_retriable, AuthError, Result};
use crate::pipeline::{Request, Response, Transport};
use crate::token::{AccessToken, TokenRequestOptions};

pub mod handler;

pub use handler::{AuthorizationHandler, OnChallenge, OnRequest};

/// Construction-time options for [`AuthorizationPolicy`].
#[derive(Debug, Clone)]
pub struct BearerTokenOptions {
    /// Optional request and challenge hooks.
    pub handler: AuthorizationHandler,

    /// Allows tokens to be sent over plain `http`. Intended for tests and
    /// local development only.
    pub allow_insecure_transport: bool,

    /// How long before expiration a cached token is refreshed early.
    pub refresh_window: Duration,
}

impl Default for BearerTokenOptions {
    fn default() -> Self {
        Self {
            handler: AuthorizationHandler::default(),
            allow_insecure_transport: false,
            refresh_window: Duration::seconds(DEFAULT_REFRESH_WINDOW_SECONDS),
        }
    }
}

impl From<&PolicyConfig> for BearerTokenOptions {
    fn from(config: &PolicyConfig) -> Self {
        Self {
            handler: AuthorizationHandler::default(),
            allow_insecure_transport: config.allow_insecure_transport,
            refresh_window: Duration::seconds(
                config
                    .refresh_window_seconds
                    .clamp(0, MAX_REFRESH_WINDOW_SECONDS),
            ),
        }
    }
}

/// Per-acquisition input handed to the token cache.
struct AcquireState {
    credential: Arc<dyn TokenCredential>,
    options: TokenRequestOptions,
}

type TokenCache = CachedResource<AccessToken, AcquireState>;

/// Attaches bearer tokens to requests and answers authentication challenges.
///
/// A policy is shared by all requests to one service, typically behind an
/// `Arc`. Concurrent requests share one cached token and at most one token
/// acquisition runs at a time.
pub struct AuthorizationPolicy {
    cache: TokenCache,
    credential: Option<Arc<dyn TokenCredential>>,
    scopes: Vec<String>,
    handler: AuthorizationHandler,
    allow_insecure_transport: bool,
}

impl AuthorizationPolicy {
    /// Creates a policy requesting `scopes` from `credential`.
    ///
    /// With no credential the policy passes every request through untouched.
    pub fn new(
        credential: Option<Arc<dyn TokenCredential>>,
        scopes: Vec<String>,
        options: BearerTokenOptions,
    ) -> Self {
        let cache = TokenCache::new(acquire_token).with_refresh_window(options.refresh_window);
        Self {
            cache,
            credential,
            scopes,
            handler: options.handler,
            allow_insecure_transport: options.allow_insecure_transport,
        }
    }

    /// Creates a policy from the `policy` section of the configuration.
    pub fn from_config(
        credential: Option<Arc<dyn TokenCredential>>,
        config: &PolicyConfig,
        handler: AuthorizationHandler,
    ) -> Self {
        let options = BearerTokenOptions {
            handler,
            ..BearerTokenOptions::from(config)
        };
        Self::new(credential, config.scopes.clone(), options)
    }

    /// Scopes requested for every token.
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Attaches a token to `request` without sending it.
    ///
    /// Does nothing when the policy has no credential.
    ///
    /// # Errors
    ///
    /// Returns a non-retriable error when the request is not `https` and
    /// insecure transport is not allowed, or when the request hook or token
    /// acquisition fails.
    pub async fn authorize(&self, request: &mut Request) -> Result<()> {
        let Some(credential) = &self.credential else {
            return Ok(());
        };
        if !request.is_https() && !self.allow_insecure_transport {
            return Err(non_retriable(AuthError::InsecureTransport.into()));
        }

        let authorizer = Authorizer::new(&self.cache, credential);
        let result = match &self.handler.on_request {
            Some(hook) => hook.on_request(request, &authorizer).await,
            None => {
                authorizer
                    .authorize(request, TokenRequestOptions::new(self.scopes.clone()))
                    .await
            }
        };
        result.map_err(non_retriable)
    }

    /// Authorizes `request`, sends it through `next` and handles a `401`.
    ///
    /// The request is sent at most twice by the policy itself, or three
    /// times when the challenge hook resends and the server then demands a
    /// step-up.
    ///
    /// # Errors
    ///
    /// Transport errors are returned unmodified. Policy failures (insecure
    /// transport, acquisition, hooks, invalid claims, unhandled challenges)
    /// are returned as non-retriable errors.
    pub async fn send(&self, request: &mut Request, next: &dyn Transport) -> Result<Response> {
        let Some(credential) = &self.credential else {
            return next.send(request).await;
        };

        self.authorize(request).await?;
        let response = next.send(request).await?;
        if !response.is_unauthorized() {
            return Ok(response);
        }

        self.cache.expire();
        let challenges = www_authenticate_values(&response.headers);
        if challenges.is_empty() {
            tracing::debug!("401 without WWW-Authenticate; returning response");
            return Ok(response);
        }

        let authorizer = Authorizer::new(&self.cache, credential);
        self.handle_challenge(request, response, &challenges, next, &authorizer)
            .await
    }

    async fn handle_challenge(
        &self,
        request: &mut Request,
        response: Response,
        challenges: &[String],
        next: &dyn Transport,
        authorizer: &Authorizer<'_>,
    ) -> Result<Response> {
        let summary = parse_step_up_challenge(challenges)?;

        if let Some(hook) = &self.handler.on_challenge {
            if summary.step_up.is_none() || summary.bearer_count > 1 {
                tracing::debug!(
                    bearer_count = summary.bearer_count,
                    "Delegating authentication challenge to hook"
                );
                hook.on_challenge(request, &response, authorizer)
                    .await
                    .map_err(non_retriable)?;

                let response = next.send(request).await?;
                if !response.is_unauthorized() {
                    return Ok(response);
                }
                return self
                    .handle_step_up_only(request, response, next, authorizer)
                    .await;
            }
        }

        match summary.step_up {
            Some(step_up) => self.step_up(request, &step_up, next, authorizer).await,
            None => {
                tracing::info!("Authentication challenge left unhandled");
                Err(non_retriable(
                    AuthError::UnhandledChallenge {
                        response: Box::new(response),
                    }
                    .into(),
                ))
            }
        }
    }

    /// Second stage after hook delegation: only a step-up is answered.
    async fn handle_step_up_only(
        &self,
        request: &mut Request,
        response: Response,
        next: &dyn Transport,
        authorizer: &Authorizer<'_>,
    ) -> Result<Response> {
        self.cache.expire();
        let challenges = www_authenticate_values(&response.headers);
        let summary = parse_step_up_challenge(&challenges)?;
        match summary.step_up {
            Some(step_up) => self.step_up(request, &step_up, next, authorizer).await,
            None => {
                tracing::debug!("Resend after hook challenged again without step-up");
                Ok(response)
            }
        }
    }

    async fn step_up(
        &self,
        request: &mut Request,
        challenge: &AuthChallenge,
        next: &dyn Transport,
        authorizer: &Authorizer<'_>,
    ) -> Result<Response> {
        let claims = challenge.param("claims").unwrap_or_default();
        tracing::debug!("Answering step-up challenge with a claims-bearing token");
        let options = TokenRequestOptions::new(self.scopes.clone()).with_claims(claims);
        authorizer
            .authorize(request, options)
            .await
            .map_err(non_retriable)?;
        next.send(request).await
    }
}

impl fmt::Debug for AuthorizationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationPolicy")
            .field("credential", &self.credential)
            .field("scopes", &self.scopes)
            .field("handler", &self.handler)
            .field("allow_insecure_transport", &self.allow_insecure_transport)
            .field("cache", &self.cache)
            .finish()
    }
}

fn acquire_token(state: AcquireState, cancel: CancellationToken) -> Acquisition<AccessToken> {
    Box::pin(async move {
        tracing::debug!(
            scopes = ?state.options.scopes,
            step_up = state.options.claims.is_some(),
            "Acquiring access token"
        );
        let token = state.credential.get_token(&state.options, &cancel).await?;
        let expires_on: DateTime<Utc> = token.expires_on;
        Ok((token, expires_on))
    })
}

/// Acquires a token through the policy's cache and attaches it to a request.
///
/// Handed to [`OnRequest`] and [`OnChallenge`] hooks so they can authorize
/// with options of their choosing.
pub struct Authorizer<'a> {
    cache: &'a TokenCache,
    credential: &'a Arc<dyn TokenCredential>,
}

impl<'a> Authorizer<'a> {
    fn new(cache: &'a TokenCache, credential: &'a Arc<dyn TokenCredential>) -> Self {
        Self { cache, credential }
    }

    /// Gets a token for `options` and sets the `Authorization` header.
    ///
    /// `enable_step_up` is always set on the options passed to the
    /// credential. The wait for the token is governed by the request's
    /// cancellation token.
    ///
    /// # Errors
    ///
    /// Returns the acquisition error, [`AuthError::Cancelled`], or
    /// [`AuthError::Acquisition`] if the token cannot be used as a header
    /// value.
    pub async fn authorize(
        &self,
        request: &mut Request,
        mut options: TokenRequestOptions,
    ) -> Result<()> {
        options.enable_step_up = true;
        let state = AcquireState {
            credential: Arc::clone(self.credential),
            options,
        };
        let token = self.cache.get(state, request.cancellation()).await?;

        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.token)).map_err(|_| {
            AuthError::Acquisition("access token is not a valid header value".to_string())
        })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(())
    }
}

impl fmt::Debug for Authorizer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authorizer")
            .field("credential", self.credential)
            .finish_non_exhaustive()
    }
}

/// A [`Transport`] that runs every request through an [`AuthorizationPolicy`].
#[derive(Debug, Clone)]
pub struct AuthorizedTransport {
    policy: Arc<AuthorizationPolicy>,
    inner: Arc<dyn Transport>,
}

impl AuthorizedTransport {
    /// Layers `policy` over `inner`.
    pub fn new(policy: Arc<AuthorizationPolicy>, inner: Arc<dyn Transport>) -> Self {
        Self { policy, inner }
    }

    /// The policy applied to each request.
    pub fn policy(&self) -> &AuthorizationPolicy {
        &self.policy
    }
}

#[async_trait::async_trait]
impl Transport for AuthorizedTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let mut request = request.clone();
        self.policy.send(&mut request, self.inner.as_ref()).await
    }
}
