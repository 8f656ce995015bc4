//! Request pipeline primitives
//!
//! This module defines the [`Request`] and [`Response`] values that flow
//! through the authorization policy, and the [`Transport`] trait that sends
//! them. Concrete implementations live in submodules:
//!
//! - [`http::HttpTransport`] -- sends requests with `reqwest`.
//!
//! [`AuthorizedTransport`](crate::policy::AuthorizedTransport) layers an
//! [`AuthorizationPolicy`](crate::policy::AuthorizationPolicy) over any
//! transport and is itself a transport.
//!
//! # Design
//!
//! Requests are plain values with a fully buffered body so that the policy
//! can resend them after a challenge. Each request carries the caller's
//! [`CancellationToken`], which governs the caller's wait for a token and
//! its own network calls, and nothing else.

use std::fmt;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::error::Result;

pub mod http;

/// An outgoing HTTP request.
///
/// # Examples
///
/// ```
/// use bearer_policy::pipeline::Request;
/// use reqwest::Method;
/// use url::Url;
///
/// let request = Request::new(Method::GET, Url::parse("https://api.example.com/items").unwrap());
/// assert!(request.is_https());
/// assert!(request.headers().is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<Bytes>,
    cancellation: CancellationToken,
}

impl Request {
    /// Creates a request with no headers, no body and a fresh cancellation token.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a header, replacing any existing value for `name`.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Ties the request to the caller's cancellation token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Target URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable request headers, used by the policy and hooks.
    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Request body, if any.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// The caller's cancellation token.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns `true` when the URL scheme is `https` (case-insensitive).
    pub fn is_https(&self) -> bool {
        self.url.scheme().eq_ignore_ascii_case("https")
    }
}

/// A received HTTP response with a fully buffered body.
#[derive(Debug, Clone)]
pub struct Response {
    /// Status code.
    pub status: StatusCode,

    /// Response headers.
    pub headers: HeaderMap,

    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates a response with an empty body.
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self {
            status,
            headers,
            body: Bytes::new(),
        }
    }

    /// Sets the response body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns `true` for `401 Unauthorized`.
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }
}

/// Sends requests and returns responses.
///
/// Implementations must be safe to share across tasks. Errors returned here
/// are transport failures; the authorization policy propagates them
/// unmodified.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Sends `request` and returns the server's response.
    ///
    /// Implementations should stop and return
    /// [`AuthError::Cancelled`](crate::error::AuthError::Cancelled) when the
    /// request's cancellation token fires.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be sent or the response
    /// could not be read. Non-success statuses are not errors.
    async fn send(&self, request: &Request) -> Result<Response>;
}
