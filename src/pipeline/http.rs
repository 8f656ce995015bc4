//! HTTP transport backed by `reqwest`
//!
//! [`HttpTransport`] is the last stage of a pipeline: it turns a
//! [`Request`] into a `reqwest` call, buffers the response body and hands
//! back a [`Response`]. Every call honours the request's cancellation token
//! as well as the per-request timeout configured at construction.

use std::time::Duration;

use crate::error::{AuthError, Result};
use crate::pipeline::{Request, Response, Transport};

/// Sends requests with a shared `reqwest` client.
///
/// # Examples
///
/// ```no_run
/// use std::time::Duration;
/// use bearer_policy::pipeline::http::HttpTransport;
///
/// let transport = HttpTransport::new(Duration::from_secs(30)).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    /// Underlying reqwest HTTP client.
    client: reqwest::Client,
}

impl HttpTransport {
    /// Builds a transport whose requests time out after `timeout`.
    ///
    /// No network I/O is performed at construction time.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Http`] if the TLS backend cannot be initialised.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(AuthError::Http)?;
        Ok(Self { client })
    }

    /// Wraps an existing client, e.g. one with custom proxy settings.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url().clone())
            .headers(request.headers().clone());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let exchange = async {
            let response = builder.send().await.map_err(|e| {
                AuthError::Transport(format!(
                    "{} {} failed: {}",
                    request.method(),
                    request.url(),
                    e
                ))
            })?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                AuthError::Transport(format!("failed to read response body: {}", e))
            })?;
            tracing::debug!("{} {} -> {}", request.method(), request.url(), status);
            Ok::<_, AuthError>(Response {
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            biased;
            _ = request.cancellation().cancelled() => Err(AuthError::Cancelled.into()),
            result = exchange => result.map_err(Into::into),
        }
    }
}
