//! Test utilities and helpers
//!
//! Shared doubles for unit tests: a credential that counts and records its
//! calls, and a transport that replays scripted responses and records every
//! request it was asked to send.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::credential::TokenCredential;
use crate::error::{AuthError, Result};
use crate::pipeline::{Request, Response, Transport};
use crate::token::{AccessToken, TokenRequestOptions};

/// Credential returning `token-1`, `token-2`, ... and recording the options
/// of every call.
#[derive(Debug, Default)]
pub struct CountingCredential {
    calls: AtomicUsize,
    seen: Mutex<Vec<TokenRequestOptions>>,
    delay: Option<StdDuration>,
    fail_with: Option<String>,
}

impl CountingCredential {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `delay` before returning each token.
    pub fn with_delay(mut self, delay: StdDuration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fails every call with an acquisition error carrying `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            fail_with: Some(message.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Options passed to each call, in call order.
    pub fn seen(&self) -> Vec<TokenRequestOptions> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TokenCredential for CountingCredential {
    async fn get_token(
        &self,
        options: &TokenRequestOptions,
        _cancel: &CancellationToken,
    ) -> Result<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(options.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.fail_with {
            return Err(AuthError::Acquisition(message.clone()).into());
        }
        Ok(AccessToken::new(
            format!("token-{n}"),
            Utc::now() + Duration::hours(1),
        ))
    }
}

/// Transport replaying scripted outcomes in order.
///
/// Once the script is exhausted every further call returns `200 OK`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<std::result::Result<Response, String>>>,
    sent: Mutex<Vec<Request>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a response.
    pub fn respond(self, response: Response) -> Self {
        self.script.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queues a transport failure.
    pub fn fail(self, message: &str) -> Self {
        self.script
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
        self
    }

    /// Requests sent so far, as they were when sent.
    pub fn sent(&self) -> Vec<Request> {
        self.sent.lock().unwrap().clone()
    }

    /// `Authorization` header of each sent request.
    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.sent()
            .iter()
            .map(|r| {
                r.headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &Request) -> Result<Response> {
        self.sent.lock().unwrap().push(request.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(AuthError::Transport(message).into()),
            None => Ok(ok()),
        }
    }
}

/// A `200 OK` with an empty body.
pub fn ok() -> Response {
    Response::new(StatusCode::OK, HeaderMap::new())
}

/// A `401` carrying one `WWW-Authenticate` header per value.
pub fn unauthorized(challenges: &[&str]) -> Response {
    let mut headers = HeaderMap::new();
    for value in challenges {
        headers.append(WWW_AUTHENTICATE, HeaderValue::from_str(value).unwrap());
    }
    Response::new(StatusCode::UNAUTHORIZED, headers)
}

/// A step-up challenge demanding `claims` (raw JSON, encoded here).
pub fn step_up_challenge(claims: &str) -> String {
    use base64::Engine;
    format!(
        r#"Bearer realm="", error="insufficient_claims", claims="{}""#,
        base64::engine::general_purpose::STANDARD.encode(claims)
    )
}

