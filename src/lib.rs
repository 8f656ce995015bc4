//! bearer-policy - Bearer token authorization for HTTP pipelines
//!
//! This library attaches OAuth bearer tokens to outgoing requests and
//! interprets `WWW-Authenticate` challenges on `401 Unauthorized` responses,
//! including step-up (`insufficient_claims`) challenges that demand a token
//! carrying additional claims.
//!
//! # Architecture
//!
//! - [`cache`]: single-flight cache for an expiring value
//! - [`challenge`]: `WWW-Authenticate` parsing and step-up detection
//! - [`policy`]: the authorization policy and its hooks
//! - [`pipeline`]: request/response values and transports
//! - [`credential`] and [`token`]: the token source contract
//! - [`config`], [`logging`], [`cli`], [`commands`]: the command line tool

pub mod cache;
pub mod challenge;
pub mod cli;
pub mod commands;
pub mod config;
pub mod credential;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod policy;
pub mod token;

pub use config::Config;
pub use credential::TokenCredential;
pub use error::{AuthError, Result};
pub use pipeline::{Request, Response, Transport};
pub use policy::{AuthorizationPolicy, AuthorizedTransport, BearerTokenOptions};
pub use token::{AccessToken, TokenRequestOptions};

#[cfg(test)]
pub mod test_utils;
