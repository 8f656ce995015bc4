//! `WWW-Authenticate` challenge parsing
//!
//! A `401 Unauthorized` response describes what the server wants in one or
//! more `WWW-Authenticate` headers, each of which may carry several
//! challenges:
//!
//! ```text
//! WWW-Authenticate: Bearer realm="", error="insufficient_claims", claims="eyJ...", Basic realm="x"
//! ```
//!
//! Only challenges whose parameters are all quoted `key="value"` pairs are
//! recognized. Anything else (token68 credentials, unquoted values, stray
//! text) is skipped and makes the result non-exhaustive, which the policy
//! takes into account when counting Bearer challenges.
//!
//! # Step-up challenges
//!
//! A Bearer challenge with `error="insufficient_claims"` and a non-empty
//! `claims` parameter asks the client for a new token carrying additional
//! claims. The `claims` value is standard base64 (`+`/`/` alphabet, `=`
//! padded) over a JSON document. Values in any other encoding are rejected
//! as invalid claims.

use std::collections::HashMap;
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use reqwest::header::{HeaderMap, WWW_AUTHENTICATE};
use serde::Serialize;

use crate::error::{non_retriable, AuthError, Result};

/// Authentication scheme handled by the policy.
pub const BEARER_SCHEME: &str = "Bearer";

/// `error` parameter value identifying a step-up challenge.
pub const INSUFFICIENT_CLAIMS: &str = "insufficient_claims";

/// One authentication challenge from a `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthChallenge {
    /// Authentication scheme, e.g. `Bearer`.
    pub scheme: String,

    /// Challenge parameters; later duplicates overwrite earlier ones.
    pub params: HashMap<String, String>,
}

impl AuthChallenge {
    /// Returns the value of parameter `key`, if present.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns `true` for challenges using the Bearer scheme.
    pub fn is_bearer(&self) -> bool {
        self.scheme == BEARER_SCHEME
    }

    /// Returns `true` for a Bearer `insufficient_claims` challenge carrying claims.
    pub fn is_step_up(&self) -> bool {
        self.is_bearer()
            && self.param("error") == Some(INSUFFICIENT_CLAIMS)
            && self.param("claims").is_some_and(|c| !c.is_empty())
    }
}

/// Result of parsing one or more `WWW-Authenticate` header values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedChallenges {
    /// Recognized challenges, in header order.
    pub challenges: Vec<AuthChallenge>,

    /// `false` when some header text was not recognized as a challenge.
    pub exhaustive: bool,
}

/// What the policy needs to know about a `401` response's challenges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepUpSummary {
    /// The step-up challenge, with its `claims` parameter already decoded.
    pub step_up: Option<AuthChallenge>,

    /// Number of Bearer challenges, including ones the parser could not read.
    pub bearer_count: usize,
}

struct Patterns {
    challenge: Regex,
    param: Regex,
}

static PATTERNS: OnceLock<Patterns> = OnceLock::new();

fn patterns() -> &'static Patterns {
    PATTERNS.get_or_init(|| Patterns {
        // Constant patterns, compiled by test_patterns_compile.
        challenge: Regex::new(r#"(?:(\w+) ((?:\w+="[^"]*",?\s*)+))"#)
            .expect("challenge pattern is valid"),
        param: Regex::new(r#"(\w+)="([^"]*)""#).expect("challenge parameter pattern is valid"),
    })
}

/// Collects every `WWW-Authenticate` value from `headers`.
///
/// Values that are not valid UTF-8 are converted lossily so that their
/// length still counts against exhaustiveness.
pub fn www_authenticate_values(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(WWW_AUTHENTICATE)
        .iter()
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .collect()
}

/// Parses authentication challenges from `WWW-Authenticate` header values.
///
/// # Examples
///
/// ```
/// use bearer_policy::challenge::parse_challenges;
///
/// let parsed = parse_challenges(&[r#"Bearer a="1", b="2""#]);
/// assert!(parsed.exhaustive);
/// assert_eq!(parsed.challenges.len(), 1);
/// assert_eq!(parsed.challenges[0].param("b"), Some("2"));
///
/// let parsed = parse_challenges(&[r#"Bearer a="1" garbage-not-a-challenge"#]);
/// assert!(!parsed.exhaustive);
/// assert_eq!(parsed.challenges.len(), 1);
/// ```
pub fn parse_challenges<S: AsRef<str>>(values: &[S]) -> ParsedChallenges {
    let patterns = patterns();
    let mut unmatched = 0usize;
    let mut challenges = Vec::new();

    for value in values {
        let value = value.as_ref();
        unmatched += value.len();
        for caps in patterns.challenge.captures_iter(value) {
            unmatched -= caps[0].len();
            let params = patterns
                .param
                .captures_iter(&caps[2])
                .map(|p| (p[1].to_string(), p[2].to_string()))
                .collect();
            challenges.push(AuthChallenge {
                scheme: caps[1].to_string(),
                params,
            });
        }
    }

    ParsedChallenges {
        challenges,
        exhaustive: unmatched == 0,
    }
}

/// Locates a step-up challenge and counts Bearer challenges.
///
/// When parsing was not exhaustive the Bearer count is taken from the raw
/// header text instead (occurrences of `"Bearer "`, scheme followed by a
/// space), so that an unreadable second Bearer challenge still counts.
///
/// # Errors
///
/// Returns a non-retriable [`AuthError::InvalidChallengeClaims`] carrying the
/// raw value when a step-up challenge's `claims` is not valid padded
/// standard base64 over UTF-8 text.
///
/// # Examples
///
/// ```
/// use base64::Engine;
/// use bearer_policy::challenge::parse_step_up_challenge;
///
/// let claims = base64::engine::general_purpose::STANDARD.encode(r#"{"access_token":{"foo":1}}"#);
/// let header = format!(r#"Bearer error="insufficient_claims", claims="{claims}""#);
///
/// let summary = parse_step_up_challenge(&[header]).unwrap();
/// assert_eq!(summary.bearer_count, 1);
/// let step_up = summary.step_up.unwrap();
/// assert_eq!(step_up.param("claims"), Some(r#"{"access_token":{"foo":1}}"#));
/// ```
pub fn parse_step_up_challenge<S: AsRef<str>>(values: &[S]) -> Result<StepUpSummary> {
    let parsed = parse_challenges(values);
    let mut step_up = None;
    let mut bearer_count = 0usize;

    for mut challenge in parsed.challenges {
        if !challenge.is_bearer() {
            continue;
        }
        bearer_count += 1;
        if !challenge.is_step_up() {
            continue;
        }
        let encoded = challenge.param("claims").unwrap_or_default().to_string();
        let decoded = decode_claims(&encoded)?;
        challenge.params.insert("claims".to_string(), decoded);
        step_up = Some(challenge);
    }

    if !parsed.exhaustive {
        bearer_count = values
            .iter()
            .map(|v| v.as_ref().matches("Bearer ").count())
            .sum();
    }

    Ok(StepUpSummary {
        step_up,
        bearer_count,
    })
}

fn decode_claims(encoded: &str) -> Result<String> {
    STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| non_retriable(AuthError::InvalidChallengeClaims(encoded.to_string()).into()))
}
