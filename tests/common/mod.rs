use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use bearer_policy::credential::TokenCredential;
use bearer_policy::token::{AccessToken, TokenRequestOptions};
use chrono::{Duration, Utc};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Issues `token-1`, `token-2`, ... and records the options of each call.
#[allow(dead_code)]
#[derive(Debug, Default)]
pub struct SequenceCredential {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<TokenRequestOptions>>,
    pub delay: Option<StdDuration>,
}

#[allow(dead_code)]
impl SequenceCredential {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<TokenRequestOptions> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl TokenCredential for SequenceCredential {
    async fn get_token(
        &self,
        options: &TokenRequestOptions,
        cancel: &CancellationToken,
    ) -> bearer_policy::Result<AccessToken> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.seen.lock().unwrap().push(options.clone());
        if let Some(delay) = self.delay {
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(bearer_policy::AuthError::Cancelled.into());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
        Ok(AccessToken::new(
            format!("token-{n}"),
            Utc::now() + Duration::hours(1),
        ))
    }
}
