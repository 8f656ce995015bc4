//! Single-flight cache for a value with an expiration time
//!
//! [`CachedResource`] holds one value (typically an [`AccessToken`]) and the
//! instant it expires. Concurrent callers share a single acquisition: the
//! first caller to find the value missing or expired becomes the leader and
//! runs the acquisition closure; everyone else arriving meanwhile waits on a
//! `watch` channel and receives the leader's outcome, success or failure.
//!
//! # Refresh window
//!
//! When the cached value is still valid but expires within the refresh
//! window, the first caller to notice refreshes it while later callers keep
//! receiving the still-valid value. If that early refresh fails the leader
//! logs a warning and falls back to the cached value. Early refreshes start
//! at most once per minimum refresh interval (30 seconds by default), so a
//! token that lives shorter than the window, or a provider that keeps
//! failing, is not hit on every call.
//!
//! # Cancellation
//!
//! Every call takes the caller's [`CancellationToken`]. A waiting follower
//! whose token fires returns [`AuthError::Cancelled`] without disturbing
//! anyone else. A leader whose token fires (or whose future is dropped)
//! abandons the acquisition without publishing an outcome, and the waiting
//! followers race to become the next leader.
//!
//! [`AccessToken`]: crate::token::AccessToken

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use futures::future::BoxFuture;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::{AuthError, Result};

/// Default refresh window: values expiring within five minutes are renewed early.
pub const DEFAULT_REFRESH_WINDOW_SECONDS: i64 = 300;

/// Largest accepted refresh window (one day).
pub const MAX_REFRESH_WINDOW_SECONDS: i64 = 86_400;

/// Default minimum gap between two acquisition attempts before an early refresh.
pub const DEFAULT_MIN_REFRESH_INTERVAL_SECONDS: i64 = 30;

/// Future returned by an acquisition closure: the new value and its expiration.
pub type Acquisition<V> = BoxFuture<'static, Result<(V, DateTime<Utc>)>>;

type AcquireFn<V, S> = dyn Fn(S, CancellationToken) -> Acquisition<V> + Send + Sync;

type Outcome<V> = std::result::Result<V, Arc<anyhow::Error>>;

/// An acquisition failure shared between the leader and its followers.
///
/// Every caller that observed the same failed acquisition receives a
/// `SharedError` pointing at the same underlying error.
#[derive(Debug, Clone)]
pub struct SharedError(Arc<anyhow::Error>);

impl SharedError {
    /// Returns the error produced by the acquisition.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Returns `true` when both values refer to the same acquisition failure.
    pub fn ptr_eq(&self, other: &SharedError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for SharedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for SharedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&**self.0)
    }
}

struct Cached<V> {
    value: V,
    expiration: DateTime<Utc>,
}

struct Slot<V> {
    cached: Option<Cached<V>>,
    in_flight: Option<watch::Receiver<Option<Outcome<V>>>>,
    last_attempt: Option<DateTime<Utc>>,
}

enum Role<V> {
    Leader(watch::Sender<Option<Outcome<V>>>),
    EarlyLeader(watch::Sender<Option<Outcome<V>>>),
    Follower(watch::Receiver<Option<Outcome<V>>>),
}

/// A cached value with an expiration, acquired at most once at a time.
///
/// `V` is the cached value type; `S` is the per-call state handed to the
/// acquisition closure (for the authorization policy: which credential to
/// call and with which options).
///
/// # Examples
///
/// ```
/// use bearer_policy::cache::CachedResource;
/// use chrono::{Duration, Utc};
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main]
/// # async fn main() -> bearer_policy::Result<()> {
/// let cache: CachedResource<String, &'static str> = CachedResource::new(|name, _cancel| {
///     Box::pin(async move { Ok((format!("hello {name}"), Utc::now() + Duration::hours(1))) })
/// });
///
/// let cancel = CancellationToken::new();
/// assert_eq!(cache.get("world", &cancel).await?, "hello world");
/// // Still valid: the closure is not called again.
/// assert_eq!(cache.get("ignored", &cancel).await?, "hello world");
/// # Ok(())
/// # }
/// ```
pub struct CachedResource<V, S> {
    acquire: Box<AcquireFn<V, S>>,
    slot: Mutex<Slot<V>>,
    refresh_window: Duration,
    min_refresh_interval: Duration,
}

impl<V, S> CachedResource<V, S>
where
    V: Clone + Send + Sync + 'static,
    S: Send + 'static,
{
    /// Creates an empty cache that acquires values with `acquire`.
    ///
    /// The refresh window defaults to [`DEFAULT_REFRESH_WINDOW_SECONDS`] and
    /// the minimum refresh interval to [`DEFAULT_MIN_REFRESH_INTERVAL_SECONDS`].
    pub fn new<F>(acquire: F) -> Self
    where
        F: Fn(S, CancellationToken) -> Acquisition<V> + Send + Sync + 'static,
    {
        Self {
            acquire: Box::new(acquire),
            slot: Mutex::new(Slot {
                cached: None,
                in_flight: None,
                last_attempt: None,
            }),
            refresh_window: Duration::seconds(DEFAULT_REFRESH_WINDOW_SECONDS),
            min_refresh_interval: Duration::seconds(DEFAULT_MIN_REFRESH_INTERVAL_SECONDS),
        }
    }

    /// Sets how long before expiration a value is refreshed early.
    ///
    /// A zero or negative window disables early refresh. A window reaching
    /// past the earliest representable instant refreshes every valid value.
    pub fn with_refresh_window(mut self, window: Duration) -> Self {
        self.refresh_window = window;
        self
    }

    /// Sets the minimum time since the last acquisition attempt before a
    /// still-valid value is refreshed early.
    ///
    /// Expired or missing values are always acquired immediately.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    /// Returns the cached value, acquiring a new one when necessary.
    ///
    /// A value is acquired when none is cached, when its expiration is at or
    /// before now, or after [`expire`](Self::expire). Callers arriving while
    /// an acquisition is in flight wait for it and share its outcome.
    ///
    /// # Errors
    ///
    /// Returns a [`SharedError`] wrapping the acquisition error when the
    /// acquisition this call observed failed, or [`AuthError::Cancelled`]
    /// when `cancel` fires first.
    pub async fn get(&self, state: S, cancel: &CancellationToken) -> Result<V> {
        loop {
            let role = {
                let mut guard = self.lock();
                let slot = &mut *guard;
                let now = Utc::now();
                match &slot.cached {
                    Some(cached) if cached.expiration > now => {
                        if !self.refresh_due(cached.expiration, slot.last_attempt, now)
                            || slot.in_flight.is_some()
                        {
                            return Ok(cached.value.clone());
                        }
                        let (tx, rx) = watch::channel(None);
                        slot.in_flight = Some(rx);
                        slot.last_attempt = Some(now);
                        Role::EarlyLeader(tx)
                    }
                    _ => match &slot.in_flight {
                        Some(rx) => Role::Follower(rx.clone()),
                        None => {
                            let (tx, rx) = watch::channel(None);
                            slot.in_flight = Some(rx);
                            slot.last_attempt = Some(now);
                            Role::Leader(tx)
                        }
                    },
                }
            };

            match role {
                Role::Leader(tx) => return self.lead(state, cancel, tx, false).await,
                Role::EarlyLeader(tx) => return self.lead(state, cancel, tx, true).await,
                Role::Follower(mut rx) => {
                    let outcome = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AuthError::Cancelled.into()),
                        published = rx.wait_for(Option::is_some) => {
                            published.ok().and_then(|outcome| (*outcome).clone())
                        }
                    };
                    match outcome {
                        Some(Ok(value)) => return Ok(value),
                        Some(Err(err)) => return Err(SharedError(err).into()),
                        None => {
                            // The leader gave up without an outcome.
                            tracing::debug!("Acquisition abandoned by its leader; retrying");
                            continue;
                        }
                    }
                }
            }
        }
    }

    /// Marks the cached value as untrustworthy.
    ///
    /// The next [`get`](Self::get) acquires a new value regardless of the
    /// remaining lifetime. An acquisition already in flight is not aborted
    /// and may still publish its value after this returns.
    pub fn expire(&self) {
        let mut slot = self.lock();
        if slot.cached.take().is_some() {
            tracing::debug!("Cached value expired on request");
        }
    }

    /// Whether a value expiring at `expiration` should be refreshed early.
    fn refresh_due(
        &self,
        expiration: DateTime<Utc>,
        last_attempt: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.refresh_window <= Duration::zero() {
            return false;
        }
        let in_window = expiration
            .checked_sub_signed(self.refresh_window)
            .map_or(true, |start| start <= now);
        let interval_elapsed =
            last_attempt.map_or(true, |last| now - last >= self.min_refresh_interval);
        in_window && interval_elapsed
    }

    async fn lead(
        &self,
        state: S,
        cancel: &CancellationToken,
        tx: watch::Sender<Option<Outcome<V>>>,
        early: bool,
    ) -> Result<V> {
        let mut guard = InFlightGuard {
            slot: &self.slot,
            armed: true,
        };
        tracing::debug!(early, "Acquiring cached value");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            acquired = (self.acquire)(state, cancel.clone()) => Some(acquired),
        };

        let Some(result) = result else {
            tracing::debug!("Acquisition cancelled by its leader");
            return Err(AuthError::Cancelled.into());
        };

        match result {
            Ok((value, expiration)) => {
                {
                    let mut slot = self.lock();
                    slot.cached = Some(Cached {
                        value: value.clone(),
                        expiration,
                    });
                    slot.in_flight = None;
                    guard.armed = false;
                }
                tx.send_replace(Some(Ok(value.clone())));
                Ok(value)
            }
            Err(err) => {
                let shared = Arc::new(err);
                let fallback = {
                    let mut slot = self.lock();
                    slot.in_flight = None;
                    guard.armed = false;
                    match &slot.cached {
                        Some(cached) if early && cached.expiration > Utc::now() => {
                            Some(cached.value.clone())
                        }
                        _ => None,
                    }
                };
                tx.send_replace(Some(Err(Arc::clone(&shared))));
                match fallback {
                    Some(value) => {
                        tracing::warn!(
                            "Early refresh failed, using the still-valid cached value: {}",
                            shared
                        );
                        Ok(value)
                    }
                    None => Err(SharedError(shared).into()),
                }
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<V>> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<V, S> fmt::Debug for CachedResource<V, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (expiration, acquiring) = match self.slot.lock() {
            Ok(slot) => (
                slot.cached.as_ref().map(|c| c.expiration),
                slot.in_flight.is_some(),
            ),
            Err(_) => (None, false),
        };
        f.debug_struct("CachedResource")
            .field("expiration", &expiration)
            .field("acquiring", &acquiring)
            .field("refresh_window", &self.refresh_window)
            .field("min_refresh_interval", &self.min_refresh_interval)
            .finish()
    }
}

/// Clears the in-flight marker if the leader stops before publishing.
struct InFlightGuard<'a, V> {
    slot: &'a Mutex<Slot<V>>,
    armed: bool,
}

impl<V> Drop for InFlightGuard<'_, V> {
    fn drop(&mut self) {
        if self.armed {
            let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
            slot.in_flight = None;
        }
    }
}
