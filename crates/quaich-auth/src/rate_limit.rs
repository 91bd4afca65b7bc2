//! Fixed-window request limiter keyed by user id or client IP.
//!
//! The ceiling is the `api_rate_limit` setting, read through the store on
//! every check so admin edits apply at once. The limiter fails open: if
//! the setting cannot be read, the request is allowed.
//!
//! Ended windows are dropped by a sweep that runs at most once per window
//! length, from inside [`RateLimiter::check_at`].

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use quaich_core::repository::SettingRepository;
use quaich_settings::SettingStore;
use quaich_settings::defaults::{keys, security};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};

/// What a request is counted against. Authenticated requests count per
/// user, anonymous ones per address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RateLimitKey {
    User(Uuid),
    Ip(IpAddr),
}

impl RateLimitKey {
    pub fn for_request(user_id: Option<Uuid>, ip: IpAddr) -> Self {
        match user_id {
            Some(id) => RateLimitKey::User(id),
            None => RateLimitKey::Ip(ip),
        }
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitKey::User(id) => write!(f, "user:{id}"),
            RateLimitKey::Ip(ip) => write!(f, "ip:{ip}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: DateTime<Utc>,
    count: u32,
}

#[derive(Debug, Default)]
struct Windows {
    entries: HashMap<RateLimitKey, Window>,
    last_sweep: Option<DateTime<Utc>>,
}

impl Windows {
    fn sweep(&mut self, now: DateTime<Utc>, length: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, w| now - w.started < length);
        self.last_sweep = Some(now);
        before - self.entries.len()
    }
}

#[derive(Clone)]
pub struct RateLimiter<R: SettingRepository> {
    store: SettingStore<R>,
    window: Duration,
    windows: Arc<Mutex<Windows>>,
}

impl<R: SettingRepository> RateLimiter<R> {
    pub fn new(store: SettingStore<R>, window_secs: u64) -> Self {
        Self {
            store,
            window: Duration::seconds(i64::try_from(window_secs).unwrap_or(i64::MAX / 2)),
            windows: Arc::new(Mutex::new(Windows::default())),
        }
    }

    pub async fn check(&self, key: &RateLimitKey) -> AuthResult<RateLimitStatus> {
        self.check_at(key, Utc::now()).await
    }

    /// Count one request for `key` at `now`.
    pub async fn check_at(
        &self,
        key: &RateLimitKey,
        now: DateTime<Utc>,
    ) -> AuthResult<RateLimitStatus> {
        let limit = self.current_limit().await;

        let mut windows = self.windows.lock().await;
        if windows.last_sweep.is_none_or(|at| now - at >= self.window) {
            let dropped = windows.sweep(now, self.window);
            if dropped > 0 {
                debug!(dropped, "Swept ended rate-limit windows");
            }
        }

        let window = windows.entries.entry(key.clone()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now - window.started >= self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        let reset_at = window.started + self.window;

        if window.count >= limit {
            let retry_after = (reset_at - now).num_seconds().max(1);
            debug!(key = %key, limit, "Rate limit exceeded");
            return Err(AuthError::RateLimited {
                retry_after_secs: u64::try_from(retry_after).unwrap_or(1),
            });
        }

        window.count += 1;
        Ok(RateLimitStatus {
            limit,
            remaining: limit - window.count,
            reset_at,
        })
    }

    /// Drop every window that ended before `now` without waiting for the
    /// next sweep. Returns how many were dropped.
    pub async fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        self.windows.lock().await.sweep(now, self.window)
    }

    async fn current_limit(&self) -> u32 {
        match self.store.get(keys::API_RATE_LIMIT).await {
            Ok(Some(value)) => match value.as_i64().and_then(|n| u32::try_from(n).ok()) {
                Some(n) if n > 0 => n,
                _ => {
                    warn!(value = ?value, "Unusable api_rate_limit, using default");
                    security::API_RATE_LIMIT
                }
            },
            Ok(None) => security::API_RATE_LIMIT,
            Err(e) => {
                warn!(error = %e, "Rate limit setting unreadable, failing open");
                u32::MAX
            }
        }
    }
}
