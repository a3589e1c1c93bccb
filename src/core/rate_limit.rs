//! Fixed-window request limiter keyed by caller.
//!
//! State lives in this process only. Several instances behind a load balancer
//! each enforce their own limit.

use crate::{
    config::economy::RateLimitConfig,
    errors::{Error, Result},
};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
struct Window {
    started_at: DateTime<Utc>,
    count: u32,
}

/// Allows at most `max_requests` per key in each window.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    /// A limiter allowing `max_requests` per key in each `window`.
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Builds a limiter from the `[rate_limit]` config section.
    ///
    /// # Errors
    /// `Config` if `window_secs` is not a representable duration.
    pub fn from_config(config: &RateLimitConfig) -> Result<Self> {
        let window = i64::try_from(config.window_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| Error::Config {
                message: format!(
                    "rate_limit.window_secs {} is out of range",
                    config.window_secs
                ),
            })?;
        Ok(Self::new(config.max_requests, window))
    }

    /// Counts one request for `key` at `now`.
    ///
    /// A key seen for the first time also sweeps out every lapsed window, so
    /// the map only holds keys active within the last window.
    ///
    /// # Errors
    /// `RateLimited` when the key has used up its window; the rejected request
    /// is not counted.
    pub async fn check(&self, key: &str, now: DateTime<Utc>) -> Result<()> {
        let mut windows = self.windows.lock().await;

        if !windows.contains_key(key) {
            windows.retain(|_, window| now - window.started_at < self.window);
        }

        let window = windows.entry(key.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        if now - window.started_at >= self.window {
            *window = Window {
                started_at: now,
                count: 0,
            };
        }

        if window.count >= self.max_requests {
            let reset_at = window.started_at + self.window;
            let retry_after_secs = u64::try_from((reset_at - now).num_seconds())
                .unwrap_or(0)
                .max(1);
            warn!("Rate limited {} for {}s", key, retry_after_secs);
            return Err(Error::RateLimited {
                key: key.to_string(),
                retry_after_secs,
            });
        }

        window.count += 1;
        debug!("{} used {}/{} requests", key, window.count, self.max_requests);
        Ok(())
    }

    /// Drops windows that ended before `now`.
    ///
    /// Returns how many were dropped.
    pub async fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| now - window.started_at < self.window);
        before - windows.len()
    }
}
