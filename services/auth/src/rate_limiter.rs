//! Fixed-window rate limiter keyed by client identity

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Rate limiter configuration
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Requests allowed per client in one window
    pub max_requests: u32,
    /// Window length in seconds
    pub window_seconds: u64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window_seconds: 900, // 15 minutes
        }
    }
}

impl RateLimiterConfig {
    /// Create a new RateLimiterConfig from environment variables
    ///
    /// # Environment Variables
    /// - `RATE_LIMIT_MAX_REQUESTS`: Requests per window (default: 100)
    /// - `RATE_LIMIT_WINDOW_SECONDS`: Window length (default: 900)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_requests = std::env::var("RATE_LIMIT_MAX_REQUESTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_requests);

        let window_seconds = std::env::var("RATE_LIMIT_WINDOW_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(defaults.window_seconds);

        Self {
            max_requests,
            window_seconds,
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed { remaining: u32 },
    Throttled { retry_after: Duration },
}

/// Per-client window
#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Rate limiter
///
/// The counter for a client only grows within its window and resets when
/// the window elapses. The lock is held for the increment-and-compare only,
/// never across an await point.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimiterConfig,
    windows: Arc<Mutex<HashMap<String, Window>>>,
}

impl RateLimiter {
    /// Create a new rate limiter
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            config,
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Count a request from `client` and decide whether it may proceed
    pub async fn check(&self, client: &str) -> RateDecision {
        self.check_at(client, Instant::now()).await
    }

    async fn check_at(&self, client: &str, now: Instant) -> RateDecision {
        let window_len = self.config.window();
        let mut windows = self.windows.lock().await;

        let window = windows.entry(client.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });

        if now.duration_since(window.started) >= window_len {
            window.started = now;
            window.count = 0;
        }

        window.count = window.count.saturating_add(1);

        if window.count > self.config.max_requests {
            let retry_after = window_len.saturating_sub(now.duration_since(window.started));
            warn!(
                "Rate limit exceeded for {} ({} requests in window)",
                client, window.count
            );
            return RateDecision::Throttled { retry_after };
        }

        RateDecision::Allowed {
            remaining: self.config.max_requests - window.count,
        }
    }

    /// Drop windows that have fully elapsed
    pub async fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now()).await
    }

    async fn purge_expired_at(&self, now: Instant) -> usize {
        let window_len = self.config.window();
        let mut windows = self.windows.lock().await;
        let before = windows.len();
        windows.retain(|_, window| now.duration_since(window.started) < window_len);
        let purged = before - windows.len();
        if purged > 0 {
            debug!("Purged {} expired rate limit windows", purged);
        }
        purged
    }

    /// Get the rate limiter configuration
    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn limiter(max_requests: u32) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            max_requests,
            window_seconds: 60,
        })
    }

    #[tokio::test]
    async fn test_request_over_ceiling_is_throttled() {
        let limiter = limiter(3);
        let now = Instant::now();

        for expected_remaining in [2, 1, 0] {
            assert_eq!(
                limiter.check_at("10.0.0.1", now).await,
                RateDecision::Allowed {
                    remaining: expected_remaining
                }
            );
        }

        assert!(matches!(
            limiter.check_at("10.0.0.1", now).await,
            RateDecision::Throttled { .. }
        ));
    }

    #[tokio::test]
    async fn test_clients_are_counted_separately() {
        let limiter = limiter(1);
        let now = Instant::now();

        assert!(matches!(
            limiter.check_at("a", now).await,
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("b", now).await,
            RateDecision::Allowed { .. }
        ));
        assert!(matches!(
            limiter.check_at("a", now).await,
            RateDecision::Throttled { .. }
        ));
    }

    #[tokio::test]
    async fn test_window_boundary_resets_counter() {
        let limiter = limiter(1);
        let start = Instant::now();

        limiter.check_at("client", start).await;
        assert!(matches!(
            limiter.check_at("client", start + Duration::from_secs(30)).await,
            RateDecision::Throttled { retry_after } if retry_after == Duration::from_secs(30)
        ));
        assert!(matches!(
            limiter.check_at("client", start + Duration::from_secs(60)).await,
            RateDecision::Allowed { remaining: 0 }
        ));
    }

    #[tokio::test]
    async fn test_purge_drops_only_elapsed_windows() {
        let limiter = limiter(5);
        let start = Instant::now();

        limiter.check_at("old", start).await;
        limiter.check_at("fresh", start + Duration::from_secs(45)).await;

        let purged = limiter
            .purge_expired_at(start + Duration::from_secs(61))
            .await;
        assert_eq!(purged, 1);
        assert_eq!(limiter.windows.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_checks_never_exceed_ceiling() {
        let limiter = limiter(50);
        let handles: Vec<_> = (0..200)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move { limiter.check("shared").await })
            })
            .collect();

        let mut allowed = 0;
        for handle in handles {
            if matches!(handle.await.unwrap(), RateDecision::Allowed { .. }) {
                allowed += 1;
            }
        }
        assert_eq!(allowed, 50);
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        unsafe {
            std::env::set_var("RATE_LIMIT_MAX_REQUESTS", "7");
            std::env::set_var("RATE_LIMIT_WINDOW_SECONDS", "0");
        }

        let config = RateLimiterConfig::from_env();
        assert_eq!(config.max_requests, 7);
        assert_eq!(config.window_seconds, 900);

        unsafe {
            std::env::remove_var("RATE_LIMIT_MAX_REQUESTS");
            std::env::remove_var("RATE_LIMIT_WINDOW_SECONDS");
        }
    }
}
