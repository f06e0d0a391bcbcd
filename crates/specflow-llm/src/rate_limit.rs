//! Sliding-window request limiter
//!
//! Owned by whoever constructs it and injected where needed; there is no
//! process-global counter.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Allows at most `max_requests` per `window` for each key.
///
/// Every `check` evicts timestamps older than the window for all keys and
/// drops keys with no remaining timestamps, so idle keys never accumulate.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `key` if the window has room.
    ///
    /// # Errors
    ///
    /// Returns the time until the oldest request in the window expires.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let window = self.window;
        let mut hits = self.lock();

        hits.retain(|_, stamps| {
            while stamps
                .front()
                .is_some_and(|t| now.duration_since(*t) >= window)
            {
                stamps.pop_front();
            }
            !stamps.is_empty()
        });

        let stamps = hits.entry(key.to_string()).or_default();
        if stamps.len() >= self.max_requests {
            let oldest = stamps.front().copied().unwrap_or(now);
            let retry_after = window.saturating_sub(now.duration_since(oldest));
            debug!(key, retry_after_ms = retry_after.as_millis() as u64, "rate limit window full");
            return Err(retry_after);
        }
        stamps.push_back(now);
        Ok(())
    }

    /// Forget all recorded requests for `key`
    pub fn reset(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Forget everything
    pub fn reset_all(&self) {
        self.lock().clear();
    }

    /// Number of keys with requests inside the window as of the last check
    #[must_use]
    pub fn tracked_keys(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, VecDeque<Instant>>> {
        self.hits
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_window_fills_then_recovers() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.check("a").is_ok());

        let wait = limiter.check("a").unwrap_err();
        assert_eq!(wait, Duration::from_secs(50));

        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(limiter.check("a").is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_keys_are_independent_and_evicted() {
        let limiter = RateLimiter::new(1, Duration::from_secs(5));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_ok());
        assert!(limiter.check("a").is_err());
        assert_eq!(limiter.tracked_keys(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(limiter.check("c").is_ok());
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        limiter.check("a").unwrap();
        limiter.reset("a");
        assert!(limiter.check("a").is_ok());
        limiter.reset_all();
        assert_eq!(limiter.tracked_keys(), 0);
    }
}
