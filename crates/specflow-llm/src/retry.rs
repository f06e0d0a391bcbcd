//! Retry policy for outbound requests

use std::time::Duration;

/// Longest `Retry-After` honoured unless the backoff itself is longer.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Retry bound and backoff base.
///
/// Attempt `n` (0-based) that fails transiently waits `base_delay * 2^(n+1)`
/// before attempt `n + 1`, so the default schedule is 2s, 4s, 8s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Exponential backoff after failed attempt `attempt`
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_add(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Delay before retrying a 429. `Retry-After` wins when present and
    /// parseable, capped at [`MAX_RETRY_AFTER`] or the backoff, whichever
    /// is longer.
    #[must_use]
    pub fn rate_limit_delay(&self, attempt: u32, retry_after: Option<&str>) -> Duration {
        let backoff = self.backoff(attempt);
        match retry_after.and_then(parse_retry_after) {
            Some(requested) => requested.min(backoff.max(MAX_RETRY_AFTER)),
            None => backoff,
        }
    }

    /// Whether another attempt is allowed after failed attempt `attempt`
    #[must_use]
    pub const fn can_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Parse a `Retry-After` header given in delta-seconds.
///
/// Fractional seconds are accepted. HTTP-date values are not supported and
/// yield `None`.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    value
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(|secs| Duration::from_millis((secs * 1000.0).round() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_secs(2));
        assert_eq!(policy.backoff(1), Duration::from_secs(4));
        assert_eq!(policy.backoff(2), Duration::from_secs(8));
    }

    #[test]
    fn test_retry_after_overrides_backoff() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(0, Some("5")), Duration::from_secs(5));
        assert_eq!(policy.rate_limit_delay(0, Some("0.5")), Duration::from_millis(500));
        assert_eq!(policy.rate_limit_delay(1, None), Duration::from_secs(4));
        assert_eq!(
            policy.rate_limit_delay(1, Some("Wed, 21 Oct 2015 07:28:00 GMT")),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_retry_after_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(0, Some("86400")), MAX_RETRY_AFTER);
        assert_eq!(policy.rate_limit_delay(0, Some("1e12")), MAX_RETRY_AFTER);

        let slow = RetryPolicy::new(3, Duration::from_secs(40));
        assert_eq!(slow.rate_limit_delay(0, Some("86400")), Duration::from_secs(80));
    }

    #[test]
    fn test_can_retry_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(2));
        assert!(!policy.can_retry(3));
        assert!(!RetryPolicy::new(0, Duration::ZERO).can_retry(0));
    }

    #[test]
    fn test_parse_retry_after_rejects_garbage() {
        assert_eq!(parse_retry_after(" 2 "), Some(Duration::from_secs(2)));
        assert_eq!(parse_retry_after("-1"), None);
        assert_eq!(parse_retry_after("soon"), None);
    }
}
