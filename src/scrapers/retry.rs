//! Retry helpers for HTTP fetchers.
//!
//! Exponential backoff with Retry-After header support, shared by image
//! downloads and any other request that may hit a throttled host.

use std::time::Duration;

use reqwest::StatusCode;

/// Maximum backoff delay (seconds).
const MAX_BACKOFF_SECS: u64 = 60;

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?.trim();

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs.min(MAX_BACKOFF_SECS)));
    }

    // HTTP-date form is not honored; callers fall back to backoff.
    None
}

/// Calculate exponential backoff delay for a given attempt.
pub fn backoff_delay(attempt: u32, base_ms: u64) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    let delay_ms = base_ms.saturating_mul(factor);
    Duration::from_millis(delay_ms.min(MAX_BACKOFF_SECS * 1000))
}

/// Whether an HTTP status is worth retrying.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Bounded retry schedule for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_ms: u64) -> Self {
        Self {
            max_retries,
            base_ms,
        }
    }

    /// No retries at all.
    pub fn none() -> Self {
        Self::new(0, 0)
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// How long to wait before retrying after failed attempt `attempt`
    /// (zero-based). `None` once the retry budget is spent.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<&str>) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        Some(parse_retry_after(retry_after).unwrap_or_else(|| backoff_delay(attempt, self.base_ms)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_retry_after_seconds() {
        assert_eq!(parse_retry_after(Some("5")), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after(Some(" 0 ")), Some(Duration::from_secs(0)));
        assert_eq!(parse_retry_after(Some("100")), Some(Duration::from_secs(60))); // capped
    }

    #[test]
    fn test_parse_retry_after_invalid() {
        assert_eq!(parse_retry_after(None), None);
        assert_eq!(parse_retry_after(Some("invalid")), None);
        assert_eq!(parse_retry_after(Some("Wed, 21 Oct 2015 07:28:00 GMT")), None);
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(0, 1000), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1, 1000), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2, 1000), Duration::from_millis(4000));
        assert_eq!(backoff_delay(10, 1000), Duration::from_secs(60)); // capped
        assert_eq!(backoff_delay(80, 1000), Duration::from_secs(60));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[test]
    fn test_policy_budget() {
        let policy = RetryPolicy::new(2, 100);
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.delay_for(0, None), Some(Duration::from_millis(100)));
        assert_eq!(policy.delay_for(1, Some("3")), Some(Duration::from_secs(3)));
        assert_eq!(policy.delay_for(2, None), None);
        assert_eq!(RetryPolicy::none().delay_for(0, None), None);
    }
}
