//! Retry policy with exponential backoff and jitter
use crate::types::{
    BACKOFF_JITTER_RATIO, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_AFTER_SECS,
    DEFAULT_RETRY_BASE_DELAY, MAX_BACKOFF_DELAY, MAX_RATE_LIMIT_DELAY,
};
use rand::Rng;
use reqwest::StatusCode;
use reqwest::header::HeaderValue;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed per call, shared by 429, 5xx and network failures
    pub max_retries: u32,
    /// First exponential backoff step
    pub base_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Cap for server-advertised rate-limit waits
    pub max_rate_limit_delay: Duration,
    /// Upper bound of the random jitter, as a fraction of the exponential delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY),
            max_delay: Duration::from_millis(MAX_BACKOFF_DELAY),
            max_rate_limit_delay: Duration::from_millis(MAX_RATE_LIMIT_DELAY),
            jitter_ratio: BACKOFF_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            ..Default::default()
        }
    }

    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before retry number `retry_count` (1-based) of a 5xx or network failure
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let jitter = if self.jitter_ratio > 0.0 {
            rand::thread_rng().gen_range(0.0..=self.jitter_ratio)
        } else {
            0.0
        };
        self.backoff_delay_with_jitter(retry_count, jitter)
    }

    /// `min(base * 2^(retry_count - 1) * (1 + jitter), max_delay)`, jitter clamped to the ratio
    pub fn backoff_delay_with_jitter(&self, retry_count: u32, jitter: f64) -> Duration {
        let exponent = retry_count.saturating_sub(1).min(31) as i32;
        let exponential = self.base_delay.as_millis() as f64 * 2f64.powi(exponent);
        let jitter = exponential * jitter.clamp(0.0, self.jitter_ratio.max(0.0));
        let capped = (exponential + jitter).min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped as u64)
    }

    /// Wait for a 429, driven by the server's `Retry-After` seconds
    pub fn rate_limit_delay(&self, retry_after_secs: u64) -> Duration {
        Duration::from_secs(retry_after_secs).min(self.max_rate_limit_delay)
    }
}

/// Response classes, checked in this order by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClass {
    Success,
    Unauthorized,
    RateLimited,
    /// 5xx
    Retryable,
    /// Any other 4xx or unexpected status; never retried
    Fatal,
}

impl ResponseClass {
    pub fn of(status: StatusCode) -> Self {
        if status.is_success() {
            Self::Success
        } else if status == StatusCode::UNAUTHORIZED {
            Self::Unauthorized
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Self::RateLimited
        } else if status.is_server_error() {
            Self::Retryable
        } else {
            Self::Fatal
        }
    }
}

/// `Retry-After` in whole seconds; missing or unparseable values fall back to 1
pub fn parse_retry_after(value: Option<&HeaderValue>) -> u64 {
    value
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    #[test]
    fn test_backoff_doubles_from_base() {
        let policy = RetryPolicy::default();

        assert_eq!(ms(policy.backoff_delay_with_jitter(1, 0.0)), 1000);
        assert_eq!(ms(policy.backoff_delay_with_jitter(2, 0.0)), 2000);
        assert_eq!(ms(policy.backoff_delay_with_jitter(3, 0.0)), 4000);
    }

    #[test]
    fn test_backoff_is_capped_with_jitter() {
        let policy = RetryPolicy::default();

        assert_eq!(ms(policy.backoff_delay_with_jitter(4, 0.1)), 8800);
        assert_eq!(ms(policy.backoff_delay_with_jitter(5, 0.1)), 10_000);
        assert_eq!(ms(policy.backoff_delay_with_jitter(40, 0.0)), 10_000);
    }

    #[test]
    fn test_jitter_is_clamped_to_ratio() {
        let policy = RetryPolicy::default();
        assert_eq!(ms(policy.backoff_delay_with_jitter(1, 5.0)), 1100);
        assert_eq!(ms(policy.backoff_delay_with_jitter(1, -1.0)), 1000);
    }

    #[test]
    fn test_random_backoff_stays_within_jitter_bound() {
        let policy = RetryPolicy::default();
        for retry in 1..=3u32 {
            let floor = 1000 * 2u64.pow(retry - 1);
            for _ in 0..50 {
                let delay = ms(policy.backoff_delay(retry));
                assert!(delay >= floor && delay <= floor + floor / 10, "{delay}");
            }
        }
    }

    #[test]
    fn test_rate_limit_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.rate_limit_delay(2), Duration::from_secs(2));
        assert_eq!(policy.rate_limit_delay(120), Duration::from_secs(30));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn test_classification() {
        assert_eq!(ResponseClass::of(StatusCode::OK), ResponseClass::Success);
        assert_eq!(ResponseClass::of(StatusCode::NO_CONTENT), ResponseClass::Success);
        assert_eq!(ResponseClass::of(StatusCode::UNAUTHORIZED), ResponseClass::Unauthorized);
        assert_eq!(ResponseClass::of(StatusCode::TOO_MANY_REQUESTS), ResponseClass::RateLimited);
        assert_eq!(ResponseClass::of(StatusCode::BAD_GATEWAY), ResponseClass::Retryable);
        assert_eq!(ResponseClass::of(StatusCode::NOT_FOUND), ResponseClass::Fatal);
        assert_eq!(ResponseClass::of(StatusCode::FORBIDDEN), ResponseClass::Fatal);
    }

    #[test]
    fn test_retry_after_parsing() {
        assert_eq!(parse_retry_after(Some(&HeaderValue::from_static("2"))), 2);
        assert_eq!(parse_retry_after(Some(&HeaderValue::from_static(" 7 "))), 7);
        assert_eq!(parse_retry_after(Some(&HeaderValue::from_static("soon"))), 1);
        assert_eq!(parse_retry_after(None), 1);
    }
}
