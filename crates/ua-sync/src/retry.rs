//! Bounded retry with exponential backoff.

use std::time::Duration;

use ua_core::UsageEvent;

use crate::source::{SourceError, UsageSource};

/// Configuration for retry behavior on transient source errors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts before the last error surfaces (1 = no retries).
    pub max_attempts: u32,
    /// Base delay for exponential backoff in ms.
    pub base_delay_ms: u64,
    /// Cap on any single delay in ms.
    pub max_delay_ms: u64,
    /// Jitter range 0.0–1.0 applied symmetrically around the delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
            jitter_factor: 0.2,
        }
    }
}

/// Exponential backoff delay with jitter.
///
/// Formula: `min(max_delay, base_delay * 2^attempt) * (1 + (random*2-1) * jitter)`
/// where `random` is in `[0.0, 1.0)`.
#[must_use]
#[expect(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    reason = "delays are far below the f64 precision limit"
)]
pub fn backoff_delay_ms(attempt: u32, config: &RetryConfig, random: f64) -> u64 {
    let exponential = config.base_delay_ms.saturating_mul(1u64 << attempt.min(31));
    let capped = exponential.min(config.max_delay_ms);

    let jitter = (random * 2.0 - 1.0).mul_add(config.jitter_factor, 1.0);
    ((capped as f64) * jitter).round().max(0.0) as u64
}

/// Parse a `Retry-After` hint: integer seconds or an HTTP-date.
///
/// Returns the delay in milliseconds, or `None` if parsing fails.
#[must_use]
pub fn parse_retry_after(value: &str) -> Option<u64> {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Some(seconds * 1000);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay_ms = date
            .signed_duration_since(chrono::Utc::now())
            .num_milliseconds();
        return Some(u64::try_from(delay_ms).unwrap_or(0));
    }

    None
}

/// Fetches with bounded retry on transient errors.
///
/// Honors a source-provided retry-after hint when present (capped at the
/// configured maximum); otherwise backs off exponentially with jitter.
/// Exhausting the attempt ceiling surfaces the last error.
pub(crate) async fn fetch_with_retry<S: UsageSource>(
    source: &S,
    start_ms: i64,
    end_ms: i64,
    config: &RetryConfig,
) -> Result<Vec<UsageEvent>, SourceError> {
    let mut attempt = 0u32;
    loop {
        match source.fetch_usage_events(start_ms, end_ms).await {
            Ok(events) => return Ok(events),
            Err(error) => {
                attempt += 1;
                if attempt >= config.max_attempts.max(1) || !error.is_retryable() {
                    return Err(error);
                }

                let delay_ms = match &error {
                    SourceError::RateLimited {
                        retry_after_ms: Some(hint),
                    } => (*hint).min(config.max_delay_ms),
                    _ => backoff_delay_ms(attempt - 1, config, rand::random::<f64>()),
                };
                tracing::debug!(
                    source = source.source_id(),
                    attempt,
                    delay_ms,
                    error = %error,
                    "transient fetch error, backing off"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RetryConfig {
        RetryConfig {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            jitter_factor: 0.0,
        }
    }

    #[test]
    fn backoff_grows_exponentially() {
        let config = config();
        assert_eq!(backoff_delay_ms(0, &config, 0.5), 1_000);
        assert_eq!(backoff_delay_ms(1, &config, 0.5), 2_000);
        assert_eq!(backoff_delay_ms(2, &config, 0.5), 4_000);
        assert_eq!(backoff_delay_ms(3, &config, 0.5), 8_000);
    }

    #[test]
    fn backoff_caps_at_max() {
        let config = config();
        assert_eq!(backoff_delay_ms(10, &config, 0.5), 60_000);
        // Huge attempt numbers must not overflow.
        assert_eq!(backoff_delay_ms(100, &config, 0.5), 60_000);
    }

    #[test]
    fn jitter_spreads_symmetrically() {
        let config = RetryConfig {
            jitter_factor: 0.2,
            ..config()
        };
        assert_eq!(backoff_delay_ms(0, &config, 0.0), 800);
        assert_eq!(backoff_delay_ms(0, &config, 0.5), 1_000);
        assert_eq!(backoff_delay_ms(0, &config, 1.0), 1_200);
    }

    #[test]
    fn parse_retry_after_seconds() {
        assert_eq!(parse_retry_after("120"), Some(120_000));
        assert_eq!(parse_retry_after("0"), Some(0));
        assert_eq!(parse_retry_after(" 2 "), Some(2_000));
    }

    #[test]
    fn parse_retry_after_http_date() {
        let future = chrono::Utc::now() + chrono::Duration::minutes(5);
        let parsed = parse_retry_after(&future.to_rfc2822()).unwrap();
        assert!(parsed > 0);

        let past = chrono::Utc::now() - chrono::Duration::minutes(5);
        assert_eq!(parse_retry_after(&past.to_rfc2822()), Some(0));
    }

    #[test]
    fn parse_retry_after_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
        assert_eq!(parse_retry_after(""), None);
    }
}
