//! The external usage-event source capability.

use thiserror::Error;

use ua_core::UsageEvent;

/// Errors an external usage source can produce.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The source asked us to slow down, optionally saying for how long.
    #[error("rate limited by source")]
    RateLimited { retry_after_ms: Option<u64> },
    /// The request never completed (network, timeout).
    #[error("request failed: {0}")]
    Request(String),
    /// The source answered with an error.
    #[error("source API error: {message}")]
    Api { status: Option<u16>, message: String },
    /// No usable credentials; raised immediately, never retried.
    #[error("missing credentials: {0}")]
    Credentials(String),
    /// The source answered with something we could not understand.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl SourceError {
    /// Whether retrying the same request may succeed.
    ///
    /// Rate limits and transport failures are transient; server-side
    /// errors (5xx) usually are too. Everything else fails fast.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Request(_) => true,
            Self::Api {
                status: Some(status),
                ..
            } => *status >= 500,
            Self::Api { status: None, .. } | Self::Credentials(_) | Self::InvalidResponse(_) => {
                false
            }
        }
    }
}

/// An external provider of usage events.
///
/// Any two sources (e.g. an individual-auth source and an admin/org-auth
/// source) are treated uniformly through this one shape; the
/// [`source_id`](Self::source_id) tag keys the per-source sync cursor.
#[allow(async_fn_in_trait)]
pub trait UsageSource {
    /// Tag identifying this source in cursors and event records.
    fn source_id(&self) -> &str;

    /// Fetches all events in `[start_ms, end_ms]`.
    async fn fetch_usage_events(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageEvent>, SourceError>;
}
