//! Thin HTTP usage source.
//!
//! A minimal client for JSON usage APIs; the interesting work happens in
//! [`crate::decode`], which turns whatever shape the endpoint returns
//! into typed events.

use std::fmt;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::RETRY_AFTER;
use serde_json::Value;

use ua_core::UsageEvent;

use crate::decode::decode_usage_event;
use crate::retry::parse_retry_after;
use crate::source::{SourceError, UsageSource};

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Keys under which usage APIs commonly nest their item array.
const ITEM_KEYS: &[&str] = &["events", "data", "items", "usage"];

/// HTTP-backed usage-event source.
///
/// # Thread Safety
///
/// The source is safe to clone and share across tasks; clones share the
/// underlying HTTP connection pool.
#[derive(Clone)]
pub struct HttpSource {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    source_id: String,
}

impl fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpSource")
            .field("base_url", &self.base_url)
            .field("source_id", &self.source_id)
            .field("api_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl HttpSource {
    /// Creates a source for the given endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Credentials`] immediately when the API key
    /// is empty or whitespace-only; this is never retried.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        source_id: impl Into<String>,
    ) -> Result<Self, SourceError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SourceError::Credentials(
                "API key cannot be empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Request(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            source_id: source_id.into(),
        })
    }
}

impl UsageSource for HttpSource {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    async fn fetch_usage_events(
        &self,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Vec<UsageEvent>, SourceError> {
        let response = self
            .http
            .get(format!("{}/v1/usage_events", self.base_url))
            .query(&[
                ("start_ms", start_ms.to_string()),
                ("end_ms", end_ms.to_string()),
            ])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(SourceError::RateLimited { retry_after_ms });
        }

        let body = response
            .text()
            .await
            .map_err(|e| SourceError::Request(e.to_string()))?;
        if !status.is_success() {
            return Err(SourceError::Api {
                status: Some(status.as_u16()),
                message: body.chars().take(200).collect(),
            });
        }

        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| SourceError::InvalidResponse(e.to_string()))?;
        let items = extract_items(&payload).ok_or_else(|| {
            SourceError::InvalidResponse("response contains no event array".to_string())
        })?;

        let events: Vec<UsageEvent> = items
            .iter()
            .filter_map(|item| decode_usage_event(item, &self.source_id))
            .collect();
        if events.len() < items.len() {
            tracing::warn!(
                source = self.source_id,
                rejected = items.len() - events.len(),
                "rejected undecodable usage items"
            );
        }
        Ok(events)
    }
}

/// Finds the item array in a payload: either the payload itself or one of
/// the conventional wrapper keys.
fn extract_items(payload: &Value) -> Option<&Vec<Value>> {
    if let Value::Array(items) = payload {
        return Some(items);
    }
    ITEM_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(Value::as_array))
}
