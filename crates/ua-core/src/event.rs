//! Usage events pulled from external assistant-usage sources.

use serde::{Deserialize, Serialize};

use crate::types::EventId;

/// Token counts for a single assistant invocation.
///
/// All counts default to zero so that sources which omit a category still
/// decode into a fully-typed record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: i64,
    #[serde(default)]
    pub output_tokens: i64,
    #[serde(default)]
    pub cache_read_tokens: i64,
    #[serde(default)]
    pub cache_creation_tokens: i64,
}

impl TokenUsage {
    /// Total tokens across all categories.
    #[must_use]
    pub const fn total(&self) -> i64 {
        self.input_tokens
            + self.output_tokens
            + self.cache_read_tokens
            + self.cache_creation_tokens
    }
}

/// A single external usage record (one assistant invocation).
///
/// `event_id` is globally unique; ingesting the same ID twice must be a
/// no-op. Cost is carried in integer minor-currency units to avoid float
/// drift in rollups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageEvent {
    pub event_id: EventId,
    pub timestamp_ms: i64,
    /// Model identifier as reported by the source.
    #[serde(default = "unknown_model")]
    pub model: String,
    #[serde(default)]
    pub tokens: TokenUsage,
    /// Cost in minor currency units (cents).
    #[serde(default)]
    pub cost_cents: i64,
    /// Tag of the source this event was fetched from.
    #[serde(default)]
    pub source: String,
}

fn unknown_model() -> String {
    "unknown".to_string()
}
