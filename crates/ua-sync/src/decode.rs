//! Boundary decoding of loosely-shaped source payloads.
//!
//! The connectors hand us whatever JSON their API returns; the schemas
//! drift. Decoding tries a sequence of field-name fallbacks, coerces to
//! strict types, and either produces a fully-typed [`UsageEvent`] or
//! rejects the item — untyped data never crosses into the log store.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use ua_core::{EventId, TokenUsage, UsageEvent};

const ID_FIELDS: &[&str] = &["eventId", "event_id", "id", "uuid"];
const TIMESTAMP_MS_FIELDS: &[&str] = &["timestampMs", "timestamp_ms"];
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "createdAt", "created_at", "time", "date"];
const MODEL_FIELDS: &[&str] = &["model", "modelId", "model_id", "modelName"];
const INPUT_TOKEN_FIELDS: &[&str] = &["inputTokens", "input_tokens", "promptTokens", "prompt_tokens"];
const OUTPUT_TOKEN_FIELDS: &[&str] = &[
    "outputTokens",
    "output_tokens",
    "completionTokens",
    "completion_tokens",
];
const CACHE_READ_FIELDS: &[&str] = &["cacheReadTokens", "cache_read_tokens", "cache_read_input_tokens"];
const CACHE_CREATE_FIELDS: &[&str] = &[
    "cacheCreationTokens",
    "cache_creation_tokens",
    "cache_creation_input_tokens",
];
const COST_CENTS_FIELDS: &[&str] = &["costCents", "cost_cents"];
const COST_DOLLAR_FIELDS: &[&str] = &["costUsd", "cost_usd", "cost", "amount"];

/// Timestamps at or above this magnitude are taken as milliseconds;
/// below it, as seconds. (10^11 ms is 1973; 10^11 s is year 5138.)
const MS_THRESHOLD: i64 = 100_000_000_000;

/// Decodes one payload item into a typed usage event.
///
/// Returns `None` when the item has no usable timestamp. A missing ID
/// falls back to a content hash so the event stays idempotently
/// re-ingestable; missing numeric fields become zero, a missing model
/// becomes `unknown`.
#[must_use]
pub fn decode_usage_event(value: &Value, source: &str) -> Option<UsageEvent> {
    let obj = value.as_object()?;

    let Some(timestamp_ms) = timestamp_ms(obj) else {
        tracing::debug!(source, "rejecting usage item without timestamp");
        return None;
    };

    let model = first_string(obj, MODEL_FIELDS).unwrap_or_else(|| "unknown".to_string());
    let tokens = TokenUsage {
        input_tokens: first_i64(obj, INPUT_TOKEN_FIELDS).unwrap_or(0).max(0),
        output_tokens: first_i64(obj, OUTPUT_TOKEN_FIELDS).unwrap_or(0).max(0),
        cache_read_tokens: first_i64(obj, CACHE_READ_FIELDS).unwrap_or(0).max(0),
        cache_creation_tokens: first_i64(obj, CACHE_CREATE_FIELDS).unwrap_or(0).max(0),
    };
    let cost_cents = cost_cents(obj);

    let id = first_string(obj, ID_FIELDS)
        .unwrap_or_else(|| content_hash_id(source, timestamp_ms, &model, &tokens, cost_cents));
    let event_id = EventId::new(id).ok()?;

    Some(UsageEvent {
        event_id,
        timestamp_ms,
        model,
        tokens,
        cost_cents,
        source: source.to_string(),
    })
}

/// First present field as a string; numeric IDs are stringified.
fn first_string(obj: &Map<String, Value>, fields: &[&str]) -> Option<String> {
    fields.iter().find_map(|field| match obj.get(*field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

/// First present field coerced to an integer: integer, rounded float, or
/// numeric string.
fn first_i64(obj: &Map<String, Value>, fields: &[&str]) -> Option<i64> {
    fields.iter().find_map(|field| coerce_i64(obj.get(*field)?))
}

#[expect(
    clippy::cast_possible_truncation,
    reason = "values are range-checked before the cast"
)]
fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && f.abs() < 9.0e18)
                .map(|f| f.round() as i64)
        }),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn first_f64(obj: &Map<String, Value>, fields: &[&str]) -> Option<f64> {
    fields.iter().find_map(|field| match obj.get(*field) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

/// Extracts the event timestamp in epoch milliseconds.
///
/// Tries explicit-ms fields first, then generic timestamp fields as
/// RFC 3339 strings or numbers (seconds vs milliseconds decided by
/// magnitude).
fn timestamp_ms(obj: &Map<String, Value>) -> Option<i64> {
    if let Some(ms) = first_i64(obj, TIMESTAMP_MS_FIELDS) {
        return Some(ms);
    }

    for field in TIMESTAMP_FIELDS {
        match obj.get(*field) {
            Some(Value::String(s)) => {
                if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
                    return Some(dt.timestamp_millis());
                }
                if let Ok(n) = s.trim().parse::<i64>() {
                    return Some(normalize_epoch(n));
                }
            }
            Some(value) => {
                if let Some(n) = coerce_i64(value) {
                    return Some(normalize_epoch(n));
                }
            }
            None => {}
        }
    }
    None
}

const fn normalize_epoch(n: i64) -> i64 {
    if n.abs() >= MS_THRESHOLD { n } else { n * 1000 }
}

/// Cost in integer cents, accepting either cents or dollar amounts.
#[expect(
    clippy::cast_possible_truncation,
    reason = "dollar amounts are rounded into range before the cast"
)]
fn cost_cents(obj: &Map<String, Value>) -> i64 {
    if let Some(cents) = first_i64(obj, COST_CENTS_FIELDS) {
        return cents.max(0);
    }
    first_f64(obj, COST_DOLLAR_FIELDS)
        .filter(|d| d.is_finite())
        .map_or(0, |dollars| ((dollars * 100.0).round() as i64).max(0))
}

/// Stable fallback ID for items whose source provides none.
fn content_hash_id(
    source: &str,
    timestamp_ms: i64,
    model: &str,
    tokens: &TokenUsage,
    cost_cents: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    hasher.update(timestamp_ms.to_le_bytes());
    hasher.update(model);
    hasher.update(tokens.input_tokens.to_le_bytes());
    hasher.update(tokens.output_tokens.to_le_bytes());
    hasher.update(tokens.cache_read_tokens.to_le_bytes());
    hasher.update(tokens.cache_creation_tokens.to_le_bytes());
    hasher.update(cost_cents.to_le_bytes());

    let digest = format!("{:x}", hasher.finalize());
    format!("{source}:{}", &digest[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_canonical_shape() {
        let item = json!({
            "eventId": "evt-1",
            "timestampMs": 1_700_000_000_000i64,
            "model": "claude-sonnet-4",
            "inputTokens": 120,
            "outputTokens": 45,
            "costCents": 3
        });

        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.event_id.as_str(), "evt-1");
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
        assert_eq!(event.tokens.input_tokens, 120);
        assert_eq!(event.cost_cents, 3);
        assert_eq!(event.source, "api");
    }

    #[test]
    fn decodes_snake_case_with_dollar_cost() {
        let item = json!({
            "id": "u-9",
            "created_at": "2024-01-15T12:00:00Z",
            "model_id": "claude-opus-4",
            "prompt_tokens": 10,
            "completion_tokens": 5,
            "cost_usd": 0.1234
        });

        let event = decode_usage_event(&item, "admin").unwrap();
        assert_eq!(event.event_id.as_str(), "u-9");
        assert_eq!(event.timestamp_ms, 1_705_320_000_000);
        assert_eq!(event.model, "claude-opus-4");
        assert_eq!(event.cost_cents, 12);
    }

    #[test]
    fn numeric_seconds_are_scaled_to_millis() {
        let item = json!({"id": "e", "timestamp": 1_700_000_000i64});
        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);

        let item = json!({"id": "e", "timestamp": 1_700_000_000_000i64});
        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
    }

    #[test]
    fn rejects_item_without_timestamp() {
        let item = json!({"id": "e", "model": "m"});
        assert!(decode_usage_event(&item, "api").is_none());
        assert!(decode_usage_event(&json!("not an object"), "api").is_none());
    }

    #[test]
    fn missing_id_falls_back_to_stable_content_hash() {
        let item = json!({"timestampMs": 1_000, "model": "m", "inputTokens": 5});
        let a = decode_usage_event(&item, "api").unwrap();
        let b = decode_usage_event(&item, "api").unwrap();
        assert_eq!(a.event_id, b.event_id);
        assert!(a.event_id.as_str().starts_with("api:"));

        // A different payload hashes differently.
        let other = json!({"timestampMs": 1_000, "model": "m", "inputTokens": 6});
        let c = decode_usage_event(&other, "api").unwrap();
        assert_ne!(a.event_id, c.event_id);
    }

    #[test]
    fn coerces_string_numbers() {
        let item = json!({
            "id": "e",
            "timestampMs": "1700000000000",
            "inputTokens": "42",
            "cost": "0.5"
        });
        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.timestamp_ms, 1_700_000_000_000);
        assert_eq!(event.tokens.input_tokens, 42);
        assert_eq!(event.cost_cents, 50);
    }

    #[test]
    fn negative_counts_are_floored_to_zero() {
        let item = json!({"id": "e", "timestampMs": 1_000, "inputTokens": -5, "cost_usd": -1.0});
        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.tokens.input_tokens, 0);
        assert_eq!(event.cost_cents, 0);
    }

    #[test]
    fn missing_model_becomes_unknown() {
        let item = json!({"id": "e", "timestampMs": 1_000});
        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.model, "unknown");
    }

    #[test]
    fn numeric_id_is_stringified() {
        let item = json!({"id": 12345, "timestampMs": 1_000});
        let event = decode_usage_event(&item, "api").unwrap();
        assert_eq!(event.event_id.as_str(), "12345");
    }
}
