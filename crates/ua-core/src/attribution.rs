//! Event-to-project attribution.
//!
//! [`attribute`] is a pure function over an event and the sessions that
//! could own it. The decision ladder prefers the strongest signal of
//! "this is where the user is working": a focused, non-idle session.
//! Ties are resolved by input order, never randomly, so re-attributing
//! the same input always yields the same decision.

use serde::{Deserialize, Serialize};

use crate::event::UsageEvent;
use crate::session::ProjectSession;
use crate::types::{Confidence, EventId, ProjectKey};

/// Attributions below this confidence (and unattributed ones) are flagged
/// for human review.
pub const REVIEW_THRESHOLD: f32 = 0.7;

/// Lower bound on conflicted confidence, keeping a conflicted decision
/// categorically above the unattributed score of 0.
pub const CONFLICT_CONFIDENCE_FLOOR: f32 = 0.05;

/// The attribution decision for one event.
///
/// At most one record is current per `event_id`; later appends supersede
/// earlier ones. `timestamp_ms` is the event's own timestamp, so the
/// record carries no wall-clock input and re-attribution is byte-stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributionRecord {
    pub event_id: EventId,
    /// Owning project, or the `unattributed` sentinel.
    pub project_key: ProjectKey,
    pub confidence: Confidence,
    pub reason: String,
    pub timestamp_ms: i64,
    /// Projects of every session that plausibly owned the event, when the
    /// decision was conflicted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<ProjectKey>,
}

impl AttributionRecord {
    /// Whether downstream consumers should surface this decision for
    /// review.
    #[must_use]
    pub fn needs_review(&self) -> bool {
        self.project_key.is_unattributed() || self.confidence.value() < REVIEW_THRESHOLD
    }
}

/// Attributes a usage event to the project that owned it when it occurred.
///
/// `sessions` may contain any sessions; only those active at the event's
/// timestamp participate. The ladder, first match wins:
///
/// 1. no active sessions → unattributed, confidence 0
/// 2. exactly one focused non-idle session → that project, 1.0
/// 3. exactly one focused session → that project, 0.9
/// 4. exactly one active session → that project, 0.7
/// 5. several focused sessions → first focused, `0.5 / n`, conflicts listed
/// 6. several active, none focused → first active, `0.5 / n`, conflicts listed
#[must_use]
pub fn attribute(event: &UsageEvent, sessions: &[ProjectSession]) -> AttributionRecord {
    let ts = event.timestamp_ms;
    let active: Vec<&ProjectSession> = sessions.iter().filter(|s| s.active_at(ts)).collect();

    if active.is_empty() {
        return AttributionRecord {
            event_id: event.event_id.clone(),
            project_key: ProjectKey::unattributed(),
            confidence: Confidence::MIN,
            reason: "no active sessions".to_string(),
            timestamp_ms: ts,
            conflicts: Vec::new(),
        };
    }

    let focused: Vec<&ProjectSession> = active.iter().filter(|s| s.focused).copied().collect();
    let engaged: Vec<&ProjectSession> = focused.iter().filter(|s| !s.idle).copied().collect();

    let decided = |session: &ProjectSession, confidence: f32, reason: &str| AttributionRecord {
        event_id: event.event_id.clone(),
        project_key: session.project_key.clone(),
        confidence: Confidence::clamped(confidence),
        reason: reason.to_string(),
        timestamp_ms: ts,
        conflicts: Vec::new(),
    };

    if engaged.len() == 1 {
        return decided(engaged[0], 1.0, "single focused active session");
    }
    if focused.len() == 1 {
        return decided(focused[0], 0.9, "single focused session");
    }
    if active.len() == 1 {
        return decided(active[0], 0.7, "single active session");
    }

    let (candidates, what) = if focused.is_empty() {
        (&active, "active")
    } else {
        (&focused, "focused")
    };
    conflicted(event, candidates, what)
}

#[expect(
    clippy::cast_precision_loss,
    reason = "conflict counts are far below f32 precision limits"
)]
fn conflicted(event: &UsageEvent, candidates: &[&ProjectSession], what: &str) -> AttributionRecord {
    let count = candidates.len();
    let confidence = (0.5 / count as f32).max(CONFLICT_CONFIDENCE_FLOOR);

    AttributionRecord {
        event_id: event.event_id.clone(),
        project_key: candidates[0].project_key.clone(),
        confidence: Confidence::clamped(confidence),
        reason: format!("conflict between {count} {what} sessions"),
        timestamp_ms: event.timestamp_ms,
        conflicts: candidates.iter().map(|s| s.project_key.clone()).collect(),
    }
}
