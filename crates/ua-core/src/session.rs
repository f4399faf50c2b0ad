//! Project session segments and partial-update patches.

use serde::{Deserialize, Serialize};

use crate::types::{InstanceId, ProjectKey, SessionId};

/// One contiguous interval of a workspace being current in one IDE
/// instance, with a stable focus/idle state.
///
/// Sessions from different instances may overlap freely; at most one open
/// session exists per instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSession {
    pub id: SessionId,
    pub project_key: ProjectKey,
    pub start_ms: i64,
    /// Absent while the session is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<i64>,
    pub focused: bool,
    pub idle: bool,
    pub instance_id: InstanceId,
}

impl ProjectSession {
    /// Whether the session has not been closed yet.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.end_ms.is_none()
    }

    /// Whether the session covers the given timestamp.
    ///
    /// An open session extends to +∞.
    #[must_use]
    pub fn active_at(&self, timestamp_ms: i64) -> bool {
        self.start_ms <= timestamp_ms && self.end_ms.is_none_or(|end| timestamp_ms <= end)
    }
}

/// A partial update to an existing session.
///
/// Updates are appended as intents and folded onto the `create` record in
/// append order when the session is reconstructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_ms: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focused: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle: Option<bool>,
}

impl SessionPatch {
    /// A patch that closes the session at the given time.
    #[must_use]
    pub const fn close_at(end_ms: i64) -> Self {
        Self {
            end_ms: Some(end_ms),
            focused: None,
            idle: None,
        }
    }

    /// Applies this patch to a session.
    pub fn apply(&self, session: &mut ProjectSession) {
        if let Some(end_ms) = self.end_ms {
            session.end_ms = Some(end_ms);
        }
        if let Some(focused) = self.focused {
            session.focused = focused;
        }
        if let Some(idle) = self.idle {
            session.idle = idle;
        }
    }
}
