//! Session segmentation state machine.
//!
//! One [`Segmenter`] runs per IDE instance and turns host signals
//! (workspace changes, focus changes, activity, idle polling) into session
//! segment opens and closes. Focus and idle flips *rotate* the open
//! segment (close + reopen) so every segment carries a single stable
//! (project, focused, idle) triple, which is what the attribution
//! confidence tiers depend on.
//!
//! The segmenter is pure over its inputs: it returns [`SegmentAction`]s
//! for the caller to persist and never touches storage itself.

use crate::project::WorkspaceIdentity;
use crate::session::ProjectSession;
use crate::types::{InstanceId, ProjectKey, SessionId};

/// Configuration for session segmentation.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Inactivity duration after which a segment rotates to idle.
    pub idle_timeout_ms: i64,
}

impl SegmenterConfig {
    /// Lower bound on the idle timeout (30 s).
    pub const MIN_IDLE_TIMEOUT_MS: i64 = 30_000;

    /// Default idle timeout (120 s).
    pub const DEFAULT_IDLE_TIMEOUT_MS: i64 = 120_000;

    /// Creates a config, clamping the timeout to the minimum.
    #[must_use]
    pub const fn new(idle_timeout_ms: i64) -> Self {
        let idle_timeout_ms = if idle_timeout_ms < Self::MIN_IDLE_TIMEOUT_MS {
            Self::MIN_IDLE_TIMEOUT_MS
        } else {
            idle_timeout_ms
        };
        Self { idle_timeout_ms }
    }
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: Self::DEFAULT_IDLE_TIMEOUT_MS,
        }
    }
}

/// A storage action produced by the segmenter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentAction {
    /// Persist a newly opened session segment.
    Open(ProjectSession),
    /// Close an existing segment at the given time.
    Close { id: SessionId, end_ms: i64 },
}

/// Per-instance session segmentation state machine.
///
/// States: no session, or exactly one open segment. A segment is opened
/// when a workspace becomes current and rotated whenever its focus or
/// idle state would change.
#[derive(Debug)]
pub struct Segmenter {
    instance_id: InstanceId,
    config: SegmenterConfig,
    current: Option<ProjectSession>,
    focused: bool,
    last_activity_ms: i64,
}

impl Segmenter {
    /// Creates a segmenter for one IDE instance.
    ///
    /// A freshly launched instance is assumed focused until the host says
    /// otherwise.
    #[must_use]
    pub const fn new(instance_id: InstanceId, config: SegmenterConfig) -> Self {
        Self {
            instance_id,
            config,
            current: None,
            focused: true,
            last_activity_ms: 0,
        }
    }

    /// The currently open segment, if any.
    #[must_use]
    pub const fn current(&self) -> Option<&ProjectSession> {
        self.current.as_ref()
    }

    /// The workspace became `workspace` (or closed entirely, `None`).
    ///
    /// No-op when the project identity is unchanged and a segment is
    /// already open.
    pub fn on_workspace_changed(
        &mut self,
        workspace: Option<&WorkspaceIdentity>,
        now_ms: i64,
    ) -> Vec<SegmentAction> {
        self.last_activity_ms = now_ms;

        let key = workspace.map(WorkspaceIdentity::project_key);
        if let (Some(current), Some(key)) = (&self.current, &key) {
            if current.project_key == *key {
                return Vec::new();
            }
        }

        let mut actions = self.close_current(now_ms);
        if let Some(key) = key {
            actions.push(self.open_segment(key, self.focused, false, now_ms));
        }
        actions
    }

    /// The IDE window gained or lost focus.
    ///
    /// Focus events count as activity: they reset the idle clock, so the
    /// rotated segment always starts non-idle.
    pub fn on_focus_changed(&mut self, focused: bool, now_ms: i64) -> Vec<SegmentAction> {
        self.focused = focused;
        self.last_activity_ms = now_ms;
        self.sync_segment(focused, false, now_ms)
    }

    /// A document edit, active-editor change, or similar activity signal.
    ///
    /// Resets the idle clock and clears idle; rotates only when the idle
    /// flag actually flips.
    pub fn on_activity(&mut self, now_ms: i64) -> Vec<SegmentAction> {
        self.last_activity_ms = now_ms;
        self.sync_segment(self.focused, false, now_ms)
    }

    /// Periodic idle check.
    ///
    /// Rotates the open segment to idle once the timeout has elapsed with
    /// no tracked activity.
    pub fn poll_idle(&mut self, now_ms: i64) -> Vec<SegmentAction> {
        let timed_out = now_ms.saturating_sub(self.last_activity_ms) >= self.config.idle_timeout_ms;
        match &self.current {
            Some(current) if !current.idle && timed_out => {
                self.sync_segment(self.focused, true, now_ms)
            }
            _ => Vec::new(),
        }
    }

    /// The IDE instance is shutting down; close the open segment.
    pub fn dispose(&mut self, now_ms: i64) -> Vec<SegmentAction> {
        self.close_current(now_ms)
    }

    /// Rotates the open segment when its (focused, idle) state differs
    /// from the target. A rotation closes the segment and opens a new one
    /// for the same project at the same instant.
    fn sync_segment(&mut self, focused: bool, idle: bool, now_ms: i64) -> Vec<SegmentAction> {
        let Some(current) = &self.current else {
            return Vec::new();
        };
        if current.focused == focused && current.idle == idle {
            return Vec::new();
        }

        let project_key = current.project_key.clone();
        let mut actions = self.close_current(now_ms);
        actions.push(self.open_segment(project_key, focused, idle, now_ms));
        actions
    }

    fn close_current(&mut self, now_ms: i64) -> Vec<SegmentAction> {
        self.current.take().map_or_else(Vec::new, |current| {
            vec![SegmentAction::Close {
                id: current.id,
                end_ms: now_ms,
            }]
        })
    }

    fn open_segment(
        &mut self,
        project_key: ProjectKey,
        focused: bool,
        idle: bool,
        now_ms: i64,
    ) -> SegmentAction {
        let session = ProjectSession {
            id: SessionId::new(uuid::Uuid::new_v4().to_string())
                .expect("UUID v4 string is never empty"),
            project_key,
            start_ms: now_ms,
            end_ms: None,
            focused,
            idle,
            instance_id: self.instance_id.clone(),
        };
        self.current = Some(session.clone());
        SegmentAction::Open(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segmenter() -> Segmenter {
        Segmenter::new(InstanceId::new("window-1").unwrap(), SegmenterConfig::default())
    }

    fn workspace(path: &str) -> WorkspaceIdentity {
        WorkspaceIdentity::new(path, None)
    }

    fn open_session(actions: &[SegmentAction]) -> &ProjectSession {
        actions
            .iter()
            .find_map(|a| match a {
                SegmentAction::Open(s) => Some(s),
                SegmentAction::Close { .. } => None,
            })
            .expect("expected an open action")
    }

    #[test]
    fn first_workspace_opens_session() {
        let mut seg = segmenter();
        let actions = seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);

        assert_eq!(actions.len(), 1);
        let session = open_session(&actions);
        assert_eq!(session.start_ms, 0);
        assert!(session.focused);
        assert!(!session.idle);
        assert!(session.is_open());
    }

    #[test]
    fn unchanged_workspace_is_noop() {
        let mut seg = segmenter();
        seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        let actions = seg.on_workspace_changed(Some(&workspace("/proj-a")), 100);
        assert!(actions.is_empty());
    }

    #[test]
    fn workspace_switch_closes_and_reopens() {
        let mut seg = segmenter();
        let first = seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        let first_id = open_session(&first).id.clone();

        let actions = seg.on_workspace_changed(Some(&workspace("/proj-b")), 300);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            SegmentAction::Close {
                id: first_id,
                end_ms: 300
            }
        );
        let session = open_session(&actions);
        assert_eq!(session.start_ms, 300);
        assert_eq!(session.project_key, workspace("/proj-b").project_key());
    }

    #[test]
    fn focus_change_rotates_at_boundary() {
        let mut seg = segmenter();
        let first = seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        let first_session = open_session(&first).clone();

        let actions = seg.on_focus_changed(false, 500);
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0],
            SegmentAction::Close {
                id: first_session.id.clone(),
                end_ms: 500
            }
        );
        let rotated = open_session(&actions);
        assert_eq!(rotated.start_ms, 500);
        assert_eq!(rotated.project_key, first_session.project_key);
        assert!(!rotated.focused);
        assert_ne!(rotated.id, first_session.id);
    }

    #[test]
    fn redundant_focus_signal_does_not_rotate() {
        let mut seg = segmenter();
        seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        let actions = seg.on_focus_changed(true, 500);
        assert!(actions.is_empty());
    }

    #[test]
    fn idle_timeout_rotates_to_idle() {
        let mut seg = segmenter();
        seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);

        // Before the timeout nothing happens.
        assert!(seg.poll_idle(100_000).is_empty());

        let actions = seg.poll_idle(120_000);
        assert_eq!(actions.len(), 2);
        let rotated = open_session(&actions);
        assert!(rotated.idle);
        assert!(rotated.focused);

        // Already idle: polling again is a no-op.
        assert!(seg.poll_idle(400_000).is_empty());
    }

    #[test]
    fn activity_clears_idle_by_rotating() {
        let mut seg = segmenter();
        seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        seg.poll_idle(120_000);

        let actions = seg.on_activity(130_000);
        assert_eq!(actions.len(), 2);
        assert!(!open_session(&actions).idle);

        // Activity while already non-idle only resets the clock.
        assert!(seg.on_activity(131_000).is_empty());
        assert!(seg.poll_idle(200_000).is_empty());
        assert_eq!(seg.poll_idle(251_000).len(), 2);
    }

    #[test]
    fn dispose_closes_open_segment() {
        let mut seg = segmenter();
        let first = seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        let id = open_session(&first).id.clone();

        let actions = seg.dispose(900);
        assert_eq!(actions, vec![SegmentAction::Close { id, end_ms: 900 }]);
        assert!(seg.current().is_none());
        assert!(seg.dispose(950).is_empty());
    }

    #[test]
    fn closing_workspace_ends_session() {
        let mut seg = segmenter();
        seg.on_workspace_changed(Some(&workspace("/proj-a")), 0);
        let actions = seg.on_workspace_changed(None, 400);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], SegmentAction::Close { end_ms: 400, .. }));
    }

    #[test]
    fn config_clamps_idle_timeout() {
        let config = SegmenterConfig::new(1_000);
        assert_eq!(config.idle_timeout_ms, SegmenterConfig::MIN_IDLE_TIMEOUT_MS);

        let config = SegmenterConfig::new(600_000);
        assert_eq!(config.idle_timeout_ms, 600_000);
    }
}
