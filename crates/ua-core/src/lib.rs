//! Core domain logic for usage attribution.
//!
//! This crate contains the fundamental types and logic for:
//! - Attribution: deciding which project owns a usage event
//! - Session segmentation: turning host signals into session segments
//! - Project identification: deterministic keys from workspace identity

pub mod attribution;
pub mod budget;
pub mod event;
pub mod noncritical;
pub mod project;
pub mod segmenter;
pub mod session;
pub mod types;

pub use attribution::{AttributionRecord, attribute};
pub use budget::Budget;
pub use event::{TokenUsage, UsageEvent};
pub use noncritical::best_effort;
pub use project::{Project, WorkspaceIdentity};
pub use segmenter::{SegmentAction, Segmenter, SegmenterConfig};
pub use session::{ProjectSession, SessionPatch};
pub use types::{Confidence, EventId, InstanceId, ProjectKey, SessionId, ValidationError};
