//! External usage-source integration.
//!
//! Pulls usage events from third-party APIs through one capability shape
//! ([`UsageSource`]), normalizes their loosely-shaped payloads into typed
//! [`ua_core::UsageEvent`]s at the boundary, and merges them durably and
//! idempotently via the [`coordinator`].

pub mod coordinator;
pub mod decode;
pub mod http;
pub mod retry;
pub mod source;

pub use coordinator::{DEFAULT_LOOKBACK_MS, SyncError, SyncOptions, SyncReport, sync_source};
pub use decode::decode_usage_event;
pub use http::HttpSource;
pub use retry::RetryConfig;
pub use source::{SourceError, UsageSource};
