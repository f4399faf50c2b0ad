//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

use ua_core::SegmenterConfig;
use ua_sync::{DEFAULT_LOOKBACK_MS, RetryConfig, SyncOptions};

/// Connection details for the external usage API.
#[derive(Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    /// Source tag used for the per-source sync cursor.
    #[serde(default = "default_source")]
    pub source: String,
}

fn default_source() -> String {
    "api".to_string()
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("base_url", &self.base_url)
            .field("source", &self.source)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

/// Application configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the logs, snapshots and derived index.
    pub data_dir: PathBuf,
    /// Inactivity duration before a session rotates to idle.
    pub idle_timeout_ms: i64,
    /// How often the tracking loop checks for idleness.
    pub idle_poll_interval_ms: u64,
    /// Lookback window subtracted from the sync resume point.
    pub lookback_ms: i64,
    /// External usage source; sync is unavailable without it.
    #[serde(default)]
    pub api: Option<ApiConfig>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("data_dir", &self.data_dir)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .field("idle_poll_interval_ms", &self.idle_poll_interval_ms)
            .field("lookback_ms", &self.lookback_ms)
            .field("api", &self.api)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            data_dir,
            idle_timeout_ms: SegmenterConfig::DEFAULT_IDLE_TIMEOUT_MS,
            idle_poll_interval_ms: 5_000,
            lookback_ms: DEFAULT_LOOKBACK_MS,
            api: None,
        }
    }
}

impl Config {
    /// Loads configuration from default locations.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(None)
    }

    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (UA_*)
        figment = figment.merge(Env::prefixed("UA_"));

        figment.extract()
    }

    /// Segmenter settings with the idle timeout clamped to its minimum.
    #[must_use]
    pub const fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig::new(self.idle_timeout_ms)
    }

    /// Sync tunables derived from this configuration.
    #[must_use]
    pub fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            lookback_ms: self.lookback_ms,
            retry: RetryConfig::default(),
        }
    }
}

/// Returns the platform-specific config directory for ua.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("ua"))
}

/// Returns the platform-specific data directory for ua.
///
/// On Linux: `~/.local/share/ua`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("ua"))
}
