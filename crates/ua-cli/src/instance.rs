//! IDE-instance identity management.
//!
//! Each IDE instance (one per open window) gets a persistent UUID stored
//! in `instance.json` in the data directory. The segmenter keys its
//! sessions on it, which is what makes the "one open session per
//! instance" invariant checkable across processes.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use ua_core::InstanceId;

/// Instance identity stored in `instance.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceIdentity {
    /// Persistent UUID for this IDE instance.
    pub instance_id: String,
    /// Human-friendly label (e.g. "devbox").
    pub label: String,
}

impl InstanceIdentity {
    /// The identity as a validated [`InstanceId`].
    pub fn id(&self) -> Result<InstanceId> {
        InstanceId::new(&self.instance_id).context("instance.json contains an empty instance ID")
    }
}

/// Returns the path to instance.json in the given data directory.
fn instance_json_path(data_dir: &Path) -> PathBuf {
    data_dir.join("instance.json")
}

/// Loads instance identity from instance.json.
///
/// Returns `None` if the file doesn't exist.
/// Returns an error if the file exists but is unreadable/unparseable.
pub fn load_instance_identity(data_dir: &Path) -> Result<Option<InstanceIdentity>> {
    let path = instance_json_path(data_dir);
    match std::fs::read_to_string(&path) {
        Ok(content) => {
            let identity: InstanceIdentity =
                serde_json::from_str(&content).context("failed to parse instance.json")?;
            Ok(Some(identity))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).context("failed to read instance.json"),
    }
}

/// Loads instance identity, failing with a helpful message if not found.
///
/// Use this in commands that require an identity (track).
pub fn require_instance_identity(data_dir: &Path) -> Result<InstanceIdentity> {
    load_instance_identity(data_dir)?.context("No instance identity found. Run 'ua init' first.")
}

/// Initializes instance identity.
///
/// If instance.json already exists, returns the existing identity
/// (updating the label if a new one is provided). If it doesn't exist,
/// generates a new UUID and writes instance.json.
pub fn init_instance(data_dir: &Path, label: Option<&str>) -> Result<InstanceIdentity> {
    let default_label = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    let identity = if let Some(mut existing) = load_instance_identity(data_dir)? {
        if let Some(new_label) = label {
            existing.label = new_label.to_string();
            save_to(data_dir, &existing)?;
        }
        existing
    } else {
        let identity = InstanceIdentity {
            instance_id: Uuid::new_v4().to_string(),
            label: label.map_or(default_label, String::from),
        };
        save_to(data_dir, &identity)?;
        identity
    };

    Ok(identity)
}

fn save_to(data_dir: &Path, identity: &InstanceIdentity) -> Result<()> {
    std::fs::create_dir_all(data_dir).context("failed to create data directory")?;
    let json =
        serde_json::to_string_pretty(identity).context("failed to serialize instance identity")?;
    std::fs::write(instance_json_path(data_dir), json).context("failed to write instance.json")?;
    Ok(())
}
