use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FloeError, Result};
use crate::id::StorageId;
use crate::store::{Blob, ObjectKind, ObjectStore};

/// The root object of one backup run, stored under the `snapshot` kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<StorageId>,
    /// Root tree, carried with both ids so a later run can load it.
    pub tree: Blob,
    /// Backed-up paths, sorted.
    pub paths: Vec<String>,
    pub hostname: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Snapshot {
    /// Load and decode a snapshot object by storage id.
    pub fn load(store: &dyn ObjectStore, storage: &StorageId) -> Result<Snapshot> {
        let data = store
            .load(ObjectKind::Snapshot, storage)
            .map_err(|_| FloeError::SnapshotNotFound(storage.to_hex()))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Serialize canonically and write to the store.
    pub fn save(&self, store: &dyn ObjectStore) -> Result<Blob> {
        let mut data = serde_json::to_vec(self)?;
        data.push(b'\n');
        store.save_json(ObjectKind::Snapshot, &data)
    }
}

/// Return the system hostname, or `"unknown"` if it cannot be determined.
pub(crate) fn hostname() -> String {
    #[cfg(unix)]
    {
        nix::unistd::gethostname()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".into())
    }

    #[cfg(windows)]
    {
        std::env::var("COMPUTERNAME").unwrap_or_else(|_| "unknown".into())
    }
}

pub(crate) fn username() -> String {
    std::env::var("USER").unwrap_or_else(|_| "unknown".into())
}
