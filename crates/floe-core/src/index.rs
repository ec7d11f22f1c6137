use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::id::ContentId;
use crate::store::Blob;

/// In-memory index of known blobs, keyed by content id.
///
/// The index is the dedup authority for one snapshot operation: savers
/// probe it before uploading and insert after. For a given content id at
/// most one record is retained; concurrent inserts of the same id resolve
/// to the first writer, and every caller receives that canonical record.
/// All operations lock internally, so no lock is ever held across I/O.
#[derive(Debug, Default)]
pub struct BlobIndex {
    entries: Mutex<HashMap<ContentId, Blob>>,
}

impl BlobIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a blob and return the canonical record for its content id.
    ///
    /// If the id is already present the existing record is returned
    /// unchanged; callers detect a lost race by comparing storage ids.
    pub fn insert(&self, blob: Blob) -> Blob {
        let mut entries = self.entries.lock().unwrap();
        *entries.entry(blob.id).or_insert(blob)
    }

    /// Look up the canonical record for a content id.
    pub fn find_id(&self, id: &ContentId) -> Option<Blob> {
        self.entries.lock().unwrap().get(id).copied()
    }

    /// Remove the record for a content id, if any.
    pub fn delete_id(&self, id: &ContentId) {
        self.entries.lock().unwrap().remove(id);
    }

    /// Merge all of `other`'s records into this index, following the same
    /// first-writer-wins rule as [`insert`](Self::insert).
    pub fn merge(&self, other: &BlobIndex) {
        let other_entries: Vec<Blob> = other.entries.lock().unwrap().values().copied().collect();
        let mut entries = self.entries.lock().unwrap();
        for blob in other_entries {
            entries.entry(blob.id).or_insert(blob);
        }
    }

    /// Retain only records whose content id is in `keep`. Returns the
    /// number of records removed.
    pub fn prune(&self, keep: &HashSet<ContentId>) -> usize {
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|id, _| keep.contains(id));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }

    /// All content ids currently indexed, in unspecified order.
    pub fn ids(&self) -> Vec<ContentId> {
        self.entries.lock().unwrap().keys().copied().collect()
    }
}

// Serialized as a list of blobs sorted by content id, so that a tree's
// embedded index always encodes to the same bytes.
impl Serialize for BlobIndex {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut blobs: Vec<Blob> = self.entries.lock().unwrap().values().copied().collect();
        blobs.sort_by(|a, b| a.id.cmp(&b.id));
        blobs.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for BlobIndex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let blobs = Vec::<Blob>::deserialize(deserializer)?;
        let index = BlobIndex::new();
        for blob in blobs {
            index.insert(blob);
        }
        Ok(index)
    }
}
