use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::id::{ContentId, StorageId};

/// Namespace an object is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Data,
    Tree,
    Snapshot,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Data => "data",
            ObjectKind::Tree => "tree",
            ObjectKind::Snapshot => "snapshot",
        }
    }
}

/// Record of one stored object: ciphertext addressed by `storage`,
/// plaintext identity `id`, plaintext length `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub kind: ObjectKind,
    pub id: ContentId,
    pub storage: StorageId,
    pub size: u64,
}

/// Abstract content-addressed object store.
///
/// The store owns encryption: callers hand over plaintext and a
/// precomputed content id, the store returns a [`Blob`] carrying the
/// storage id it assigned to the ciphertext. Saving the same plaintext
/// twice yields two distinct storage ids. Implementations must be safe
/// for concurrent callers.
pub trait ObjectStore: Send + Sync {
    /// Stream `reader` (exactly `length` bytes of plaintext with content
    /// id `id`) through encryption into the store.
    fn save_from(
        &self,
        kind: ObjectKind,
        id: ContentId,
        length: u64,
        reader: &mut dyn Read,
    ) -> Result<Blob>;

    /// Store an already-serialized canonical document. The store derives
    /// the content id from `data` itself.
    fn save_json(&self, kind: ObjectKind, data: &[u8]) -> Result<Blob>;

    /// Fetch and decrypt an object's plaintext by storage id.
    fn load(&self, kind: ObjectKind, storage: &StorageId) -> Result<Vec<u8>>;

    /// Check whether an object exists.
    fn test(&self, kind: ObjectKind, storage: &StorageId) -> Result<bool>;

    /// Delete an object. Removing a missing object is not an error.
    fn remove(&self, kind: ObjectKind, storage: &StorageId) -> Result<()>;

    /// Invoke `f` with the storage id of every object of `kind`.
    fn each_id(&self, kind: ObjectKind, f: &mut dyn FnMut(StorageId)) -> Result<()>;
}
