use std::io::Read;

use tracing::debug;

use crate::error::Result;
use crate::id::ContentId;
use crate::node::Tree;
use crate::store::{Blob, ObjectKind};

use super::Archiver;

impl Archiver {
    /// Save one blob with single-flight deduplication by content id.
    ///
    /// The returned record is canonical: `find_id(id)` yields the same
    /// record for the rest of the snapshot. If the id is already indexed
    /// the reader is not touched. Concurrent saves of the same plaintext
    /// may both upload; the index decides the winner and the loser's
    /// redundant object is removed, so redundancy is never observable
    /// downstream.
    pub fn save(
        &self,
        kind: ObjectKind,
        id: ContentId,
        length: u64,
        reader: &mut dyn Read,
    ) -> Result<Blob> {
        if let Some(existing) = self.index.find_id(&id) {
            debug!(kind = kind.as_str(), id = %id, "blob already known, skipping upload");
            return Ok(existing);
        }

        let blob = self.store.save_from(kind, id, length, reader)?;

        let canonical = self.index.insert(blob);
        if canonical.storage != blob.storage {
            // A concurrent save of the same plaintext finished first.
            debug!(
                kind = kind.as_str(),
                id = %id,
                redundant = %blob.storage,
                "lost save race, removing redundant object"
            );
            self.store.remove(kind, &blob.storage)?;
        }

        Ok(canonical)
    }

    /// Serialize a tree canonically and save it, reusing a previously
    /// stored tree with identical bytes.
    pub fn save_tree_json(&self, tree: &Tree) -> Result<Blob> {
        let data = tree.encode()?;
        let id = ContentId::compute(&data);

        if let Some(existing) = self.index.find_id(&id) {
            debug!(id = %id, "tree already known, skipping upload");
            return Ok(existing);
        }

        let blob = self.store.save_json(ObjectKind::Tree, &data)?;
        Ok(self.index.insert(blob))
    }
}
