use std::collections::HashSet;

use tracing::{debug, warn};

use crate::error::{FloeError, Result};
use crate::id::ContentId;
use crate::node::{NodeKind, Tree};
use crate::progress::{Progress, Stat};
use crate::store::{Blob, ObjectKind};

use super::Archiver;

impl Archiver {
    /// Validate, prune, and save a tree that may reference pre-existing
    /// data (content carried over from a parent snapshot).
    ///
    /// Every file node's content ids must resolve through the tree's
    /// blob index to objects still present in the store. Ids that do not
    /// are deleted from both indices and the node's content is cleared,
    /// leaving its metadata plus an error string; the file is re-read on
    /// a later snapshot. Afterwards the tree's index is pruned to exactly
    /// the ids referenced by its immediate children, and the tree is
    /// serialized and stored.
    pub fn save_tree(&self, progress: &Progress, tree: &mut Tree) -> Result<Blob> {
        let Tree { nodes, map } = &mut *tree;

        for node in nodes.iter_mut() {
            if node.kind != NodeKind::File || node.content.is_empty() {
                continue;
            }

            let mut damaged = false;
            for id in &node.content {
                let present = match map.find_id(id) {
                    Some(blob) => self
                        .store
                        .test(ObjectKind::Data, &blob.storage)
                        .unwrap_or(false),
                    None => false,
                };
                if present {
                    continue;
                }

                warn!(path = %node.path.display(), id = %id, "data blob missing, dropping file content");
                let missing = FloeError::MissingBlob(*id);
                if let Some(abort) = (self.on_error)(&node.path, None, &missing) {
                    return Err(abort);
                }
                map.delete_id(id);
                self.index.delete_id(id);
                damaged = true;
            }

            if damaged {
                node.content.clear();
                node.error = Some("file content incomplete: data blobs missing from repository".into());
                progress.report(Stat {
                    errors: 1,
                    ..Stat::default()
                });
            }
        }

        let mut used: HashSet<ContentId> = HashSet::new();
        for node in nodes.iter() {
            used.extend(node.content.iter().copied());
            if let Some(subtree) = node.subtree {
                used.insert(subtree);
            }
        }
        let pruned = map.prune(&used);
        if pruned > 0 {
            debug!(pruned, "pruned unreferenced blobs from tree map");
        }

        let blob = self.save_tree_json(tree)?;
        progress.report(Stat {
            trees: 1,
            ..Stat::default()
        });
        Ok(blob)
    }
}
