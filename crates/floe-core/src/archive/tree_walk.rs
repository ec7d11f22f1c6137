use std::path::{Path, PathBuf};

use crossbeam_channel::Sender;
use tracing::{debug, warn};

use crate::error::Result;
use crate::id::StorageId;
use crate::node::{Node, NodeKind, Tree};
use crate::snapshot::Snapshot;
use crate::store::{ObjectKind, ObjectStore};

use super::Ctx;

/// One node of the parent snapshot, with the full path it had.
pub(crate) struct TreeJob {
    pub(crate) path: PathBuf,
    pub(crate) node: Node,
}

/// Fetch and decode a tree object by storage id.
pub(crate) fn load_tree(store: &dyn ObjectStore, storage: &StorageId) -> Result<Tree> {
    let data = store.load(ObjectKind::Tree, storage)?;
    Tree::decode(&data)
}

/// Walk the parent snapshot's tree, emitting `(path, node)` jobs in the
/// same order the filesystem walker uses: children in name order, each
/// directory after its children.
///
/// Load or decode failures skip the affected subtree; the parent walk is
/// advisory and the affected paths are simply re-read from disk.
pub(crate) fn walk_parent(ctx: &Ctx<'_>, snapshot: &Snapshot, out: Sender<TreeJob>) {
    let root = match load_tree(ctx.arch.store(), &snapshot.tree.storage) {
        Ok(tree) => tree,
        Err(e) => {
            warn!(error = %e, "cannot load parent root tree; continuing without old data");
            return;
        }
    };

    for path_str in &snapshot.paths {
        let path = PathBuf::from(path_str);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path_str.clone());
        let Some(node) = root.find(&name) else {
            debug!(path = %path.display(), "parent root tree has no node for path");
            continue;
        };
        if !walk_node(ctx, &path, node, &root, &out) {
            return;
        }
    }
    debug!("parent tree walk complete");
}

fn walk_node(
    ctx: &Ctx<'_>,
    path: &Path,
    node: &Node,
    tree: &Tree,
    out: &Sender<TreeJob>,
) -> bool {
    if node.kind == NodeKind::Dir {
        if let Some(subtree_id) = node.subtree {
            match tree.map.find_id(&subtree_id) {
                Some(blob) => match load_tree(ctx.arch.store(), &blob.storage) {
                    Ok(subtree) => {
                        for child in &subtree.nodes {
                            if !walk_node(ctx, &path.join(&child.name), child, &subtree, out) {
                                return false;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unloadable subtree");
                    }
                },
                None => {
                    warn!(path = %path.display(), subtree = %subtree_id, "subtree id missing from tree map");
                }
            }
        }
    }

    let mut node = node.clone();
    node.path = path.to_path_buf();
    if node.kind == NodeKind::File {
        // Resolve the content ids to stored blobs so the file worker can
        // probe them. An unresolvable id disables reuse for this node.
        for id in &node.content {
            match tree.map.find_id(id) {
                Some(blob) => node.blobs.push(blob),
                None => {
                    debug!(path = %node.path.display(), id = %id, "old content id not in tree map");
                    node.blobs.clear();
                    break;
                }
            }
        }
    }

    let path = path.to_path_buf();
    crossbeam_channel::select! {
        send(out, TreeJob { path, node }) -> res => res.is_ok(),
        recv(ctx.done.done()) -> _ => false,
    }
}
