use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::archive::{Archiver, CancelToken, SnapshotRequest};
use crate::config::{ArchiveConfig, ChunkerConfig};
use crate::id::StorageId;
use crate::node::{Node, NodeKind, Tree};
use crate::progress::Progress;
use crate::snapshot::Snapshot;
use crate::store::{ObjectKind, ObjectStore};
use crate::testutil::MemoryStore;

/// Chunker parameters small enough that test files split into many
/// chunks.
pub(crate) fn small_chunker() -> ChunkerConfig {
    ChunkerConfig {
        min_size: 1024,
        avg_size: 4096,
        max_size: 16384,
    }
}

pub(crate) fn test_config() -> ArchiveConfig {
    ArchiveConfig {
        max_concurrent_blobs: 8,
        max_workers: 4,
        max_preload_workers: 4,
        chunker_buffer_size: 64 * 1024,
        chunker: small_chunker(),
    }
}

pub(crate) fn test_archiver(store: &Arc<MemoryStore>) -> Archiver {
    Archiver::new(Arc::clone(store) as Arc<dyn ObjectStore>, test_config())
}

/// Run a snapshot with a fresh progress reporter and cancel token.
pub(crate) fn take_snapshot(
    arch: &Archiver,
    paths: &[PathBuf],
    parent: Option<StorageId>,
) -> (Snapshot, StorageId) {
    let progress = Progress::new();
    let cancel = CancelToken::new();
    arch.snapshot(
        &progress,
        SnapshotRequest {
            paths,
            parent,
            tags: &[],
        },
        &cancel,
    )
    .unwrap()
}

/// Deterministic pseudo-random bytes (xorshift), so chunk boundaries are
/// reproducible across runs.
pub(crate) fn patterned_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut state = seed | 1;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state as u8
        })
        .collect()
}

pub(crate) fn write_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, data).unwrap();
    path
}

pub(crate) fn load_root_tree(store: &MemoryStore, snapshot: &Snapshot) -> Tree {
    let data = store
        .load(ObjectKind::Tree, &snapshot.tree.storage)
        .unwrap();
    Tree::decode(&data).unwrap()
}

/// Resolve and load the subtree a directory node points at.
pub(crate) fn load_subtree(store: &MemoryStore, tree: &Tree, node: &Node) -> Tree {
    assert_eq!(node.kind, NodeKind::Dir, "node {} is not a dir", node.name);
    let subtree_id = node.subtree.expect("dir node has no subtree");
    let blob = tree
        .map
        .find_id(&subtree_id)
        .expect("subtree blob not in tree map");
    let data = store.load(ObjectKind::Tree, &blob.storage).unwrap();
    Tree::decode(&data).unwrap()
}
