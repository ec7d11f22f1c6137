mod cancel;
mod compare;
mod concurrency;
mod file_saver;
mod saver;
mod tree_saver;
mod tree_walk;
mod walk;
mod worker;

pub use cancel::CancelToken;

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use crossbeam_channel::bounded;
use tracing::{debug, info, warn};

use crate::config::ArchiveConfig;
use crate::error::{FloeError, Result};
use crate::id::StorageId;
use crate::index::BlobIndex;
use crate::node::{Node, Tree};
use crate::progress::{Progress, Stat};
use crate::snapshot::{self, Snapshot};
use crate::store::{ObjectKind, ObjectStore};

use concurrency::TokenPool;
use tree_walk::TreeJob;
use walk::{DirJob, EntryJob, WalkJob};

/// Per-entry error callback. Returning `Some` aborts the snapshot with
/// that error; returning `None` records the failure and continues.
pub type ErrorFn = dyn Fn(&Path, Option<&Metadata>, &FloeError) -> Option<FloeError> + Send + Sync;

/// Entry filter. Returning `false` skips the entry (and, for a
/// directory, everything beneath it).
pub type FilterFn = dyn Fn(&Path, &Metadata) -> bool + Send + Sync;

/// Parameters for one snapshot run.
pub struct SnapshotRequest<'a> {
    pub paths: &'a [PathBuf],
    /// Previously committed snapshot whose unchanged files are reused.
    pub parent: Option<StorageId>,
    pub tags: &'a [String],
}

/// The snapshot archiver: walks filesystem paths, deduplicates content
/// against a parent snapshot and the in-memory blob index, and commits
/// an immutable snapshot object to the store.
pub struct Archiver {
    store: Arc<dyn ObjectStore>,
    index: BlobIndex,
    tokens: TokenPool,
    config: ArchiveConfig,
    on_error: Box<ErrorFn>,
    filter: Box<FilterFn>,
}

impl Archiver {
    pub fn new(store: Arc<dyn ObjectStore>, config: ArchiveConfig) -> Archiver {
        Archiver {
            tokens: TokenPool::new(config.max_concurrent_blobs),
            store,
            index: BlobIndex::new(),
            config,
            on_error: Box::new(|_, _, _| None),
            filter: Box::new(|_, _| true),
        }
    }

    /// Install the per-entry error policy.
    pub fn set_on_error(
        &mut self,
        f: impl Fn(&Path, Option<&Metadata>, &FloeError) -> Option<FloeError> + Send + Sync + 'static,
    ) {
        self.on_error = Box::new(f);
    }

    /// Install the entry filter.
    pub fn set_filter(&mut self, f: impl Fn(&Path, &Metadata) -> bool + Send + Sync + 'static) {
        self.filter = Box::new(f);
    }

    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    pub fn index(&self) -> &BlobIndex {
        &self.index
    }

    pub fn config(&self) -> &ArchiveConfig {
        &self.config
    }

    /// Seed the blob index from every tree object in the store.
    ///
    /// Preload is advisory: trees that cannot be loaded or decoded are
    /// skipped. Only a failure to list the store is surfaced.
    pub fn preload(&self, progress: &Progress) -> Result<()> {
        let (id_tx, id_rx) = bounded::<StorageId>(self.config.max_preload_workers);

        std::thread::scope(|s| {
            for _ in 0..self.config.max_preload_workers {
                let id_rx = id_rx.clone();
                s.spawn(move || {
                    for storage in id_rx {
                        match tree_walk::load_tree(self.store.as_ref(), &storage) {
                            Ok(tree) => {
                                let blobs = tree.map.len() as u64;
                                self.index.merge(&tree.map);
                                progress.report(Stat {
                                    trees: 1,
                                    blobs,
                                    ..Stat::default()
                                });
                            }
                            Err(e) => {
                                debug!(tree = %storage, error = %e, "skipping unreadable tree during preload");
                            }
                        }
                    }
                });
            }
            drop(id_rx);

            let listed = self.store.each_id(ObjectKind::Tree, &mut |id| {
                let _ = id_tx.send(id);
            });
            drop(id_tx);
            listed
        })?;

        debug!(blobs = self.index.len(), "preload complete");
        Ok(())
    }

    /// Pre-walk sizing pass: count the files, directories, and bytes a
    /// snapshot of `paths` would visit, honoring the entry filter.
    pub fn scan(&self, progress: &Progress, paths: &[PathBuf]) -> Result<Stat> {
        let mut paths = paths.to_vec();
        paths.sort();

        let mut total = Stat::default();
        for path in &paths {
            let meta = std::fs::symlink_metadata(path)?;
            self.scan_path(progress, path, &meta, &mut total);
        }
        Ok(total)
    }

    fn scan_path(&self, progress: &Progress, path: &Path, meta: &Metadata, total: &mut Stat) {
        if !(self.filter)(path, meta) {
            return;
        }

        let mut delta = Stat::default();
        if meta.is_dir() {
            delta.dirs = 1;
        } else if meta.file_type().is_file() {
            delta.files = 1;
            delta.bytes = meta.len();
        }
        progress.report(delta);
        total.add(delta);

        if meta.is_dir() {
            let entries = match std::fs::read_dir(path) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "scan: skipping unreadable directory");
                    return;
                }
            };
            for entry in entries.flatten() {
                match entry.metadata() {
                    Ok(child_meta) => {
                        self.scan_path(progress, &entry.path(), &child_meta, total);
                    }
                    Err(e) => {
                        let err = FloeError::Io(e);
                        if err.is_soft_entry_error() {
                            debug!(path = %entry.path().display(), error = %err, "scan: skipping entry");
                        } else {
                            warn!(path = %entry.path().display(), error = %err, "scan: skipping entry");
                        }
                    }
                }
            }
        }
    }

    /// Produce a new snapshot of `req.paths`.
    ///
    /// Walks the filesystem and the parent snapshot in lockstep, reuses
    /// unchanged file content, chunks and stores everything else, builds
    /// the tree bottom-up, and finally writes the snapshot object. On
    /// cancellation no snapshot object is written and
    /// [`FloeError::Interrupted`] is returned.
    pub fn snapshot(
        &self,
        progress: &Progress,
        req: SnapshotRequest<'_>,
        cancel: &CancelToken,
    ) -> Result<(Snapshot, StorageId)> {
        let mut paths = req.paths.to_vec();
        paths.sort();
        if paths.is_empty() {
            return Err(FloeError::Other("no paths to snapshot".into()));
        }
        if cancel.is_cancelled() {
            return Err(FloeError::Interrupted);
        }

        // Structural failures surface before any work begins.
        let parent_snapshot = match &req.parent {
            Some(storage) => Some(Snapshot::load(self.store.as_ref(), storage)?),
            None => None,
        };

        let done = CancelToken::new();
        let abort = Abort::default();
        let workers = self.config.max_workers.max(1);
        let queue_depth = workers * 2;

        let ctx = Ctx {
            arch: self,
            progress,
            done: &done,
            abort: &abort,
        };
        let ctx = &ctx;

        let collected: Result<Vec<Node>> = std::thread::scope(|s| {
            // Bridge external cancellation into the pipeline's own done
            // signal; exits as soon as either side fires.
            s.spawn(move || {
                crossbeam_channel::select! {
                    recv(cancel.done()) -> _ => ctx.done.cancel(),
                    recv(ctx.done.done()) -> _ => {}
                }
            });

            // Old side: parent tree walker, or an already-closed stream.
            let (old_tx, old_rx) = bounded::<TreeJob>(queue_depth);
            if let Some(parent_snapshot) = &parent_snapshot {
                s.spawn(move || tree_walk::walk_parent(ctx, parent_snapshot, old_tx));
            } else {
                drop(old_tx);
            }

            // New side: filesystem walker.
            let (new_tx, new_rx) = bounded::<WalkJob>(queue_depth);
            let (roots_tx, roots_rx) = bounded::<Vec<crossbeam_channel::Receiver<Node>>>(1);
            let walk_paths: &[PathBuf] = &paths;
            s.spawn(move || walk::walk(ctx, walk_paths, new_tx, roots_tx));

            let (merged_tx, merged_rx) = bounded::<WalkJob>(queue_depth);
            s.spawn(move || compare::compare(ctx, old_rx, new_rx, merged_tx));

            let (file_tx, file_rx) = bounded::<EntryJob>(queue_depth);
            let (dir_tx, dir_rx) = bounded::<DirJob>(queue_depth);
            s.spawn(move || compare::split(ctx, merged_rx, file_tx, dir_tx));

            for _ in 0..workers {
                let file_rx = file_rx.clone();
                let dir_rx = dir_rx.clone();
                s.spawn(move || worker::file_worker(ctx, file_rx));
                s.spawn(move || worker::dir_worker(ctx, dir_rx));
            }
            drop(file_rx);
            drop(dir_rx);

            // Collect the per-root results while the pipeline drains.
            let result = (|| {
                let roots = crossbeam_channel::select! {
                    recv(roots_rx) -> r => r.map_err(|_| FloeError::Interrupted)?,
                    recv(done.done()) -> _ => return Err(FloeError::Interrupted),
                };
                let mut nodes = Vec::with_capacity(roots.len());
                for root in roots {
                    let node = crossbeam_channel::select! {
                        recv(root) -> node => node.map_err(|_| FloeError::Interrupted)?,
                        recv(done.done()) -> _ => return Err(FloeError::Interrupted),
                    };
                    nodes.push(node);
                }
                Ok(nodes)
            })();

            // Wake the bridge thread (and any straggler) before the
            // scope joins. A no-op if an abort already fired.
            done.cancel();
            result
        });

        if let Some(err) = abort.take() {
            return Err(err);
        }
        if cancel.is_cancelled() {
            return Err(FloeError::Interrupted);
        }
        let root_nodes = collected?;

        // Build the root tree from the top-level nodes, fold their blobs
        // into the indices, and save with the repair pass: reused content
        // is validated against the store before the tree is committed.
        let mut tree = Tree::new();
        for node in root_nodes {
            for blob in &node.blobs {
                let canonical = self.index.insert(*blob);
                tree.map.insert(canonical);
            }
            tree.insert(node);
        }
        let tree_blob = self.save_tree(progress, &mut tree)?;

        let snapshot = Snapshot {
            time: Utc::now(),
            parent: req.parent,
            tree: tree_blob,
            paths: paths
                .iter()
                .map(|p| p.to_string_lossy().into_owned())
                .collect(),
            hostname: snapshot::hostname(),
            username: snapshot::username(),
            tags: req.tags.to_vec(),
        };
        let blob = snapshot.save(self.store.as_ref())?;

        info!(
            snapshot = %blob.storage,
            tree = %tree_blob.id,
            files = progress.current().files,
            bytes = progress.current().bytes,
            "snapshot written"
        );
        Ok((snapshot, blob.storage))
    }
}

/// First error that aborted the pipeline, if any.
#[derive(Default)]
pub(crate) struct Abort {
    err: Mutex<Option<FloeError>>,
}

impl Abort {
    fn trigger(&self, done: &CancelToken, err: FloeError) {
        let mut slot = self.err.lock().unwrap();
        if slot.is_none() {
            *slot = Some(err);
        }
        done.cancel();
    }

    fn take(&self) -> Option<FloeError> {
        self.err.lock().unwrap().take()
    }
}

/// Shared state handed to every pipeline stage.
pub(crate) struct Ctx<'a> {
    pub(crate) arch: &'a Archiver,
    pub(crate) progress: &'a Progress,
    pub(crate) done: &'a CancelToken,
    pub(crate) abort: &'a Abort,
}

impl Ctx<'_> {
    /// Abort the snapshot with `err` and signal every stage to stop.
    pub(crate) fn fail(&self, err: FloeError) {
        self.abort.trigger(self.done, err);
    }

    /// Route a recoverable per-entry failure through the caller's error
    /// policy. Returns `false` when the policy aborts the snapshot.
    pub(crate) fn entry_error(
        &self,
        path: &Path,
        meta: Option<&Metadata>,
        err: &FloeError,
    ) -> bool {
        warn!(path = %path.display(), error = %err, "per-entry failure");
        if let Some(abort_err) = (self.arch.on_error)(path, meta, err) {
            self.fail(abort_err);
            return false;
        }
        self.progress.report(Stat {
            errors: 1,
            ..Stat::default()
        });
        true
    }
}
