use std::fs::Metadata;
use std::path::{Path, PathBuf};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::debug;

use crate::error::FloeError;
use crate::node::Node;

use super::Ctx;

/// A file or non-directory leaf, with the one-shot channel its finished
/// node is deposited into.
pub(crate) struct EntryJob {
    pub(crate) path: PathBuf,
    pub(crate) meta: Metadata,
    /// Set by the compare stage when the parent snapshot has an
    /// unchanged node for this path.
    pub(crate) old_node: Option<Node>,
    pub(crate) result: Sender<Node>,
}

/// A directory, with the result channels of its immediate children in
/// walk order. The directory's own node completes only after every child
/// result has been received.
pub(crate) struct DirJob {
    pub(crate) path: PathBuf,
    pub(crate) meta: Metadata,
    pub(crate) entries: Vec<Receiver<Node>>,
    pub(crate) result: Sender<Node>,
}

pub(crate) enum WalkJob {
    Entry(EntryJob),
    Dir(DirJob),
}

impl WalkJob {
    pub(crate) fn path(&self) -> &Path {
        match self {
            WalkJob::Entry(e) => &e.path,
            WalkJob::Dir(d) => &d.path,
        }
    }
}

/// Send a job downstream, or bail out if the pipeline is done.
pub(crate) fn send_job(ctx: &Ctx<'_>, jobs: &Sender<WalkJob>, job: WalkJob) -> bool {
    crossbeam_channel::select! {
        send(jobs, job) -> res => res.is_ok(),
        recv(ctx.done.done()) -> _ => false,
    }
}

/// Walk `paths` (already sorted), emitting entry and directory jobs in
/// depth-first order: within a directory, children in lexicographic name
/// order, each directory's job strictly after its children's jobs.
///
/// The per-root result receivers are delivered over `roots` once the
/// walk completes; on cancellation nothing is delivered.
pub(crate) fn walk(
    ctx: &Ctx<'_>,
    paths: &[PathBuf],
    jobs: Sender<WalkJob>,
    roots: Sender<Vec<Receiver<Node>>>,
) {
    let mut root_results = Vec::with_capacity(paths.len());

    for path in paths {
        let meta = match std::fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) => {
                if ctx.entry_error(path, None, &FloeError::Io(e)) {
                    continue;
                }
                return;
            }
        };
        if !(ctx.arch.filter)(path, &meta) {
            debug!(path = %path.display(), "root filtered out");
            continue;
        }
        match walk_path(ctx, path.clone(), meta, &jobs) {
            Some(rx) => root_results.push(rx),
            None => return, // cancelled or aborted
        }
    }

    debug!(roots = root_results.len(), "filesystem walk complete");
    // Buffered channel: never blocks, even if the orchestrator already
    // gave up on this walk.
    let _ = roots.send(root_results);
}

/// Walk one entry. Returns the receiver its finished node will arrive
/// on, or `None` if the pipeline shut down mid-walk.
fn walk_path(
    ctx: &Ctx<'_>,
    path: PathBuf,
    meta: Metadata,
    jobs: &Sender<WalkJob>,
) -> Option<Receiver<Node>> {
    if !meta.is_dir() {
        let (result, rx) = bounded(1);
        let job = WalkJob::Entry(EntryJob {
            path,
            meta,
            old_node: None,
            result,
        });
        return send_job(ctx, jobs, job).then_some(rx);
    }

    let mut children = Vec::new();
    match sorted_dir_entries(&path) {
        Ok(entries) => {
            for (child_path, child_meta) in entries {
                if !(ctx.arch.filter)(&child_path, &child_meta) {
                    debug!(path = %child_path.display(), "entry filtered out");
                    continue;
                }
                match walk_path(ctx, child_path, child_meta, jobs) {
                    Some(rx) => children.push(rx),
                    None => return None,
                }
            }
        }
        Err(e) => {
            // Directory is unreadable: deliver an error node for it
            // instead of a job, keeping the parent's entry list intact.
            let err = FloeError::Io(e);
            if !ctx.entry_error(&path, Some(&meta), &err) {
                return None;
            }
            let (result, rx) = bounded(1);
            let node = Node::error_node(&path, crate::node::NodeKind::Dir, err.to_string());
            let _ = result.send(node);
            return Some(rx);
        }
    }

    let (result, rx) = bounded(1);
    let job = WalkJob::Dir(DirJob {
        path,
        meta,
        entries: children,
        result,
    });
    send_job(ctx, jobs, job).then_some(rx)
}

/// Read a directory and return `(path, metadata)` pairs sorted by file
/// name. Entries whose metadata cannot be read are dropped here; the
/// per-entry error path is the caller's.
fn sorted_dir_entries(path: &Path) -> std::io::Result<Vec<(PathBuf, Metadata)>> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        match entry.metadata() {
            Ok(meta) => entries.push((entry.path(), meta)),
            Err(e) => {
                debug!(path = %entry.path().display(), error = %e, "skipping unstattable entry");
            }
        }
    }
    entries.sort_by(|a, b| a.0.file_name().cmp(&b.0.file_name()));
    Ok(entries)
}
