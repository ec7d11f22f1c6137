use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::node::{Node, NodeKind, Tree};
use crate::progress::Stat;
use crate::store::ObjectKind;

use super::walk::{DirJob, EntryJob};
use super::Ctx;

/// Consume entry jobs until the channel closes or the pipeline is done.
///
/// The done signal is observed between jobs only: chunk uploads in
/// flight for the current job always run to completion.
pub(crate) fn file_worker(ctx: &Ctx<'_>, jobs: Receiver<EntryJob>) {
    loop {
        let job = crossbeam_channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => job,
                Err(_) => return,
            },
            recv(ctx.done.done()) -> _ => return,
        };
        if !process_entry(ctx, job) {
            return;
        }
    }
}

fn process_entry(ctx: &Ctx<'_>, job: EntryJob) -> bool {
    let mut node = match Node::from_path(&job.path, &job.meta) {
        Ok(node) => node,
        Err(e) => {
            if !ctx.entry_error(&job.path, Some(&job.meta), &e) {
                return false;
            }
            let node = Node::error_node(&job.path, NodeKind::File, e.to_string());
            return job.result.send(node).is_ok();
        }
    };

    // Content reuse: the compare stage already established that the stat
    // data is unchanged; reuse requires every old chunk to still exist.
    if let Some(old) = &job.old_node {
        if !old.content.is_empty() && old.blobs.len() == old.content.len() {
            let missing = old.blobs.iter().any(|blob| {
                !ctx.arch
                    .store()
                    .test(ObjectKind::Data, &blob.storage)
                    .unwrap_or(false)
            });
            if missing {
                debug!(path = %job.path.display(), "old chunks missing from store, re-reading");
            } else {
                node.content = old.content.clone();
                node.blobs = old.blobs.clone();
                ctx.progress.report(Stat {
                    bytes: node.size,
                    ..Stat::default()
                });
            }
        }
    }

    if node.kind == NodeKind::File && node.content.is_empty() {
        match ctx.arch.save_file(ctx.progress, &mut node) {
            Ok(blobs) => node.blobs = blobs,
            Err(e) => {
                if !ctx.entry_error(&node.path, None, &e) {
                    return false;
                }
                // Keep the metadata, drop the content: the snapshot
                // commits with a damaged node instead of losing the run.
                node.content.clear();
                node.blobs.clear();
                node.error = Some(e.to_string());
            }
        }
    }

    if job.result.send(node).is_err() {
        return false;
    }
    ctx.progress.report(Stat {
        files: 1,
        ..Stat::default()
    });
    true
}

/// Consume directory jobs until the channel closes or the pipeline is
/// done. A directory job completes only after all of its children have
/// deposited their results.
pub(crate) fn dir_worker(ctx: &Ctx<'_>, jobs: Receiver<DirJob>) {
    loop {
        let job = crossbeam_channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => job,
                Err(_) => return,
            },
            recv(ctx.done.done()) -> _ => return,
        };
        if !process_dir(ctx, job) {
            return;
        }
    }
}

fn process_dir(ctx: &Ctx<'_>, job: DirJob) -> bool {
    let mut tree = Tree::new();

    for child in &job.entries {
        let node = crossbeam_channel::select! {
            recv(child) -> node => match node {
                Ok(node) => node,
                // The producing worker exited without sending: shutdown.
                Err(_) => return false,
            },
            recv(ctx.done.done()) -> _ => return false,
        };
        for blob in &node.blobs {
            tree.map.insert(*blob);
            ctx.arch.index().insert(*blob);
        }
        tree.insert(node);
    }

    let mut node = match Node::from_path(&job.path, &job.meta) {
        Ok(node) => node,
        Err(e) => {
            if !ctx.entry_error(&job.path, Some(&job.meta), &e) {
                return false;
            }
            let node = Node::error_node(&job.path, NodeKind::Dir, e.to_string());
            return job.result.send(node).is_ok();
        }
    };

    match ctx.arch.save_tree_json(&tree) {
        Ok(blob) => {
            debug!(path = %job.path.display(), tree = %blob.id, "directory tree saved");
            node.subtree = Some(blob.id);
            node.blobs = vec![blob];
        }
        Err(e) => {
            warn!(path = %job.path.display(), error = %e, "directory tree save failed");
            if !ctx.entry_error(&node.path, None, &e) {
                return false;
            }
            node.error = Some(e.to_string());
        }
    }

    if job.result.send(node).is_err() {
        return false;
    }
    ctx.progress.report(Stat {
        dirs: 1,
        ..Stat::default()
    });
    true
}
