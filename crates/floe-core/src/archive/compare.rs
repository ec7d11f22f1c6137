use std::path::Path;

use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

use crate::node::NodeKind;

use super::tree_walk::TreeJob;
use super::walk::{send_job, DirJob, EntryJob, WalkJob};
use super::Ctx;

fn dir_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new(""))
}

/// Path-ordered merge-join between the parent snapshot stream and the
/// filesystem stream.
///
/// Holds at most one pending element per side. New-side jobs are always
/// forwarded, joined with their old node when the paths match exactly;
/// old-side jobs that find no partner are dropped (they are removals).
/// When the old stream closes, the rest of the new stream passes through
/// untouched; when the new stream closes, the stage terminates.
pub(crate) fn compare(
    ctx: &Ctx<'_>,
    old: Receiver<TreeJob>,
    new: Receiver<WalkJob>,
    out: Sender<WalkJob>,
) {
    let mut pending_old: Option<TreeJob> = None;
    let mut pending_new: Option<WalkJob> = None;

    loop {
        if pending_old.is_none() {
            let received = crossbeam_channel::select! {
                recv(old) -> job => job.ok(),
                recv(ctx.done.done()) -> _ => return,
            };
            match received {
                Some(job) => pending_old = Some(job),
                None => {
                    // Old stream closed: forward everything else verbatim.
                    if let Some(job) = pending_new.take() {
                        if !send_job(ctx, &out, job) {
                            return;
                        }
                    }
                    copy_jobs(ctx, new, out);
                    return;
                }
            }
        }

        if pending_new.is_none() {
            let received = crossbeam_channel::select! {
                recv(new) -> job => job.ok(),
                recv(ctx.done.done()) -> _ => return,
            };
            match received {
                Some(job) => pending_new = Some(job),
                // New stream closed: remaining old entries are removals.
                None => return,
            }
        }

        let old_job = pending_old.as_ref().unwrap();
        let new_job = pending_new.as_ref().unwrap();

        if old_job.path == new_job.path() {
            let lowered = lower(pending_old.take().unwrap(), pending_new.take().unwrap());
            if !send_job(ctx, &out, lowered) {
                return;
            }
            continue;
        }

        let d_old = dir_of(&old_job.path);
        let d_new = dir_of(new_job.path());

        if d_new < d_old {
            // Entry only exists in the new stream: added.
            debug!(path = %new_job.path().display(), "entry added");
            let job = pending_new.take().unwrap();
            if !send_job(ctx, &out, job) {
                return;
            }
        } else if d_old == d_new && old_job.path < *new_job.path() {
            // Entry no longer on disk: removed.
            debug!(path = %old_job.path.display(), "entry removed");
            pending_old = None;
        } else {
            debug!(path = %old_job.path.display(), "dropping stale old entry");
            pending_old = None;
        }
    }
}

/// Pass the remainder of the new stream through unchanged.
fn copy_jobs(ctx: &Ctx<'_>, new: Receiver<WalkJob>, out: Sender<WalkJob>) {
    loop {
        let job = crossbeam_channel::select! {
            recv(new) -> job => match job {
                Ok(job) => job,
                Err(_) => return,
            },
            recv(ctx.done.done()) -> _ => return,
        };
        if !send_job(ctx, &out, job) {
            return;
        }
    }
}

/// Lower a joined (old, new) pair to the job sent downstream.
///
/// The old node is attached only for regular files of unchanged type
/// that are not newer on disk (mtime and size both unchanged); in every
/// other case the new job passes through verbatim. Directories are never
/// annotated: their trees are recomputed from children.
fn lower(old: TreeJob, new: WalkJob) -> WalkJob {
    match new {
        WalkJob::Entry(mut entry) => {
            if entry.meta.file_type().is_file()
                && old.node.kind == NodeKind::File
                && !old.node.is_newer(&entry.meta)
            {
                debug!(path = %entry.path.display(), "reusing old node data");
                entry.old_node = Some(old.node);
            } else {
                debug!(path = %entry.path.display(), "entry changed, not annotating");
            }
            WalkJob::Entry(entry)
        }
        dir => dir,
    }
}

/// Route entry jobs to the file worker pool and directory jobs to the
/// directory worker pool. Dropping both senders on return signals the
/// workers to drain and exit.
pub(crate) fn split(
    ctx: &Ctx<'_>,
    jobs: Receiver<WalkJob>,
    files: Sender<EntryJob>,
    dirs: Sender<DirJob>,
) {
    loop {
        let job = crossbeam_channel::select! {
            recv(jobs) -> job => match job {
                Ok(job) => job,
                Err(_) => return,
            },
            recv(ctx.done.done()) -> _ => return,
        };
        let delivered = match job {
            WalkJob::Entry(entry) => crossbeam_channel::select! {
                send(files, entry) -> res => res.is_ok(),
                recv(ctx.done.done()) -> _ => false,
            },
            WalkJob::Dir(dir) => crossbeam_channel::select! {
                send(dirs, dir) -> res => res.is_ok(),
                recv(ctx.done.done()) -> _ => false,
            },
        };
        if !delivered {
            return;
        }
    }
}
