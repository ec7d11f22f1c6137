use std::fs::File;

use tracing::debug;

use crate::chunker::chunk_stream;
use crate::error::{FloeError, Result};
use crate::id::ContentId;
use crate::node::Node;
use crate::progress::{Progress, Stat};
use crate::store::{Blob, ObjectKind};

use super::Archiver;

impl Archiver {
    /// Chunk and store one file's content, populating `node.content` in
    /// chunk order.
    ///
    /// Each chunk save takes one token from the shared blob token pool
    /// and runs on its own scoped thread, so up to `max_concurrent_blobs`
    /// uploads are in flight across all files. Results are collected in
    /// chunker order regardless of upload completion order.
    pub fn save_file(&self, progress: &Progress, node: &mut Node) -> Result<Vec<Blob>> {
        let file = File::open(&node.path)?;

        // The file may have changed between walk and open. If the caller
        // does not abort, the node is refreshed from the current stat and
        // the new content is read.
        let meta = file.metadata()?;
        if node.is_newer(&meta) {
            let changed = FloeError::FileChanged(node.path.display().to_string());
            debug!(path = %node.path.display(), "file changed since walk");
            if let Some(abort) = (self.on_error)(&node.path, Some(&meta), &changed) {
                return Err(abort);
            }
            let refreshed = Node::from_path(&node.path, &meta)?;
            *node = refreshed;
        }

        let mut chunks = 0usize;
        let blobs = std::thread::scope(|s| -> Result<Vec<Blob>> {
            let mut handles = Vec::new();

            for chunk in chunk_stream(file, &self.config.chunker, self.config.chunker_buffer_size)
            {
                let chunk = chunk?;
                chunks += 1;

                let token = self.tokens.acquire();
                handles.push(s.spawn(move || -> Result<Blob> {
                    let _token = token;
                    let id = ContentId::compute(&chunk.data);
                    let length = chunk.len();
                    let blob = self.save(ObjectKind::Data, id, length, &mut chunk.data.as_slice())?;
                    progress.report(Stat {
                        blobs: 1,
                        bytes: blob.size,
                        ..Stat::default()
                    });
                    Ok(blob)
                }));
            }

            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(FloeError::Other("chunk save thread panicked".into())),
                })
                .collect()
        })?;

        if blobs.len() != chunks {
            return Err(FloeError::ChunkCountMismatch {
                chunks,
                saved: blobs.len(),
            });
        }

        let saved: u64 = blobs.iter().map(|b| b.size).sum();
        if saved != node.size {
            return Err(FloeError::SizeMismatch {
                path: node.path.display().to_string(),
                saved,
                expected: node.size,
            });
        }

        node.content = blobs.iter().map(|b| b.id).collect();
        debug!(path = %node.path.display(), chunks, "file content saved");
        Ok(blobs)
    }
}
