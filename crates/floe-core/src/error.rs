use thiserror::Error;

use crate::id::ContentId;

pub type Result<T> = std::result::Result<T, FloeError>;

#[derive(Debug, Error)]
pub enum FloeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot not found: '{0}'")]
    SnapshotNotFound(String),

    #[error("invalid tree object: {0}")]
    InvalidTree(String),

    #[error("data blob {0} is not indexed or missing from the store")]
    MissingBlob(ContentId),

    #[error("file '{path}': saved {saved} bytes, expected {expected}")]
    SizeMismatch {
        path: String,
        saved: u64,
        expected: u64,
    },

    #[error("chunker produced {chunks} chunks, but {saved} blobs were saved")]
    ChunkCountMismatch { chunks: usize, saved: usize },

    #[error("file was updated during read: '{0}'")]
    FileChanged(String),

    #[error("operation cancelled")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

impl FloeError {
    /// Returns `true` for per-entry I/O conditions that are safe to skip
    /// (file vanished between list and stat, permission denied).
    pub fn is_soft_entry_error(&self) -> bool {
        matches!(
            self,
            FloeError::Io(e) if matches!(
                e.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            )
        )
    }
}
