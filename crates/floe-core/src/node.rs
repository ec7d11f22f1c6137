use std::fs::Metadata;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FloeError, Result};
use crate::id::ContentId;
use crate::index::BlobIndex;
use crate::store::Blob;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    File,
    Dir,
    Symlink,
    CharDevice,
    BlockDevice,
    Fifo,
    Socket,
}

/// One filesystem entry as recorded in a tree object.
///
/// For files, `content` lists the content ids of the data chunks in
/// order; for directories, `subtree` names the child tree. A node whose
/// content could not be saved keeps its metadata and carries `error`
/// instead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub name: String,
    pub kind: NodeKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Modification time in nanoseconds since the Unix epoch.
    pub mtime_ns: i64,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtree: Option<ContentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Absolute path the node was built from. Not serialized.
    #[serde(skip)]
    pub path: PathBuf,
    /// Blobs saved for this node during the current build. Not serialized.
    #[serde(skip)]
    pub blobs: Vec<Blob>,
}

impl Node {
    /// Build a node from a path and its (symlink-aware) metadata.
    pub fn from_path(path: &Path, metadata: &Metadata) -> Result<Node> {
        let kind = node_kind(metadata);
        let link_target = if kind == NodeKind::Symlink {
            Some(
                std::fs::read_link(path)?
                    .to_string_lossy()
                    .into_owned(),
            )
        } else {
            None
        };

        Ok(Node {
            name: node_name(path),
            kind,
            mode: unix_mode(metadata),
            uid: unix_uid(metadata),
            gid: unix_gid(metadata),
            mtime_ns: mtime_ns(metadata),
            size: if kind == NodeKind::File {
                metadata.len()
            } else {
                0
            },
            content: Vec::new(),
            subtree: None,
            link_target,
            device: device_id(metadata, kind),
            error: None,
            path: path.to_path_buf(),
            blobs: Vec::new(),
        })
    }

    /// Node carrying only a name and an error message, for entries whose
    /// metadata could not be captured.
    pub fn error_node(path: &Path, kind: NodeKind, error: String) -> Node {
        Node {
            name: node_name(path),
            kind,
            mode: 0,
            uid: 0,
            gid: 0,
            mtime_ns: 0,
            size: 0,
            content: Vec::new(),
            subtree: None,
            link_target: None,
            device: None,
            error: Some(error),
            path: path.to_path_buf(),
            blobs: Vec::new(),
        }
    }

    /// Whether the on-disk entry is newer than this recorded node.
    ///
    /// Compares mtime and size only; ctime and inode are ignored so that
    /// unchanged content is recognized across remounts.
    pub fn is_newer(&self, metadata: &Metadata) -> bool {
        mtime_ns(metadata) != self.mtime_ns || metadata.len() != self.size
    }
}

fn node_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

fn node_kind(metadata: &Metadata) -> NodeKind {
    let file_type = metadata.file_type();
    if file_type.is_dir() {
        return NodeKind::Dir;
    }
    if file_type.is_symlink() {
        return NodeKind::Symlink;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_char_device() {
            return NodeKind::CharDevice;
        }
        if file_type.is_block_device() {
            return NodeKind::BlockDevice;
        }
        if file_type.is_fifo() {
            return NodeKind::Fifo;
        }
        if file_type.is_socket() {
            return NodeKind::Socket;
        }
    }

    NodeKind::File
}

fn mtime_ns(metadata: &Metadata) -> i64 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.mtime() * 1_000_000_000 + metadata.mtime_nsec()
    }

    #[cfg(not(unix))]
    {
        metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0)
    }
}

fn unix_mode(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.mode()
    }

    #[cfg(not(unix))]
    {
        let _ = metadata;
        0o644
    }
}

fn unix_uid(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.uid()
    }

    #[cfg(not(unix))]
    {
        let _ = metadata;
        0
    }
}

fn unix_gid(metadata: &Metadata) -> u32 {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        metadata.gid()
    }

    #[cfg(not(unix))]
    {
        let _ = metadata;
        0
    }
}

fn device_id(metadata: &Metadata, kind: NodeKind) -> Option<u64> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if matches!(kind, NodeKind::CharDevice | NodeKind::BlockDevice) {
            return Some(metadata.rdev());
        }
        None
    }

    #[cfg(not(unix))]
    {
        let _ = (metadata, kind);
        None
    }
}

/// A directory object: child nodes sorted by name, plus an index of the
/// blobs the children reference directly or transitively.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
    pub map: BlobIndex,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node, keeping `nodes` sorted by name. Inserting a name
    /// that already exists replaces the previous node.
    pub fn insert(&mut self, node: Node) {
        match self
            .nodes
            .binary_search_by(|n| n.name.as_str().cmp(&node.name))
        {
            Ok(pos) => self.nodes[pos] = node,
            Err(pos) => self.nodes.insert(pos, node),
        }
    }

    pub fn find(&self, name: &str) -> Option<&Node> {
        self.nodes
            .binary_search_by(|n| n.name.as_str().cmp(name))
            .ok()
            .map(|pos| &self.nodes[pos])
    }

    /// Canonical encoding: JSON with stable field order and name-sorted
    /// nodes, terminated by a single newline. These exact bytes are what
    /// a tree's content id is computed over.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut data = serde_json::to_vec(self)?;
        data.push(b'\n');
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Tree> {
        serde_json::from_slice(data).map_err(|e| FloeError::InvalidTree(e.to_string()))
    }
}
