use serde::{Deserialize, Serialize};

fn default_min_size() -> u32 {
    512 * 1024 // 512 KiB
}

fn default_avg_size() -> u32 {
    2 * 1024 * 1024 // 2 MiB
}

fn default_max_size() -> u32 {
    8 * 1024 * 1024 // 8 MiB
}

fn default_max_concurrent_blobs() -> usize {
    32
}

fn default_max_workers() -> usize {
    10
}

fn default_max_preload_workers() -> usize {
    20
}

fn default_chunker_buffer_size() -> usize {
    512 * 1024 // 512 KiB
}

/// Content-defined chunker parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkerConfig {
    #[serde(default = "default_min_size")]
    pub min_size: u32,
    #[serde(default = "default_avg_size")]
    pub avg_size: u32,
    #[serde(default = "default_max_size")]
    pub max_size: u32,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_size: default_min_size(),
            avg_size: default_avg_size(),
            max_size: default_max_size(),
        }
    }
}

/// Tuning knobs for one archiver instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Global cap on in-flight blob uploads, shared across all files.
    #[serde(default = "default_max_concurrent_blobs")]
    pub max_concurrent_blobs: usize,
    /// Size of the file worker pool and of the directory worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Worker count for the tree preload pass.
    #[serde(default = "default_max_preload_workers")]
    pub max_preload_workers: usize,
    /// Read buffer in front of the chunker.
    #[serde(default = "default_chunker_buffer_size")]
    pub chunker_buffer_size: usize,
    #[serde(default)]
    pub chunker: ChunkerConfig,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_concurrent_blobs: default_max_concurrent_blobs(),
            max_workers: default_max_workers(),
            max_preload_workers: default_max_preload_workers(),
            chunker_buffer_size: default_chunker_buffer_size(),
            chunker: ChunkerConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ArchiveConfig::default();
        assert_eq!(config.max_concurrent_blobs, 32);
        assert_eq!(config.max_workers, 10);
        assert_eq!(config.max_preload_workers, 20);
        assert_eq!(config.chunker_buffer_size, 512 * 1024);
        assert_eq!(config.chunker.min_size, 512 * 1024);
        assert_eq!(config.chunker.avg_size, 2 * 1024 * 1024);
        assert_eq!(config.chunker.max_size, 8 * 1024 * 1024);
    }

    #[test]
    fn empty_document_deserializes_to_defaults() {
        let config: ArchiveConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_concurrent_blobs, 32);
        assert_eq!(config.chunker.avg_size, 2 * 1024 * 1024);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config: ArchiveConfig =
            serde_json::from_str(r#"{"max_workers": 2, "chunker": {"avg_size": 65536}}"#).unwrap();
        assert_eq!(config.max_workers, 2);
        assert_eq!(config.chunker.avg_size, 65536);
        assert_eq!(config.max_concurrent_blobs, 32);
        assert_eq!(config.chunker.min_size, 512 * 1024);
    }
}
