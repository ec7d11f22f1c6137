use std::io::{BufReader, Read};

use fastcdc::v2020::StreamCDC;

use crate::config::ChunkerConfig;

/// One content-defined chunk cut from a byte stream.
pub struct Chunk {
    /// Byte offset of the chunk within the stream.
    pub offset: u64,
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn len(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Chunk a reader with FastCDC, yielding chunks in stream order.
///
/// The stream ends after the final (possibly short) chunk; an empty input
/// yields no chunks at all. `buffer_size` sizes the read buffer in front
/// of the chunker.
pub fn chunk_stream<R: Read>(
    reader: R,
    config: &ChunkerConfig,
    buffer_size: usize,
) -> impl Iterator<Item = std::io::Result<Chunk>> {
    let buffered = BufReader::with_capacity(buffer_size, reader);
    StreamCDC::new(buffered, config.min_size, config.avg_size, config.max_size).map(|result| {
        result
            .map(|chunk| Chunk {
                offset: chunk.offset,
                data: chunk.data,
            })
            .map_err(|e| match e {
                fastcdc::v2020::Error::IoError(io) => io,
                other => std::io::Error::other(format!("chunker error: {other:?}")),
            })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ChunkerConfig {
        ChunkerConfig {
            min_size: 256,
            avg_size: 1024,
            max_size: 4096,
        }
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len)
            .map(|i| (i as u64).wrapping_mul(2654435761).to_le_bytes()[0])
            .collect()
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunks: Vec<_> = chunk_stream(&b""[..], &small_config(), 4096).collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn chunks_concatenate_to_input() {
        let input = patterned(64 * 1024);
        let chunks: Vec<Chunk> = chunk_stream(input.as_slice(), &small_config(), 4096)
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert!(chunks.len() > 1, "input should split into several chunks");

        let mut joined = Vec::new();
        let mut offset = 0u64;
        for chunk in &chunks {
            assert_eq!(chunk.offset, offset);
            offset += chunk.len();
            joined.extend_from_slice(&chunk.data);
        }
        assert_eq!(joined, input);
    }

    #[test]
    fn chunk_sizes_are_bounded() {
        let config = small_config();
        let input = patterned(64 * 1024);
        let chunks: Vec<Chunk> = chunk_stream(input.as_slice(), &config, 4096)
            .collect::<std::io::Result<_>>()
            .unwrap();

        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.len() >= config.min_size as u64);
            assert!(chunk.len() <= config.max_size as u64);
        }
        // The final chunk may be shorter than min_size.
        assert!(chunks[chunks.len() - 1].len() <= config.max_size as u64);
    }

    #[test]
    fn boundaries_are_deterministic() {
        let input = patterned(32 * 1024);
        let cut = |data: &[u8]| -> Vec<(u64, u64)> {
            chunk_stream(data, &small_config(), 4096)
                .map(|c| c.map(|c| (c.offset, c.len())))
                .collect::<std::io::Result<_>>()
                .unwrap()
        };
        assert_eq!(cut(&input), cut(&input));
    }

    #[test]
    fn input_smaller_than_min_is_one_chunk() {
        let input = patterned(100);
        let chunks: Vec<Chunk> = chunk_stream(input.as_slice(), &small_config(), 4096)
            .collect::<std::io::Result<_>>()
            .unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].data, input);
    }
}
