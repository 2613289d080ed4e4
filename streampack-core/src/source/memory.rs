//! In-memory chunk source

use bytes::Bytes;

use super::{ChunkSource, SourceError};

/// Serves a byte buffer in fixed-size chunks
///
/// Chunks are zero-copy slices of the buffer. A live source refuses to seek,
/// mirroring an unseekable network stream.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Bytes,
    position: u64,
    chunk_size: usize,
    live: bool,
}

impl MemorySource {
    pub fn new(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            data: data.into(),
            position: 0,
            chunk_size: chunk_size.max(1),
            live: false,
        }
    }

    /// Creates an unseekable source.
    pub fn live(data: impl Into<Bytes>, chunk_size: usize) -> Self {
        Self {
            live: true,
            ..Self::new(data, chunk_size)
        }
    }
}

impl ChunkSource for MemorySource {
    fn read_chunk(&mut self) -> Result<Option<(u64, Bytes)>, SourceError> {
        let start = self.position as usize;
        if start >= self.data.len() {
            return Ok(None);
        }

        let end = (start + self.chunk_size).min(self.data.len());
        let offset = self.position;
        self.position = end as u64;
        Ok(Some((offset, self.data.slice(start..end))))
    }

    fn seek(&mut self, offset: u64) -> Result<(), SourceError> {
        if self.live {
            return Err(SourceError::SeekUnsupported {
                source_type: self.source_type(),
            });
        }
        let length = self.data.len() as u64;
        if offset > length {
            return Err(SourceError::SeekOutOfRange { offset, length });
        }
        self.position = offset;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        !self.live
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn source_type(&self) -> &'static str {
        if self.live { "memory_live" } else { "memory" }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_chunk_is_short() {
        let mut source = MemorySource::new(vec![7u8; 250], 100);

        let sizes: Vec<_> = std::iter::from_fn(|| source.read_chunk().unwrap())
            .map(|(offset, chunk)| (offset, chunk.len()))
            .collect();
        assert_eq!(sizes, vec![(0, 100), (100, 100), (200, 50)]);
    }

    #[test]
    fn test_live_source_rejects_seek() {
        let mut source = MemorySource::live(vec![0u8; 10], 4);
        assert!(!source.is_seekable());
        assert!(matches!(
            source.seek(4),
            Err(SourceError::SeekUnsupported {
                source_type: "memory_live"
            })
        ));

        let mut source = MemorySource::new(vec![0u8; 10], 4);
        source.seek(8).unwrap();
        assert_eq!(source.read_chunk().unwrap().unwrap().0, 8);
    }
}
