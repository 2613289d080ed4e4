//! Local file chunk source

use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use tracing::debug;

use super::{ChunkSource, SourceError};

/// Reads a local file in fixed-size chunks
pub struct LocalFileSource {
    file: File,
    length: u64,
    position: u64,
    chunk_size: usize,
}

impl LocalFileSource {
    /// Opens `path` for chunked reading.
    ///
    /// # Errors
    ///
    /// - `SourceError::NotFound` - If the file does not exist
    /// - `SourceError::Io` - If the file cannot be opened or inspected
    pub fn open(path: impl AsRef<Path>, chunk_size: usize) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => SourceError::NotFound {
                path: path.to_path_buf(),
            },
            _ => SourceError::Io { offset: 0, source },
        })?;
        let length = file
            .metadata()
            .map_err(|source| SourceError::Io { offset: 0, source })?
            .len();

        debug!("Opened {} ({} bytes)", path.display(), length);
        Ok(Self {
            file,
            length,
            position: 0,
            chunk_size: chunk_size.max(1),
        })
    }
}

impl ChunkSource for LocalFileSource {
    fn read_chunk(&mut self) -> Result<Option<(u64, Bytes)>, SourceError> {
        let offset = self.position;
        let mut buf = BytesMut::zeroed(self.chunk_size);
        let mut filled = 0;

        while filled < buf.len() {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(source) => return Err(SourceError::Io { offset, source }),
            }
        }

        if filled == 0 {
            return Ok(None);
        }

        buf.truncate(filled);
        self.position += filled as u64;
        Ok(Some((offset, buf.freeze())))
    }

    fn seek(&mut self, offset: u64) -> Result<(), SourceError> {
        if offset > self.length {
            return Err(SourceError::SeekOutOfRange {
                offset,
                length: self.length,
            });
        }
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(|source| SourceError::Io { offset, source })?;
        self.position = offset;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn content_length(&self) -> Option<u64> {
        Some(self.length)
    }

    fn source_type(&self) -> &'static str {
        "local_file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_fixtures::create_temp_media_file;

    #[test]
    fn test_reads_file_in_chunks() {
        let (_dir, path, content) = create_temp_media_file(1000);
        let mut source = LocalFileSource::open(&path, 256).unwrap();
        assert_eq!(source.content_length(), Some(1000));

        let mut collected = Vec::new();
        let mut offsets = Vec::new();
        while let Some((offset, chunk)) = source.read_chunk().unwrap() {
            offsets.push(offset);
            collected.extend_from_slice(&chunk);
        }

        assert_eq!(offsets, vec![0, 256, 512, 768]);
        assert_eq!(collected, content);
    }

    #[test]
    fn test_seek_repositions_next_chunk() {
        let (_dir, path, content) = create_temp_media_file(1000);
        let mut source = LocalFileSource::open(&path, 100).unwrap();

        source.seek(640).unwrap();
        let (offset, chunk) = source.read_chunk().unwrap().unwrap();
        assert_eq!(offset, 640);
        assert_eq!(&chunk[..], &content[640..740]);

        assert!(matches!(
            source.seek(1001),
            Err(SourceError::SeekOutOfRange { .. })
        ));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = LocalFileSource::open(dir.path().join("missing.mp4"), 64);
        assert!(matches!(result, Err(SourceError::NotFound { .. })));
    }
}
