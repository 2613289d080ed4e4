//! Producer side of the packer
//!
//! A [`ChunkSource`] yields chunks tagged with their absolute media offset;
//! the [`Feeder`] drives one on a dedicated thread, pushing into a
//! [`StreamDataPacker`](crate::StreamDataPacker) and honoring its
//! backpressure, end of stream and stop semantics.

pub mod feeder;
pub mod local;
pub mod memory;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

use std::path::PathBuf;

use bytes::Bytes;
// Re-export implementations
pub use feeder::{FeedSummary, Feeder, FeederHandle};
pub use local::LocalFileSource;
pub use memory::MemorySource;

/// Error type for chunk source operations
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Source file does not exist
    #[error("Source not found: {path}")]
    NotFound {
        /// Path that could not be opened
        path: PathBuf,
    },

    /// Reading from the underlying source failed
    #[error("I/O error at offset {offset}: {source}")]
    Io {
        /// Media offset of the failed read
        offset: u64,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Seek requested on a source that cannot reposition
    #[error("Source {source_type} does not support seeking")]
    SeekUnsupported {
        /// Kind of source that rejected the seek
        source_type: &'static str,
    },

    /// Seek target beyond the end of the source
    #[error("Seek to {offset} beyond source length {length}")]
    SeekOutOfRange {
        /// Requested offset
        offset: u64,
        /// Total source length
        length: u64,
    },

    /// Producer thread could not be spawned or panicked
    #[error("Feeder thread failed: {reason}")]
    Feeder {
        /// Description of the failure
        reason: String,
    },
}

/// Offset-addressed producer of stream chunks
///
/// Implementations return chunks in stream order. After a successful
/// [`seek`](ChunkSource::seek) the next chunk starts at the new offset.
pub trait ChunkSource: Send {
    /// Reads the next chunk and its absolute media offset.
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    ///
    /// # Errors
    ///
    /// - `SourceError::Io` - If the underlying read fails
    fn read_chunk(&mut self) -> Result<Option<(u64, Bytes)>, SourceError>;

    /// Repositions the source so the next chunk starts at `offset`.
    ///
    /// # Errors
    ///
    /// - `SourceError::SeekUnsupported` - If the source is not seekable
    /// - `SourceError::SeekOutOfRange` - If `offset` lies past the end
    /// - `SourceError::Io` - If repositioning the underlying reader fails
    fn seek(&mut self, offset: u64) -> Result<(), SourceError>;

    /// Whether [`seek`](ChunkSource::seek) can succeed.
    fn is_seekable(&self) -> bool;

    /// Total length in bytes, when known.
    fn content_length(&self) -> Option<u64>;

    /// Short identifier for logging.
    fn source_type(&self) -> &'static str;
}
