//! Streampack Core - Stream data packing for demuxer front ends
//!
//! This crate provides the buffering primitive that sits between an
//! offset-addressed byte source (local file, HTTP or live fetch) and a
//! container parser: a capacity-bounded, randomly addressable chunk queue
//! guarded by a blocking monitor, plus the producer-side plumbing that feeds it.

pub mod config;
pub mod packer;
pub mod source;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::{ConfigError, PackerConfig, SourceConfig, StreampackConfig};
pub use packer::{PackerPhase, PackerStats, Position, StreamDataPacker};
pub use source::{
    ChunkSource, FeedSummary, Feeder, FeederHandle, LocalFileSource, MemorySource, SourceError,
};

/// Errors that can bubble up from any Streampack subsystem.
///
/// The packer's read and write path never produces these; they cover
/// configuration, producer I/O and process setup.
#[derive(Debug, thiserror::Error)]
pub enum StreampackError {
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StreampackError {
    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            StreampackError::Configuration(_) | StreampackError::Source(SourceError::NotFound { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, StreampackError>;
