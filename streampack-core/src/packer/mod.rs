//! Stream data packer for demuxer front ends
//!
//! Decouples an asynchronous, offset-addressed byte producer from a container
//! parser that needs arbitrary contiguous byte ranges. Chunks are queued in
//! push order; ranges may span chunk boundaries and are located through a
//! small cursor cache so sequential scans stay cheap. A monitor (one mutex,
//! three wait conditions) provides producer backpressure, consumer waiting
//! and flush gating.

pub use self::position::Position;
pub use self::stats::PackerStats;
pub use self::stream_data_packer::{PackerPhase, StreamDataPacker};

mod chunk_queue;
mod position;
mod stats;
mod stream_data_packer;
