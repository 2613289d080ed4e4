//! Producer thread pushing a chunk source into a packer

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::{ChunkSource, SourceError};
use crate::packer::{PackerPhase, StreamDataPacker};

/// Totals reported when a feeder thread exits
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FeedSummary {
    /// Chunks accepted by the packer
    pub chunks_pushed: u64,
    /// Bytes in accepted chunks
    pub bytes_pushed: u64,
    /// Chunks the packer rejected because a flush was in progress
    pub chunks_dropped: u64,
    /// Seeks performed on the source
    pub seeks: u64,
    /// Whether the source was exhausted at least once
    pub reached_eos: bool,
}

enum FeederCommand {
    Seek(u64),
    Stop,
}

/// Spawns producer threads
pub struct Feeder;

impl Feeder {
    /// Starts a named thread that pushes every chunk of `source` into
    /// `packer`.
    ///
    /// The thread marks end of stream when the source is exhausted and then
    /// idles until it is asked to seek or stop, so a seek after EOS restarts
    /// production. Backpressure blocks the thread inside `push_data`.
    ///
    /// # Errors
    ///
    /// - `SourceError::Feeder` - If the thread cannot be spawned
    pub fn spawn<S>(packer: Arc<StreamDataPacker>, source: S) -> Result<FeederHandle, SourceError>
    where
        S: ChunkSource + 'static,
    {
        let (commands_tx, commands_rx) = mpsc::channel();
        let seekable = source.is_seekable();
        let source_type = source.source_type();
        let thread_packer = Arc::clone(&packer);

        let thread = thread::Builder::new()
            .name("streampack-feeder".to_string())
            .spawn(move || run_feeder(thread_packer, source, commands_rx))
            .map_err(|e| SourceError::Feeder {
                reason: e.to_string(),
            })?;

        info!("Feeder started for {} source", source_type);
        Ok(FeederHandle {
            packer,
            commands: commands_tx,
            thread: Some(thread),
            seekable,
            source_type,
        })
    }
}

/// Control handle for a running feeder thread
pub struct FeederHandle {
    packer: Arc<StreamDataPacker>,
    commands: Sender<FeederCommand>,
    thread: Option<JoinHandle<Result<FeedSummary, SourceError>>>,
    seekable: bool,
    source_type: &'static str,
}

impl FeederHandle {
    /// Repositions production at `offset`.
    ///
    /// Closes the packer's read gate immediately; the feeder thread seeks the
    /// source, re-bases the packer at `offset` and reopens the gate. Reads
    /// issued in between wait for the new position.
    ///
    /// # Errors
    ///
    /// - `SourceError::SeekUnsupported` - If the source is not seekable
    /// - `SourceError::Feeder` - If the feeder thread has already exited
    pub fn seek(&self, offset: u64) -> Result<(), SourceError> {
        if !self.seekable {
            return Err(SourceError::SeekUnsupported {
                source_type: self.source_type,
            });
        }

        self.packer.begin_flush();
        if self.commands.send(FeederCommand::Seek(offset)).is_err() {
            self.packer.end_flush(offset);
            return Err(SourceError::Feeder {
                reason: "feeder thread exited".to_string(),
            });
        }
        Ok(())
    }

    /// Stops the packer and the feeder thread.
    pub fn stop(&self) {
        let _ = self.commands.send(FeederCommand::Stop);
        self.packer.stop();
    }

    /// Waits for the feeder thread to exit.
    ///
    /// # Errors
    ///
    /// - Any `SourceError` the source produced
    /// - `SourceError::Feeder` - If the thread panicked
    pub fn join(mut self) -> Result<FeedSummary, SourceError> {
        let Some(thread) = self.thread.take() else {
            return Err(SourceError::Feeder {
                reason: "feeder already joined".to_string(),
            });
        };
        thread.join().map_err(|_| SourceError::Feeder {
            reason: "feeder thread panicked".to_string(),
        })?
    }
}

fn run_feeder<S: ChunkSource>(
    packer: Arc<StreamDataPacker>,
    mut source: S,
    commands: Receiver<FeederCommand>,
) -> Result<FeedSummary, SourceError> {
    let mut summary = FeedSummary::default();
    let mut at_eos = false;

    loop {
        let command = if at_eos {
            match commands.recv() {
                Ok(command) => Some(command),
                Err(_) => break,
            }
        } else {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        };

        match command {
            Some(FeederCommand::Stop) => {
                debug!("Feeder received stop");
                break;
            }
            Some(FeederCommand::Seek(offset)) => {
                if let Err(e) = source.seek(offset) {
                    error!("Feeder seek to {} failed: {}", offset, e);
                    packer.end_flush(offset);
                    packer.set_eos();
                    return Err(e);
                }
                packer.end_flush(offset);
                summary.seeks += 1;
                at_eos = false;
                debug!("Feeder repositioned at {}", offset);
                continue;
            }
            None => {}
        }

        match source.read_chunk() {
            Ok(Some((offset, chunk))) => {
                let len = chunk.len() as u64;
                if packer.push_data(chunk, offset) {
                    summary.chunks_pushed += 1;
                    summary.bytes_pushed += len;
                    continue;
                }

                match packer.phase() {
                    PackerPhase::Stopped => {
                        debug!("Packer stopped, feeder exiting at offset {}", offset);
                        break;
                    }
                    PackerPhase::Draining => {
                        warn!("Packer already at end of stream, feeder idling");
                        at_eos = true;
                    }
                    _ => summary.chunks_dropped += 1,
                }
            }
            Ok(None) => {
                packer.set_eos();
                summary.reached_eos = true;
                at_eos = true;
                debug!("Source {} exhausted", source.source_type());
            }
            Err(e) => {
                error!("Source {} failed: {}", source.source_type(), e);
                packer.set_eos();
                return Err(e);
            }
        }
    }

    info!(
        "Feeder finished: {} chunks, {} bytes pushed",
        summary.chunks_pushed, summary.bytes_pushed
    );
    Ok(summary)
}
