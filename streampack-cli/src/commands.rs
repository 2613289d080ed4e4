//! CLI command implementations

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, bail};
use clap::Subcommand;
use serde::Serialize;
use sha1::{Digest, Sha1};
use streampack_core::{
    FeedSummary, Feeder, LocalFileSource, PackerStats, StreamDataPacker, StreampackConfig,
};
use tracing::{debug, info};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Stream a file through the packer and verify the consumed bytes
    Pump {
        /// File to stream
        file: PathBuf,
        /// Bytes per pushed chunk
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Packer capacity in bytes
        #[arg(long)]
        capacity: Option<usize>,
        /// Bytes requested per consumer read
        #[arg(short, long, default_value = "4096")]
        read_size: usize,
        /// Consume with peek plus pre-remove, as a live demuxer does
        #[arg(long)]
        live: bool,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration after environment overrides
    Config,
}

/// Result of pumping one file through the packer
#[derive(Debug, Serialize)]
pub struct PumpReport {
    pub file: PathBuf,
    pub bytes_consumed: u64,
    pub expected_sha1: String,
    pub actual_sha1: String,
    pub elapsed_ms: u128,
    pub capacity: usize,
    pub feed: FeedSummary,
    pub packer: PackerStats,
}

impl PumpReport {
    pub fn is_match(&self) -> bool {
        self.expected_sha1 == self.actual_sha1
    }
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Pump {
            file,
            chunk_size,
            capacity,
            read_size,
            live,
            json,
        } => {
            let mut config = StreampackConfig::try_from_env()?;
            if let Some(chunk_size) = chunk_size {
                config.source.chunk_size = chunk_size;
            }
            if let Some(capacity) = capacity {
                config.packer.capacity = capacity;
            }
            config.packer.support_pre_download |= live;
            config.validate()?;

            let report = pump_file(&file, &config, read_size, live)?;
            print_report(&report, json)?;
            if !report.is_match() {
                bail!(
                    "digest mismatch for {}: expected {}, consumed {}",
                    file.display(),
                    report.expected_sha1,
                    report.actual_sha1
                );
            }
            Ok(())
        }
        Commands::Config => {
            let config = StreampackConfig::try_from_env()?;
            println!("capacity:             {} bytes", config.packer.capacity);
            println!("support_pre_download: {}", config.packer.support_pre_download);
            println!("chunk_size:           {} bytes", config.source.chunk_size);
            Ok(())
        }
    }
}

/// Streams `path` through a packer with a feeder thread and consumes it on
/// the calling thread.
///
/// # Errors
/// - `SourceError` - File cannot be opened or read
/// - `std::io::Error` - Reference digest cannot be computed
pub fn pump_file(
    path: &Path,
    config: &StreampackConfig,
    read_size: usize,
    live: bool,
) -> anyhow::Result<PumpReport> {
    let read_size = read_size.max(1);
    let expected_sha1 = file_sha1(path)?;

    let packer = Arc::new(StreamDataPacker::new(config.packer.clone()));
    packer.start();

    let source = LocalFileSource::open(path, config.source.chunk_size)?;
    let started = Instant::now();
    let feeder = Feeder::spawn(Arc::clone(&packer), source)?;

    let mut hasher = Sha1::new();
    let bytes_consumed = if live {
        consume_live(&packer, read_size, &mut hasher)
    } else {
        consume(&packer, read_size, &mut hasher)
    };
    let elapsed_ms = started.elapsed().as_millis();

    feeder.stop();
    let feed = feeder.join()?;
    info!(
        "Consumed {} bytes of {} in {} ms",
        bytes_consumed,
        path.display(),
        elapsed_ms
    );

    Ok(PumpReport {
        file: path.to_path_buf(),
        bytes_consumed,
        expected_sha1,
        actual_sha1: hex::encode(hasher.finalize()),
        elapsed_ms,
        capacity: packer.capacity(),
        feed,
        packer: packer.stats(),
    })
}

/// Reads with destructive `get_range` calls at absolute offsets.
fn consume(packer: &StreamDataPacker, read_size: usize, hasher: &mut Sha1) -> u64 {
    let mut offset = packer.media_offset();
    loop {
        let size = if packer.get_or_wait_data_available(offset, read_size) {
            read_size
        } else {
            // End of stream, or a read larger than the packer can hold
            packer.size()
        };
        if size == 0 {
            return offset;
        }

        let Some(data) = packer.get_range(offset, size) else {
            debug!("Range {}+{} vanished before read", offset, size);
            return offset;
        };
        hasher.update(&data);
        offset += data.len() as u64;
    }
}

/// Parses with peeks and releases what was parsed through pre-remove hints.
fn consume_live(packer: &StreamDataPacker, read_size: usize, hasher: &mut Sha1) -> u64 {
    let mut offset = packer.media_offset();
    loop {
        if packer.get_or_wait_data_available(offset, read_size) {
            let Some(data) = packer.peek_range(offset, read_size) else {
                return offset;
            };
            hasher.update(&data);
            offset += data.len() as u64;
            packer.pre_remove(offset, true);
            continue;
        }

        let rest = packer.size();
        if rest == 0 {
            return offset;
        }
        let Some(data) = packer.get_range_live(rest, offset, true) else {
            return offset;
        };
        hasher.update(&data);
        offset += data.len() as u64;
    }
}

fn file_sha1(path: &Path) -> anyhow::Result<String> {
    let mut file =
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let mut hasher = Sha1::new();
    std::io::copy(&mut file, &mut hasher)
        .with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(hex::encode(hasher.finalize()))
}

fn print_report(report: &PumpReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    println!("File:      {}", report.file.display());
    println!("Consumed:  {} bytes in {} ms", report.bytes_consumed, report.elapsed_ms);
    println!(
        "SHA-1:     {} ({})",
        report.actual_sha1,
        if report.is_match() { "match" } else { "MISMATCH" }
    );
    println!(
        "Feeder:    {} chunks, {} bytes, {} dropped",
        report.feed.chunks_pushed, report.feed.bytes_pushed, report.feed.chunks_dropped
    );
    println!("{}", report.packer.format_summary(report.capacity));
    Ok(())
}
