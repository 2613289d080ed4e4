//! End-to-end pipelines: a feeder thread producing, the test thread parsing

use std::sync::Arc;

use streampack_core::source::test_fixtures::{create_temp_media_file, patterned_bytes};
use streampack_core::{
    Feeder, LocalFileSource, MemorySource, PackerConfig, SourceError, StreamDataPacker,
    StreampackError,
};

/// Reads the whole stream with destructive gets, finishing with the tail
/// left after end of stream.
fn drain(packer: &StreamDataPacker, mut offset: u64, read_size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let size = if packer.get_or_wait_data_available(offset, read_size) {
            read_size
        } else {
            packer.size()
        };
        if size == 0 {
            return out;
        }
        let data = packer.get_range(offset, size).unwrap();
        offset += data.len() as u64;
        out.extend_from_slice(&data);
    }
}

#[test]
fn test_local_file_round_trip_under_backpressure() {
    let (_dir, path, content) = create_temp_media_file(100_000);
    let packer = Arc::new(StreamDataPacker::new(
        PackerConfig::default().with_capacity(4096),
    ));
    packer.start();

    let handle = Feeder::spawn(
        Arc::clone(&packer),
        LocalFileSource::open(&path, 1000).unwrap(),
    )
    .unwrap();

    let consumed = drain(&packer, 0, 1316);
    assert_eq!(consumed, content);

    handle.stop();
    let summary = handle.join().unwrap();
    assert!(summary.reached_eos);
    assert_eq!(summary.bytes_pushed, 100_000);

    let stats = packer.stats();
    assert!(stats.peak_bytes_buffered <= 4096);
    assert_eq!(stats.bytes_consumed, 100_000);
    assert_eq!(stats.contract_violations, 0);
}

#[test]
fn test_seek_mid_stream_resumes_at_target() {
    let (_dir, path, content) = create_temp_media_file(100_000);
    let packer = Arc::new(StreamDataPacker::new(
        PackerConfig::default().with_capacity(4096),
    ));
    packer.start();

    let handle = Feeder::spawn(
        Arc::clone(&packer),
        LocalFileSource::open(&path, 1000).unwrap(),
    )
    .unwrap();

    assert!(packer.get_or_wait_data_available(0, 1000));
    let head = packer.get_range(0, 1000).unwrap();
    assert_eq!(&head[..], &content[..1000]);

    handle.seek(60_000).unwrap();

    let consumed = drain(&packer, 60_000, 777);
    assert_eq!(consumed, &content[60_000..]);

    handle.stop();
    let summary = handle.join().unwrap();
    assert_eq!(summary.seeks, 1);
    assert!(summary.reached_eos);
}

#[test]
fn test_live_parser_skips_with_pre_remove_hints() {
    let content = patterned_bytes(0, 10_000);
    let packer = Arc::new(StreamDataPacker::new(
        PackerConfig::live().with_capacity(1000),
    ));
    packer.start();

    let handle = Feeder::spawn(
        Arc::clone(&packer),
        MemorySource::live(content.clone(), 100),
    )
    .unwrap();

    // Each step discards a 50 byte header and keeps the 200 byte payload
    let mut offset = 0u64;
    let mut payloads = 0;
    while packer.get_or_wait_data_available(offset, 250) {
        let payload = packer.get_range_live(200, offset + 50, true).unwrap();
        let start = offset as usize + 50;
        assert_eq!(&payload[..], &content[start..start + 200]);
        offset += 250;
        payloads += 1;
    }
    assert_eq!(payloads, 40);
    assert!(packer.is_empty());

    let stats = packer.stats();
    assert_eq!(stats.bytes_pre_removed, 2_000);
    assert_eq!(stats.bytes_consumed, 8_000);

    handle.stop();
    assert!(handle.join().unwrap().reached_eos);
}

#[test]
fn test_missing_file_is_user_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = LocalFileSource::open(dir.path().join("absent.ts"), 4096);

    let error = match result {
        Err(e) => e,
        Ok(_) => panic!("opening a missing file should fail"),
    };
    assert!(matches!(error, SourceError::NotFound { .. }));
    assert!(StreampackError::from(error).is_user_error());
}
