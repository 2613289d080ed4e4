//! Test fixtures for packer and source testing.
//!
//! Provides deterministic stream content and temporary media files so tests
//! can verify byte-exact round trips.

use std::path::PathBuf;

// Type alias for complex return type
type TempMediaFile = (tempfile::TempDir, PathBuf, Vec<u8>);

/// Deterministic content for `len` bytes starting at media offset `offset`.
///
/// Byte values depend on the absolute offset, so any slice of the stream can
/// be checked independently.
pub fn patterned_bytes(offset: u64, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| ((offset + i as u64) % 251) as u8)
        .collect()
}

/// Creates a temporary file holding `len` patterned bytes.
///
/// # Panics
///
/// Panics if the temporary directory or file cannot be created.
/// This is acceptable in test fixtures where failures indicate environment issues.
pub fn create_temp_media_file(len: usize) -> TempMediaFile {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("stream.bin");
    let content = patterned_bytes(0, len);

    std::fs::write(&path, &content).unwrap();

    (temp_dir, path, content)
}
