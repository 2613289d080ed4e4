//! Property-based tests for range reads
//!
//! Chunk boundaries are arbitrary, so every property exercises reads that
//! start, end and span chunks at any position.

use bytes::Bytes;
use proptest::prelude::*;
use streampack_core::source::test_fixtures::patterned_bytes;
use streampack_core::{PackerConfig, StreamDataPacker};

/// Pushes consecutive chunks of the given sizes starting at offset 0 and
/// returns the total length.
fn fill(packer: &StreamDataPacker, chunk_sizes: &[usize]) -> u64 {
    let mut offset = 0u64;
    for &len in chunk_sizes {
        assert!(packer.push_data(Bytes::from(patterned_bytes(offset, len)), offset));
        offset += len as u64;
    }
    offset
}

proptest! {
    /// Destructive reads of any size sequence return the stream byte for byte.
    #[test]
    fn get_range_reassembles_stream(
        chunk_sizes in prop::collection::vec(1usize..600, 1..40),
        read_sizes in prop::collection::vec(1usize..900, 1..40),
    ) {
        let packer = StreamDataPacker::new(PackerConfig::default());
        let total = fill(&packer, &chunk_sizes);
        packer.set_eos();

        let mut out = Vec::new();
        let mut offset = 0u64;
        for &size in read_sizes.iter().cycle() {
            if offset == total {
                break;
            }
            let size = size.min((total - offset) as usize);
            prop_assert!(packer.get_or_wait_data_available(offset, size));
            let data = packer.get_range(offset, size).unwrap();
            prop_assert_eq!(data.len(), size);
            out.extend_from_slice(&data);
            offset += size as u64;
        }

        prop_assert_eq!(out, patterned_bytes(0, total as usize));
        prop_assert!(packer.is_empty());
        prop_assert_eq!(packer.stats().bytes_consumed, total);
    }

    /// Peeks anywhere in the window are exact and leave the packer unchanged.
    #[test]
    fn peek_range_is_exact_and_idempotent(
        chunk_sizes in prop::collection::vec(1usize..400, 1..30),
        reads in prop::collection::vec((0.0f64..1.0, 0usize..1500), 1..20),
    ) {
        let packer = StreamDataPacker::new(PackerConfig::default());
        let total = fill(&packer, &chunk_sizes);

        for (position, size) in reads {
            let offset = (position * total as f64) as u64;
            let first = packer.peek_range(offset, size);
            let second = packer.peek_range(offset, size);
            prop_assert_eq!(&first, &second);

            if offset + size as u64 <= total {
                let data = first.unwrap();
                prop_assert_eq!(&data[..], &patterned_bytes(offset, size)[..]);
            } else {
                prop_assert!(first.is_none());
            }
        }

        prop_assert_eq!(packer.size() as u64, total);
        prop_assert_eq!(packer.buffered_range(), Some(0..total));
    }

    /// Overlapping pushes are trimmed so the window stays contiguous.
    #[test]
    fn overlapping_pushes_keep_window_contiguous(
        pushes in prop::collection::vec((0u64..300, 1usize..400), 1..30),
    ) {
        let packer = StreamDataPacker::new(PackerConfig::default());
        let mut end = 0u64;
        for (back, len) in pushes {
            let offset = end.saturating_sub(back);
            prop_assert!(packer.push_data(Bytes::from(patterned_bytes(offset, len)), offset));
            end = end.max(offset + len as u64);
        }

        prop_assert_eq!(packer.size() as u64, end);
        let data = packer.peek_range(0, end as usize).unwrap();
        prop_assert_eq!(&data[..], &patterned_bytes(0, end as usize)[..]);
    }
}
