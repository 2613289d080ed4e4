//! Ordered chunk storage with cross-chunk range access

use std::collections::VecDeque;
use std::ops::Range;

use bytes::{Buf, Bytes, BytesMut};

use super::Position;

/// One pushed buffer segment
///
/// `offset` is the media offset of the first byte still held; it moves
/// forward when the front of the chunk is trimmed.
#[derive(Debug, Clone)]
pub(crate) struct Chunk {
    offset: u64,
    data: Bytes,
}

impl Chunk {
    pub(crate) fn new(offset: u64, data: Bytes) -> Self {
        Self { offset, data }
    }

    pub(crate) fn offset(&self) -> u64 {
        self.offset
    }

    pub(crate) fn end(&self) -> u64 {
        self.offset + self.data.len() as u64
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    fn contains(&self, media_offset: u64) -> bool {
        media_offset >= self.offset && media_offset < self.end()
    }

    fn trim_front(&mut self, count: usize) {
        self.data.advance(count);
        self.offset += count as u64;
    }
}

/// Outcome of removing bytes from the front of the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Removal {
    /// Whole chunks dropped from the front
    pub(crate) chunks_removed: usize,
    /// Total bytes dropped, including bytes trimmed from the new head
    pub(crate) bytes_removed: usize,
}

/// Ordered sequence of chunks covering a window of the logical stream
///
/// Chunks are kept in ascending, non-overlapping offset order. Adjacent
/// chunks are normally contiguous; a gap appears only when the producer
/// jumps forward (live pre-download or a contract violation).
#[derive(Debug)]
pub(crate) struct ChunkQueue {
    chunks: VecDeque<Chunk>,
    media_offset: u64,
    size: usize,
}

impl ChunkQueue {
    pub(crate) fn new(media_offset: u64) -> Self {
        Self {
            chunks: VecDeque::new(),
            media_offset,
            size: 0,
        }
    }

    /// Absolute offset of the first resident byte (or of the next expected
    /// byte when empty).
    pub(crate) fn media_offset(&self) -> u64 {
        self.media_offset
    }

    /// Total resident bytes across all chunks.
    pub(crate) fn size(&self) -> usize {
        self.size
    }

    pub(crate) fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Offset just past the last resident byte.
    pub(crate) fn end_offset(&self) -> u64 {
        self.chunks
            .back()
            .map_or(self.media_offset, Chunk::end)
    }

    pub(crate) fn head_offset(&self) -> Option<u64> {
        self.chunks.front().map(Chunk::offset)
    }

    pub(crate) fn buffered_range(&self) -> Option<Range<u64>> {
        let head = self.head_offset()?;
        Some(head..self.end_offset())
    }

    /// Appends a chunk at the tail. The chunk must start at or after
    /// `end_offset()`; callers trim overlaps before pushing.
    pub(crate) fn push_back(&mut self, chunk: Chunk) {
        debug_assert!(chunk.offset() >= self.end_offset());
        if chunk.len() == 0 {
            return;
        }
        if self.chunks.is_empty() {
            self.media_offset = chunk.offset();
        }
        self.size += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Finds the chunk holding `media_offset`, scanning forward from
    /// `start_index`.
    ///
    /// Returns `None` when the offset is outside the resident window or
    /// falls into a gap.
    pub(crate) fn locate(&self, media_offset: u64, start_index: usize) -> Option<Position> {
        let start_index = if start_index < self.chunks.len()
            && self.chunks[start_index].offset() <= media_offset
        {
            start_index
        } else {
            0
        };

        for (index, chunk) in self.chunks.iter().enumerate().skip(start_index) {
            if chunk.contains(media_offset) {
                let buffer_offset = (media_offset - chunk.offset()) as usize;
                return Some(Position::new(index, buffer_offset, media_offset));
            }
            if chunk.offset() > media_offset {
                break;
            }
        }
        None
    }

    /// Contiguous slices starting at `start`, stopping at the first gap.
    pub(crate) fn slices_from(&self, start: Position) -> ContiguousSlices<'_> {
        ContiguousSlices {
            queue: self,
            index: start.chunk_index().unwrap_or(self.chunks.len()),
            buffer_offset: start.buffer_offset as usize,
            expected_offset: start.media_offset,
        }
    }

    /// Checks that `size` contiguous bytes are resident from `start`.
    pub(crate) fn covers(&self, start: Position, size: usize) -> bool {
        let mut remaining = size;
        for (_, slice) in self.slices_from(start) {
            if slice.len() >= remaining {
                return true;
            }
            remaining -= slice.len();
        }
        remaining == 0
    }

    /// Materializes `size` bytes from `start`, returning the data and the
    /// position just past the last copied byte.
    ///
    /// A range inside a single chunk is returned as a zero-copy slice.
    pub(crate) fn copy_range(&self, start: Position, size: usize) -> Option<(Bytes, Position)> {
        let index = start.chunk_index()?;
        let first = self.chunks.get(index)?;
        let buffer_offset = start.buffer_offset as usize;
        let end_media_offset = start.media_offset + size as u64;

        if buffer_offset + size <= first.len() {
            let data = first.data.slice(buffer_offset..buffer_offset + size);
            return Some((data, Position::new(index, buffer_offset + size, end_media_offset)));
        }

        let mut out = BytesMut::with_capacity(size);
        for (chunk_index, slice) in self.slices_from(start) {
            let take = slice.len().min(size - out.len());
            out.extend_from_slice(&slice[..take]);
            if out.len() == size {
                let chunk_start = self.chunks[chunk_index].offset();
                let end = Position::new(
                    chunk_index,
                    (end_media_offset - chunk_start) as usize,
                    end_media_offset,
                );
                return Some((out.freeze(), end));
            }
        }
        None
    }

    /// Drops every resident byte below `media_offset`.
    ///
    /// Whole chunks ending at or before the offset are removed and the chunk
    /// containing it is trimmed in place. `media_offset()` never moves
    /// backwards.
    pub(crate) fn remove_to(&mut self, media_offset: u64) -> Removal {
        let mut removal = Removal::default();

        while let Some(front) = self.chunks.front_mut() {
            if front.end() <= media_offset {
                removal.chunks_removed += 1;
                removal.bytes_removed += front.len();
                self.chunks.pop_front();
            } else {
                if front.offset() < media_offset {
                    let trimmed = (media_offset - front.offset()) as usize;
                    front.trim_front(trimmed);
                    removal.bytes_removed += trimmed;
                }
                break;
            }
        }

        self.size -= removal.bytes_removed;
        self.media_offset = match self.chunks.front() {
            Some(head) => head.offset(),
            None => self.media_offset.max(media_offset),
        };
        removal
    }

    /// Drops all chunks and re-bases the window at `media_offset`.
    pub(crate) fn clear(&mut self, media_offset: u64) -> usize {
        let dropped = self.chunks.len();
        self.chunks.clear();
        self.size = 0;
        self.media_offset = media_offset;
        dropped
    }
}

/// Iterator over contiguous chunk slices, yielding `(chunk_index, slice)`
///
/// The first slice starts at the requested byte; iteration ends at the
/// queue tail or at the first gap between chunks.
pub(crate) struct ContiguousSlices<'a> {
    queue: &'a ChunkQueue,
    index: usize,
    buffer_offset: usize,
    expected_offset: u64,
}

impl<'a> Iterator for ContiguousSlices<'a> {
    type Item = (usize, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.queue.chunks.get(self.index)?;
        if chunk.offset() + self.buffer_offset as u64 != self.expected_offset {
            return None;
        }

        let slice = chunk.data.get(self.buffer_offset..)?;
        let index = self.index;
        self.expected_offset += slice.len() as u64;
        self.index += 1;
        self.buffer_offset = 0;
        Some((index, slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterned(offset: u64, len: usize) -> Bytes {
        (0..len).map(|i| ((offset as usize + i) % 251) as u8).collect()
    }

    fn queue_with(chunks: &[(u64, usize)]) -> ChunkQueue {
        let mut queue = ChunkQueue::new(chunks.first().map_or(0, |c| c.0));
        for &(offset, len) in chunks {
            queue.push_back(Chunk::new(offset, patterned(offset, len)));
        }
        queue
    }

    #[test]
    fn test_push_tracks_size_and_offsets() {
        let queue = queue_with(&[(0, 100), (100, 100), (200, 50)]);
        assert_eq!(queue.size(), 250);
        assert_eq!(queue.media_offset(), 0);
        assert_eq!(queue.end_offset(), 250);
        assert_eq!(queue.chunk_count(), 3);
        assert_eq!(queue.buffered_range(), Some(0..250));
    }

    #[test]
    fn test_locate_finds_chunk_and_byte() {
        let queue = queue_with(&[(0, 100), (100, 100), (200, 100)]);
        let position = queue.locate(150, 0).unwrap();
        assert_eq!(position.index, 1);
        assert_eq!(position.buffer_offset, 50);

        // A stale start index past the target falls back to the head
        let position = queue.locate(10, 2).unwrap();
        assert_eq!(position.index, 0);

        assert!(queue.locate(300, 0).is_none());
    }

    #[test]
    fn test_copy_range_spans_chunks() {
        let queue = queue_with(&[(0, 100), (100, 100), (200, 100)]);
        let start = queue.locate(50, 0).unwrap();
        let (data, end) = queue.copy_range(start, 200).unwrap();

        assert_eq!(data, patterned(50, 200));
        assert_eq!(end.index, 2);
        assert_eq!(end.buffer_offset, 50);
        assert_eq!(end.media_offset, 250);
    }

    #[test]
    fn test_copy_range_single_chunk_end_position() {
        let queue = queue_with(&[(0, 100), (100, 100)]);
        let start = queue.locate(20, 0).unwrap();
        let (data, end) = queue.copy_range(start, 80).unwrap();

        assert_eq!(data, patterned(20, 80));
        assert_eq!(end.index, 0);
        assert_eq!(end.buffer_offset, 100);
    }

    #[test]
    fn test_copy_stops_at_gap() {
        let queue = queue_with(&[(0, 100), (150, 100)]);
        let start = queue.locate(50, 0).unwrap();

        assert!(queue.copy_range(start, 100).is_none());
        assert!(queue.covers(start, 50));
        assert!(!queue.covers(start, 51));
    }

    #[test]
    fn test_remove_to_trims_and_drops() {
        let mut queue = queue_with(&[(0, 100), (100, 100), (200, 100)]);

        let removal = queue.remove_to(170);
        assert_eq!(
            removal,
            Removal {
                chunks_removed: 1,
                bytes_removed: 170,
            }
        );
        assert_eq!(queue.media_offset(), 170);
        assert_eq!(queue.size(), 130);
        assert_eq!(queue.chunk_count(), 2);

        let start = queue.locate(170, 0).unwrap();
        let (data, _) = queue.copy_range(start, 130).unwrap();
        assert_eq!(data, patterned(170, 130));
    }

    #[test]
    fn test_remove_past_end_rebases_empty_queue() {
        let mut queue = queue_with(&[(0, 100)]);
        let removal = queue.remove_to(500);

        assert_eq!(removal.bytes_removed, 100);
        assert!(queue.is_empty());
        assert_eq!(queue.media_offset(), 500);
        assert_eq!(queue.end_offset(), 500);
    }

    #[test]
    fn test_remove_never_rewinds() {
        let mut queue = queue_with(&[(100, 100)]);
        let removal = queue.remove_to(40);

        assert_eq!(removal, Removal::default());
        assert_eq!(queue.media_offset(), 100);
    }

    #[test]
    fn test_clear_rebases() {
        let mut queue = queue_with(&[(0, 100), (100, 100)]);
        assert_eq!(queue.clear(4096), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.media_offset(), 4096);
        assert_eq!(queue.buffered_range(), None);
    }
}
