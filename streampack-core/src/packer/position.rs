//! Queue positions and the read cursor cache

use std::cmp::Ordering;

/// Location of a byte inside the chunk queue
///
/// A plain value: `index` addresses a chunk in the queue, `buffer_offset` a
/// byte inside that chunk and `media_offset` the same byte in the logical
/// stream. `buffer_offset` may equal the chunk length, marking the position
/// just past its last byte.
#[derive(Debug, Clone, Copy)]
pub struct Position {
    pub index: i32,
    pub buffer_offset: u32,
    pub media_offset: u64,
}

impl Position {
    /// Position that refers to nothing.
    pub const INVALID: Position = Position {
        index: -1,
        buffer_offset: 0,
        media_offset: 0,
    };

    pub fn new(index: usize, buffer_offset: usize, media_offset: u64) -> Self {
        Self {
            index: i32::try_from(index).unwrap_or(i32::MAX),
            buffer_offset: u32::try_from(buffer_offset).unwrap_or(u32::MAX),
            media_offset,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.index >= 0
    }

    /// Chunk index, if the position is valid.
    pub fn chunk_index(&self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }

    pub fn invalidate(&mut self) {
        *self = Self::INVALID;
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::INVALID
    }
}

// Invalid positions are unordered, so `<` against them is always false.
impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if !self.is_valid() || !other.is_valid() {
            return None;
        }
        Some(
            self.index
                .cmp(&other.index)
                .then(self.buffer_offset.cmp(&other.buffer_offset)),
        )
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

/// The two most recent read boundaries
///
/// Sequential range requests resume scanning from here instead of from the
/// queue head, keeping forward scans amortized O(1).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CursorCache {
    pub(crate) prev_get: Position,
    pub(crate) current_get: Position,
}

impl CursorCache {
    /// Chunk index to start scanning from when looking for `offset`.
    ///
    /// Uses the nearest cached cursor at or before `offset`; falls back to
    /// the queue head.
    pub(crate) fn scan_start(&self, offset: u64) -> usize {
        [self.current_get, self.prev_get]
            .into_iter()
            .filter(|cursor| cursor.is_valid() && cursor.media_offset <= offset)
            .max_by_key(|cursor| cursor.media_offset)
            .and_then(|cursor| cursor.chunk_index())
            .unwrap_or(0)
    }

    /// Records the boundaries of a completed read.
    pub(crate) fn record(&mut self, start: Position, end: Position) {
        self.prev_get = start;
        self.current_get = end;
    }

    /// Rebases cursors after `removed_chunks` whole chunks left the front of
    /// the queue and the new head chunk now starts at `head_offset`.
    ///
    /// Cursors into removed chunks, or into bytes trimmed from the new head,
    /// are invalidated.
    pub(crate) fn on_front_removed(&mut self, removed_chunks: usize, head_offset: Option<u64>) {
        for cursor in [&mut self.prev_get, &mut self.current_get] {
            let Some(index) = cursor.chunk_index() else {
                continue;
            };
            if index < removed_chunks {
                cursor.invalidate();
                continue;
            }

            let index = index - removed_chunks;
            if index == 0 {
                match head_offset {
                    Some(head) if cursor.media_offset >= head => {
                        *cursor = Position::new(0, (cursor.media_offset - head) as usize, cursor.media_offset);
                    }
                    _ => cursor.invalidate(),
                }
            } else {
                cursor.index = index as i32;
            }
        }
    }

    pub(crate) fn invalidate(&mut self) {
        self.prev_get.invalidate();
        self.current_get.invalidate();
    }
}
