//! Monitor-guarded chunk queue serving byte ranges to parsers

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, MutexGuard};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::chunk_queue::{Chunk, ChunkQueue, Removal};
use super::position::CursorCache;
use super::{PackerStats, Position};
use crate::config::PackerConfig;

/// Lifecycle phase of a packer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PackerPhase {
    /// Created, not yet started; already serves pushes and reads
    Idle,
    /// Accepting pushes and serving reads
    Running,
    /// End of stream signaled; buffered bytes remain servable
    Draining,
    /// Torn down; every operation fails fast
    Stopped,
}

/// State guarded by the monitor mutex
struct PackerState {
    queue: ChunkQueue,
    cursors: CursorCache,
    started: bool,
    is_eos: bool,
    stopped: bool,
    flushing: bool,
    flush_generation: u64,
    blocked_producers: usize,
    stats: PackerStats,
}

/// Capacity-bounded, randomly addressable buffer between a byte source and a
/// container parser
///
/// One producer thread pushes chunks tagged with their absolute media offset;
/// any number of parser threads read ranges. All queue inspection and
/// mutation is serialized behind one mutex; three condition variables carry
/// the wait conditions:
///
/// - full: `push_data` blocks while the resident size would exceed capacity
/// - empty: `get_or_wait_data_available` blocks until the range arrives
/// - allow-read: reads starting during a two-phase flush wait for it to end
///
/// Missing data is never an error: reads return `false`/`None` and callers
/// retry through `get_or_wait_data_available`.
pub struct StreamDataPacker {
    state: Mutex<PackerState>,
    cv_full: Condvar,
    cv_empty: Condvar,
    cv_allow_read: Condvar,
    size: AtomicUsize,
    capacity: usize,
    support_pre_download: bool,
}

impl std::fmt::Debug for StreamDataPacker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamDataPacker")
            .field("size", &self.approximate_size())
            .field("capacity", &self.capacity)
            .field("support_pre_download", &self.support_pre_download)
            .finish()
    }
}

impl StreamDataPacker {
    /// Creates an idle packer with the given configuration
    pub fn new(config: PackerConfig) -> Self {
        Self {
            state: Mutex::new(PackerState {
                queue: ChunkQueue::new(config.initial_media_offset),
                cursors: CursorCache::default(),
                started: false,
                is_eos: false,
                stopped: false,
                flushing: false,
                flush_generation: 0,
                blocked_producers: 0,
                stats: PackerStats::new(),
            }),
            cv_full: Condvar::new(),
            cv_empty: Condvar::new(),
            cv_allow_read: Condvar::new(),
            size: AtomicUsize::new(0),
            capacity: config.capacity,
            support_pre_download: config.support_pre_download,
        }
    }

    /// Arms the packer, clearing a previous stop.
    pub fn start(&self) {
        let mut state = self.state.lock();
        state.started = true;
        if state.stopped {
            state.stopped = false;
            info!("Stream data packer restarted at offset {}", state.queue.media_offset());
        } else {
            debug!("Stream data packer started");
        }
    }

    /// Stops the packer and wakes every blocked producer and consumer.
    ///
    /// Idempotent. Every blocked or later call observes the stop and fails.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        if !state.stopped {
            state.stopped = true;
            state.flushing = false;
            info!(
                "Stream data packer stopped with {} bytes resident",
                state.queue.size()
            );
        }
        drop(state);

        self.cv_full.notify_all();
        self.cv_empty.notify_all();
        self.cv_allow_read.notify_all();
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> PackerPhase {
        let state = self.state.lock();
        if state.stopped {
            PackerPhase::Stopped
        } else if !state.started {
            PackerPhase::Idle
        } else if state.is_eos {
            PackerPhase::Draining
        } else {
            PackerPhase::Running
        }
    }

    /// Appends a chunk whose first byte sits at media offset `offset`.
    ///
    /// Blocks while the packer holds bytes and the chunk would push the
    /// resident size over capacity. A chunk larger than capacity is accepted
    /// into an empty packer so the producer cannot deadlock.
    ///
    /// Offsets that do not continue the resident window are absorbed:
    /// overlapping prefixes are trimmed, chunks wholly behind the window are
    /// dropped and forward jumps are kept as a gap. Outside pre-download mode
    /// this is logged as a contract violation.
    ///
    /// Returns `false` when the chunk was rejected: the packer is stopped,
    /// draining after EOS, or a flush began before the chunk was queued.
    pub fn push_data(&self, data: Bytes, offset: u64) -> bool {
        let mut state = self.state.lock();
        if state.stopped {
            debug!("Rejecting chunk at offset {}: packer stopped", offset);
            return false;
        }
        if state.is_eos {
            warn!("Rejecting chunk at offset {} pushed after end of stream", offset);
            return false;
        }
        if state.flushing {
            debug!("Dropping chunk at offset {}: flush in progress", offset);
            return false;
        }
        if data.is_empty() {
            return true;
        }

        let generation = state.flush_generation;
        let mut waited = false;
        while !state.queue.is_empty() && state.queue.size() + data.len() > self.capacity {
            if !waited {
                waited = true;
                state.stats.producer_waits += 1;
                debug!(
                    "Producer blocked: {} resident + {} incoming > capacity {}",
                    state.queue.size(),
                    data.len(),
                    self.capacity
                );
            }
            // Waiters for bytes past the full window must not sleep through this
            state.blocked_producers += 1;
            self.cv_empty.notify_all();
            self.cv_full.wait(&mut state);
            state.blocked_producers -= 1;

            if state.stopped {
                return false;
            }
            if state.flush_generation != generation {
                debug!("Dropping chunk at offset {}: packer flushed while blocked", offset);
                return false;
            }
        }

        let Some(chunk) = self.admit(&mut state, data, offset) else {
            return true;
        };

        let accepted = chunk.len();
        state.queue.push_back(chunk);
        let resident = state.queue.size();
        self.size.store(resident, Ordering::Release);
        state.stats.record_push(accepted, resident);
        trace!("Pushed {} bytes at offset {}, {} resident", accepted, offset, resident);
        drop(state);

        self.cv_empty.notify_all();
        true
    }

    /// Fits a pushed chunk onto the tail of the resident window.
    fn admit(&self, state: &mut PackerState, data: Bytes, offset: u64) -> Option<Chunk> {
        let expected = state.queue.end_offset();
        if offset == expected {
            return Some(Chunk::new(offset, data));
        }

        let live = self.support_pre_download;
        if !live {
            state.stats.contract_violations += 1;
        }

        if offset < expected {
            let overlap = (expected - offset) as usize;
            if overlap >= data.len() {
                if live {
                    debug!("Dropping stale chunk {}..{}", offset, offset + data.len() as u64);
                } else {
                    warn!(
                        "Dropping chunk {}..{} behind resident window ending at {}",
                        offset,
                        offset + data.len() as u64,
                        expected
                    );
                }
                return None;
            }
            if live {
                debug!("Trimming {} overlapping bytes from chunk at {}", overlap, offset);
            } else {
                warn!(
                    "Chunk at offset {} overlaps resident window ending at {}, trimming {} bytes",
                    offset, expected, overlap
                );
            }
            return Some(Chunk::new(expected, data.slice(overlap..)));
        }

        if live {
            debug!("Live chunk at offset {} leaves a gap after {}", offset, expected);
        } else {
            warn!(
                "Non-contiguous push: expected offset {}, got {}, keeping gap",
                expected, offset
            );
        }
        Some(Chunk::new(offset, data))
    }

    /// Checks whether `[offset, offset + size)` is resident without gaps.
    pub fn is_data_available(&self, offset: u64, size: usize) -> bool {
        let mut state = self.state.lock();
        if !self.wait_read_gate(&mut state) {
            return false;
        }
        Self::available(&state, offset, size)
    }

    /// Copies `size` bytes starting at `offset` without consuming them.
    ///
    /// Returns `None` if any byte of the range is not resident. Repeated
    /// peeks with no intervening mutation return identical bytes.
    pub fn peek_range(&self, offset: u64, size: usize) -> Option<Bytes> {
        let mut state = self.state.lock();
        if !self.wait_read_gate(&mut state) {
            return None;
        }

        let data = Self::copy(&mut state, offset, size);
        match data {
            Some(_) => state.stats.ranges_peeked += 1,
            None => state.stats.range_misses += 1,
        }
        data
    }

    /// Copies `size` bytes starting at `offset` and evicts everything up to
    /// the end of the range.
    ///
    /// Bytes before `offset` are dropped as well; the resident window then
    /// starts at `offset + size`.
    pub fn get_range(&self, offset: u64, size: usize) -> Option<Bytes> {
        let mut state = self.state.lock();
        if !self.wait_read_gate(&mut state) {
            return None;
        }
        self.take(&mut state, offset, size)
    }

    /// Live variant of [`get_range`](Self::get_range): returns the next
    /// `size` bytes from the read cursor, ignoring absolute addressing.
    ///
    /// When `is_pre_remove` is set, `pre_remove_offset` is applied first as an
    /// eviction hint (see [`pre_remove`](Self::pre_remove)), so the returned
    /// bytes start at whichever is later: the old read cursor or the hint.
    pub fn get_range_live(
        &self,
        size: usize,
        pre_remove_offset: u64,
        is_pre_remove: bool,
    ) -> Option<Bytes> {
        let mut state = self.state.lock();
        if !self.wait_read_gate(&mut state) {
            return None;
        }

        self.apply_pre_remove(&mut state, pre_remove_offset, is_pre_remove);
        let offset = state.queue.media_offset();
        self.take(&mut state, offset, size)
    }

    /// Blocks until `[offset, offset + size)` is resident.
    ///
    /// Returns `false` when the range can no longer be satisfied: the packer
    /// stopped or was flushed while waiting, the range was already evicted
    /// or falls into a gap, end of stream was reached before it arrived, or
    /// the producer is blocked on a full packer that does not hold the whole
    /// range. In the last case the caller must consume or pre-remove resident
    /// bytes before the rest can arrive.
    pub fn get_or_wait_data_available(&self, offset: u64, size: usize) -> bool {
        let mut state = self.state.lock();
        if !self.wait_read_gate(&mut state) {
            return false;
        }

        let generation = state.flush_generation;
        let mut waited = false;
        loop {
            if state.stopped {
                return false;
            }
            if state.flush_generation != generation {
                debug!("Wait for {}+{} abandoned: packer flushed", offset, size);
                return false;
            }
            if Self::available(&state, offset, size) {
                return true;
            }
            if Self::unsatisfiable(&state, offset, size) {
                debug!("Range {}+{} can no longer become resident", offset, size);
                return false;
            }
            if state.blocked_producers > 0 {
                debug!(
                    "Range {}+{} does not fit: producer blocked with {} of {} bytes resident",
                    offset,
                    size,
                    state.queue.size(),
                    self.capacity
                );
                return false;
            }
            if state.is_eos {
                debug!(
                    "Range {}+{} exceeds buffered data {:?} after end of stream",
                    offset,
                    size,
                    state.queue.buffered_range()
                );
                return false;
            }

            if !waited {
                waited = true;
                state.stats.consumer_waits += 1;
            }
            self.cv_empty.wait(&mut state);
        }
    }

    /// Evicts resident bytes below `offset` even if no parser consumed them.
    ///
    /// Only effective when `is_pre_remove` is set and the packer was
    /// configured with pre-download support; used by unseekable live sources
    /// to bound memory at the cost of replay. Returns the bytes evicted.
    pub fn pre_remove(&self, offset: u64, is_pre_remove: bool) -> usize {
        let mut state = self.state.lock();
        if state.stopped {
            return 0;
        }
        self.apply_pre_remove(&mut state, offset, is_pre_remove)
    }

    /// Marks end of stream and wakes consumers so unsatisfiable waits fail.
    pub fn set_eos(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        if !state.is_eos {
            state.is_eos = true;
            info!(
                "End of stream at offset {}, {} bytes left to drain",
                state.queue.end_offset(),
                state.queue.size()
            );
        }
        drop(state);

        self.cv_empty.notify_all();
    }

    /// Clears the packer and re-bases it at `media_offset` (a seek target).
    ///
    /// Blocked producers drop their chunk and blocked waiters return `false`
    /// rather than resuming against the new position. Clears end of stream.
    pub fn flush(&self, media_offset: u64) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        Self::close_read_gate(&mut state);
        self.reset(&mut state, media_offset);
        drop(state);

        self.notify_all();
    }

    /// Begins a two-phase flush: closes the read gate and fails every
    /// in-flight wait. Reads starting before [`end_flush`](Self::end_flush)
    /// block; pushes are dropped.
    pub fn begin_flush(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        Self::close_read_gate(&mut state);
        debug!("Flush started at offset {}", state.queue.media_offset());
        drop(state);

        self.notify_all();
    }

    /// Completes a two-phase flush, re-basing at `media_offset` and reopening
    /// the read gate.
    pub fn end_flush(&self, media_offset: u64) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        self.reset(&mut state, media_offset);
        drop(state);

        self.notify_all();
    }

    /// Checks whether no bytes are resident.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }

    /// Resident byte count, authoritative under the lock.
    pub fn size(&self) -> usize {
        self.state.lock().queue.size()
    }

    /// Resident byte count read without taking the lock; may be stale.
    pub fn approximate_size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Absolute offset of the first resident byte.
    pub fn media_offset(&self) -> u64 {
        self.state.lock().queue.media_offset()
    }

    /// Media offsets spanned by resident chunks, or `None` when empty.
    pub fn buffered_range(&self) -> Option<Range<u64>> {
        self.state.lock().queue.buffered_range()
    }

    /// Gets a snapshot of packer statistics
    pub fn stats(&self) -> PackerStats {
        self.state.lock().stats.clone()
    }

    /// Gets a summary of packer status
    pub fn status_summary(&self) -> String {
        let state = self.state.lock();
        format!(
            "StreamDataPacker: range={:?}, chunks={}, eos={}, stopped={}, {}",
            state.queue.buffered_range(),
            state.queue.chunk_count(),
            state.is_eos,
            state.stopped,
            state.stats.format_summary(self.capacity)
        )
    }

    /// Waits while a flush is in progress. Returns `false` if the packer is
    /// stopped.
    fn wait_read_gate(&self, state: &mut MutexGuard<'_, PackerState>) -> bool {
        while state.flushing && !state.stopped {
            self.cv_allow_read.wait(state);
        }
        !state.stopped
    }

    fn available(state: &PackerState, offset: u64, size: usize) -> bool {
        let queue = &state.queue;
        if size == 0 {
            return offset >= queue.media_offset() && offset <= queue.end_offset();
        }
        Self::range_start(state, offset).is_some_and(|start| queue.covers(start, size))
    }

    /// Checks whether a missing range can never be filled by later pushes:
    /// it starts below the window, or its resident part has a gap.
    fn unsatisfiable(state: &PackerState, offset: u64, size: usize) -> bool {
        let queue = &state.queue;
        if offset < queue.media_offset() {
            return true;
        }
        let end = queue.end_offset();
        if offset >= end || queue.is_empty() {
            return false;
        }
        let resident_part = ((end - offset) as usize).min(size);
        !Self::available(state, offset, resident_part)
    }

    /// Locates `offset`, starting from the nearest cached cursor.
    fn range_start(state: &PackerState, offset: u64) -> Option<Position> {
        let start_index = state.cursors.scan_start(offset);
        state.queue.locate(offset, start_index)
    }

    /// Materializes a range and records its boundaries in the cursor cache.
    fn copy(state: &mut PackerState, offset: u64, size: usize) -> Option<Bytes> {
        if size == 0 {
            return Self::available(state, offset, 0).then(Bytes::new);
        }

        let start = Self::range_start(state, offset)?;
        let (data, end) = state.queue.copy_range(start, size)?;
        state.cursors.record(start, end);
        Some(data)
    }

    fn take(&self, state: &mut PackerState, offset: u64, size: usize) -> Option<Bytes> {
        let Some(data) = Self::copy(state, offset, size) else {
            state.stats.range_misses += 1;
            return None;
        };

        state.stats.ranges_served += 1;
        self.remove_front(state, offset + size as u64, false);
        Some(data)
    }

    fn apply_pre_remove(&self, state: &mut PackerState, offset: u64, is_pre_remove: bool) -> usize {
        if !is_pre_remove {
            return 0;
        }
        if !self.support_pre_download {
            debug!("Ignoring pre-remove to {}: pre-download not supported", offset);
            return 0;
        }

        let removal = self.remove_front(state, offset, true);
        if removal.bytes_removed > 0 {
            debug!(
                "Pre-removed {} bytes, window now starts at {}",
                removal.bytes_removed,
                state.queue.media_offset()
            );
        }
        removal.bytes_removed
    }

    /// Drops bytes below `offset` and rebases cursors onto the new front.
    fn remove_front(&self, state: &mut PackerState, offset: u64, pre_removed: bool) -> Removal {
        let removal = state.queue.remove_to(offset);
        if removal.bytes_removed == 0 {
            return removal;
        }

        state
            .cursors
            .on_front_removed(removal.chunks_removed, state.queue.head_offset());
        let resident = state.queue.size();
        self.size.store(resident, Ordering::Release);
        state.stats.record_removal(
            removal.chunks_removed,
            removal.bytes_removed,
            resident,
            pre_removed,
        );
        self.cv_full.notify_all();
        removal
    }

    fn close_read_gate(state: &mut PackerState) {
        state.flushing = true;
        state.flush_generation += 1;
    }

    fn reset(&self, state: &mut PackerState, media_offset: u64) {
        let dropped = state.queue.clear(media_offset);
        state.cursors.invalidate();
        state.is_eos = false;
        state.flushing = false;
        state.flush_generation += 1;
        state.stats.flushes += 1;
        state.stats.set_resident(0);
        self.size.store(0, Ordering::Release);
        info!("Flushed {} chunks, re-based at offset {}", dropped, media_offset);
    }

    fn notify_all(&self) {
        self.cv_full.notify_all();
        self.cv_empty.notify_all();
        self.cv_allow_read.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::*;

    const WAIT: Duration = Duration::from_secs(2);

    fn wait_until(condition: impl Fn() -> bool) {
        let deadline = Instant::now() + WAIT;
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn patterned(offset: u64, len: usize) -> Bytes {
        (0..len).map(|i| ((offset as usize + i) % 251) as u8).collect()
    }

    fn packer_with_chunks(chunks: &[(u64, usize)]) -> StreamDataPacker {
        let packer = StreamDataPacker::new(PackerConfig::default());
        for &(offset, len) in chunks {
            assert!(packer.push_data(patterned(offset, len), offset));
        }
        packer
    }

    #[test]
    fn test_get_range_across_chunks_evicts_prefix() {
        let packer = packer_with_chunks(&[(0, 100), (100, 100), (200, 100)]);

        let data = packer.get_range(50, 120).unwrap();
        assert_eq!(data, patterned(50, 120));

        assert!(!packer.is_data_available(0, 50));
        assert!(!packer.is_data_available(50, 120));
        assert!(packer.is_data_available(170, 30));
        assert!(packer.is_data_available(170, 130));
        assert_eq!(packer.media_offset(), 170);
        assert_eq!(packer.size(), 130);
    }

    #[test]
    fn test_peek_is_idempotent() {
        let packer = packer_with_chunks(&[(0, 64), (64, 64), (128, 64)]);

        let first = packer.peek_range(30, 100).unwrap();
        let second = packer.peek_range(30, 100).unwrap();
        assert_eq!(first, second);
        assert_eq!(first, patterned(30, 100));
        assert_eq!(packer.size(), 192);
        assert_eq!(packer.stats().ranges_peeked, 2);
    }

    #[test]
    fn test_contiguous_pushes_are_available() {
        let packer = packer_with_chunks(&[(0, 10), (10, 7), (17, 33)]);
        let media_offset = packer.media_offset();

        for n in 0..=packer.size() {
            assert!(packer.is_data_available(media_offset, n));
        }
        assert!(!packer.is_data_available(media_offset, packer.size() + 1));
    }

    #[test]
    fn test_sequential_reads_follow_cursor() {
        let packer = packer_with_chunks(&[(0, 16), (16, 16), (32, 16), (48, 16)]);

        let mut offset = 0;
        while offset < 64 {
            let data = packer
                .peek_range(offset, 12)
                .or_else(|| packer.peek_range(offset, 64 - offset as usize))
                .unwrap();
            assert_eq!(data, patterned(offset, data.len()));
            offset += data.len() as u64;
        }

        // Backward read falls back to a head scan
        assert_eq!(packer.peek_range(4, 8).unwrap(), patterned(4, 8));
    }

    #[test]
    fn test_missing_range_is_not_an_error() {
        let packer = packer_with_chunks(&[(0, 100)]);

        assert!(packer.peek_range(50, 100).is_none());
        assert!(packer.get_range(50, 100).is_none());
        assert_eq!(packer.size(), 100);
        assert_eq!(packer.stats().range_misses, 2);
    }

    #[test]
    fn test_overlapping_push_is_trimmed() {
        let packer = packer_with_chunks(&[(0, 100)]);

        assert!(packer.push_data(patterned(80, 40), 80));
        assert_eq!(packer.size(), 120);
        assert_eq!(packer.peek_range(0, 120).unwrap(), patterned(0, 120));
        assert_eq!(packer.stats().contract_violations, 1);

        // Wholly stale chunk is absorbed
        assert!(packer.push_data(patterned(10, 20), 10));
        assert_eq!(packer.size(), 120);
    }

    #[test]
    fn test_forward_jump_keeps_gap() {
        let packer = packer_with_chunks(&[(0, 100), (150, 50)]);

        assert!(packer.is_data_available(0, 100));
        assert!(packer.is_data_available(150, 50));
        assert!(!packer.is_data_available(90, 70));
        assert!(packer.peek_range(90, 70).is_none());

        // Waiting on a gap returns instead of blocking forever
        assert!(!packer.get_or_wait_data_available(90, 70));
    }

    #[test]
    fn test_live_get_with_pre_remove() {
        let packer = StreamDataPacker::new(PackerConfig::live());
        for offset in (0..400).step_by(100) {
            assert!(packer.push_data(patterned(offset, 100), offset));
        }

        let data = packer.get_range_live(50, 0, false).unwrap();
        assert_eq!(data, patterned(0, 50));

        // Parser already scanned up to 250 via peeks; drop that prefix
        let data = packer.get_range_live(30, 250, true).unwrap();
        assert_eq!(data, patterned(250, 30));
        assert_eq!(packer.media_offset(), 280);

        let stats = packer.stats();
        assert_eq!(stats.bytes_pre_removed, 200);
        assert_eq!(stats.bytes_consumed, 80);
    }

    #[test]
    fn test_pre_remove_requires_support() {
        let packer = packer_with_chunks(&[(0, 100), (100, 100)]);
        assert_eq!(packer.pre_remove(150, true), 0);
        assert_eq!(packer.size(), 200);

        let live = StreamDataPacker::new(PackerConfig::live());
        live.push_data(patterned(0, 100), 0);
        live.push_data(patterned(100, 100), 100);
        assert_eq!(live.pre_remove(150, false), 0);
        assert_eq!(live.pre_remove(150, true), 150);
        assert_eq!(live.peek_range(150, 50).unwrap(), patterned(150, 50));
        assert!(!live.is_data_available(100, 10));
    }

    #[test]
    fn test_live_pushes_behind_pre_removed_window_are_dropped() {
        let live = StreamDataPacker::new(PackerConfig::live());
        live.push_data(patterned(0, 100), 0);
        assert_eq!(live.pre_remove(300, true), 100);
        assert_eq!(live.media_offset(), 300);

        assert!(live.push_data(patterned(100, 100), 100));
        assert!(live.push_data(patterned(200, 150), 200));
        assert_eq!(live.buffered_range(), Some(300..350));
        assert_eq!(live.stats().contract_violations, 0);
    }

    #[test]
    fn test_cursor_survives_eviction() {
        let packer = packer_with_chunks(&[(0, 100), (100, 100), (200, 100), (300, 100)]);

        assert_eq!(packer.get_range(0, 150).unwrap(), patterned(0, 150));
        assert_eq!(packer.peek_range(250, 100).unwrap(), patterned(250, 100));
        assert_eq!(packer.get_range(150, 100).unwrap(), patterned(150, 100));
        assert_eq!(packer.peek_range(260, 40).unwrap(), patterned(260, 40));
        assert_eq!(packer.get_range(250, 150).unwrap(), patterned(250, 150));
        assert!(packer.is_empty());
        assert_eq!(packer.media_offset(), 400);
    }

    #[test]
    fn test_flush_resets_and_rebases() {
        let packer = packer_with_chunks(&[(0, 100), (100, 100)]);
        packer.set_eos();
        assert_eq!(packer.phase(), PackerPhase::Idle);

        packer.flush(5000);
        assert!(packer.is_empty());
        assert_eq!(packer.media_offset(), 5000);
        assert_eq!(packer.approximate_size(), 0);

        // EOS cleared: pushes at the seek target are accepted again
        assert!(packer.push_data(patterned(5000, 10), 5000));
        assert_eq!(packer.peek_range(5000, 10).unwrap(), patterned(5000, 10));
        assert_eq!(packer.stats().flushes, 1);
    }

    #[test]
    fn test_phase_transitions() {
        let packer = StreamDataPacker::new(PackerConfig::default());
        assert_eq!(packer.phase(), PackerPhase::Idle);

        packer.start();
        assert_eq!(packer.phase(), PackerPhase::Running);

        packer.set_eos();
        assert_eq!(packer.phase(), PackerPhase::Draining);
        assert!(!packer.push_data(patterned(0, 10), 0));

        packer.flush(0);
        assert_eq!(packer.phase(), PackerPhase::Running);

        packer.stop();
        packer.stop();
        assert_eq!(packer.phase(), PackerPhase::Stopped);
        assert!(!packer.push_data(patterned(0, 10), 0));
        assert!(packer.peek_range(0, 0).is_none());

        // Stopped is terminal until restarted
        packer.set_eos();
        packer.flush(700);
        packer.begin_flush();
        assert_eq!(packer.media_offset(), 0);
        assert_eq!(packer.stats().flushes, 1);

        packer.start();
        assert_eq!(packer.phase(), PackerPhase::Running);
        assert!(packer.is_data_available(0, 0));
        assert!(packer.push_data(patterned(0, 10), 0));
    }

    #[test]
    fn test_eos_fails_unsatisfiable_wait() {
        let packer = packer_with_chunks(&[(0, 100)]);
        packer.set_eos();

        assert!(packer.get_or_wait_data_available(0, 100));
        assert!(!packer.get_or_wait_data_available(0, 101));
        assert!(packer.get_range(0, 100).is_some());
        assert!(!packer.get_or_wait_data_available(0, 1));
    }

    #[test]
    fn test_wait_released_by_push() {
        let packer = Arc::new(packer_with_chunks(&[(0, 10)]));
        let (tx, rx) = mpsc::channel();

        let waiter = Arc::clone(&packer);
        let handle = thread::spawn(move || {
            tx.send(waiter.get_or_wait_data_available(0, 30)).unwrap();
        });

        wait_until(|| packer.stats().consumer_waits == 1);
        packer.push_data(patterned(10, 20), 10);

        assert!(rx.recv_timeout(WAIT).unwrap());
        handle.join().unwrap();
        assert_eq!(packer.stats().consumer_waits, 1);
    }

    #[test]
    fn test_backpressure_released_by_get() {
        let packer = Arc::new(StreamDataPacker::new(
            PackerConfig::default().with_capacity(200),
        ));
        packer.push_data(patterned(0, 150), 0);

        let (tx, rx) = mpsc::channel();
        let producer = Arc::clone(&packer);
        let handle = thread::spawn(move || {
            tx.send(producer.push_data(patterned(150, 100), 150)).unwrap();
        });

        wait_until(|| packer.stats().producer_waits == 1);
        assert!(rx.recv_timeout(Duration::from_millis(20)).is_err());
        assert_eq!(packer.size(), 150);

        assert!(packer.get_range(0, 100).is_some());
        assert!(rx.recv_timeout(WAIT).unwrap());
        handle.join().unwrap();
        assert_eq!(packer.buffered_range(), Some(100..250));
    }

    #[test]
    fn test_wait_past_full_window_fails_instead_of_deadlocking() {
        let packer = Arc::new(StreamDataPacker::new(
            PackerConfig::default().with_capacity(100),
        ));

        let (producer_tx, producer_rx) = mpsc::channel();
        let producer = Arc::clone(&packer);
        let producer_handle = thread::spawn(move || {
            let accepted = (0..4u64)
                .filter(|i| producer.push_data(patterned(i * 50, 50), i * 50))
                .count();
            producer_tx.send(accepted).unwrap();
        });

        let (waiter_tx, waiter_rx) = mpsc::channel();
        let waiter = Arc::clone(&packer);
        let waiter_handle = thread::spawn(move || {
            waiter_tx.send(waiter.get_or_wait_data_available(0, 150)).unwrap();
        });

        assert!(!waiter_rx.recv_timeout(WAIT).unwrap());
        waiter_handle.join().unwrap();
        assert_eq!(packer.buffered_range(), Some(0..100));

        // Consuming what is resident lets the producer finish
        assert_eq!(packer.get_range(0, 100).unwrap(), patterned(0, 100));
        assert_eq!(producer_rx.recv_timeout(WAIT).unwrap(), 4);
        producer_handle.join().unwrap();
        assert_eq!(packer.peek_range(100, 100).unwrap(), patterned(100, 100));
    }

    #[test]
    fn test_oversized_chunk_enters_empty_packer() {
        let packer = StreamDataPacker::new(PackerConfig::default().with_capacity(10));
        assert!(packer.push_data(patterned(0, 64), 0));
        assert_eq!(packer.size(), 64);
    }

    #[test]
    fn test_flush_fails_blocked_producer() {
        let packer = Arc::new(StreamDataPacker::new(
            PackerConfig::default().with_capacity(100),
        ));
        packer.push_data(patterned(0, 100), 0);

        let (tx, rx) = mpsc::channel();
        let producer = Arc::clone(&packer);
        let handle = thread::spawn(move || {
            tx.send(producer.push_data(patterned(100, 50), 100)).unwrap();
        });

        wait_until(|| packer.stats().producer_waits == 1);
        packer.flush(1000);

        assert!(!rx.recv_timeout(WAIT).unwrap());
        handle.join().unwrap();
        assert!(packer.is_empty());
    }

    #[test]
    fn test_two_phase_flush_gates_reads() {
        let packer = Arc::new(packer_with_chunks(&[(0, 100)]));
        packer.begin_flush();
        assert!(!packer.push_data(patterned(100, 10), 100));

        let (tx, rx) = mpsc::channel();
        let reader = Arc::clone(&packer);
        let handle = thread::spawn(move || {
            tx.send(reader.is_data_available(2000, 0)).unwrap();
        });

        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
        packer.end_flush(2000);

        assert!(rx.recv_timeout(WAIT).unwrap());
        handle.join().unwrap();
    }

    #[test]
    fn test_stop_releases_gated_reader() {
        let packer = Arc::new(packer_with_chunks(&[(0, 100)]));
        packer.begin_flush();

        let (tx, rx) = mpsc::channel();
        let reader = Arc::clone(&packer);
        let handle = thread::spawn(move || {
            tx.send(reader.peek_range(0, 10)).unwrap();
        });

        thread::sleep(Duration::from_millis(20));
        packer.stop();

        assert!(rx.recv_timeout(WAIT).unwrap().is_none());
        handle.join().unwrap();
    }

    #[test]
    fn test_status_summary() {
        let packer = packer_with_chunks(&[(0, 100), (100, 100)]);
        let summary = packer.status_summary();
        assert!(summary.contains("range=Some(0..200)"));
        assert!(summary.contains("chunks=2"));
    }
}
