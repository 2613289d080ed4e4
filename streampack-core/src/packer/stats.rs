//! Statistics tracking for stream data packer operations

use std::time::Instant;

use serde::Serialize;

/// Counters for packer usage and producer/consumer contention
#[derive(Debug, Clone, Default, Serialize)]
pub struct PackerStats {
    /// Total number of chunks accepted by `push_data`
    pub chunks_pushed: u64,

    /// Total bytes accepted by `push_data`
    pub bytes_pushed: u64,

    /// Number of successful destructive reads
    pub ranges_served: u64,

    /// Number of successful non-destructive reads
    pub ranges_peeked: u64,

    /// Number of reads that found the range missing
    pub range_misses: u64,

    /// Bytes removed from the front by consumption
    pub bytes_consumed: u64,

    /// Bytes dropped ahead of consumption by live pre-remove
    pub bytes_pre_removed: u64,

    /// Whole chunks dropped from the queue
    pub chunks_evicted: u64,

    /// Times the producer blocked on a full packer
    pub producer_waits: u64,

    /// Times a consumer blocked waiting for data
    pub consumer_waits: u64,

    /// Number of completed flushes
    pub flushes: u64,

    /// Pushes whose offset did not continue the resident window
    pub contract_violations: u64,

    /// Bytes currently resident
    pub bytes_buffered: u64,

    /// Maximum bytes resident at any point
    pub peak_bytes_buffered: u64,

    /// When the first chunk was accepted
    #[serde(skip)]
    pub first_push_time: Option<Instant>,
}

impl PackerStats {
    /// Creates new empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculates buffer utilization as percentage (0-100)
    pub fn utilization_percent(&self, capacity: usize) -> f64 {
        if capacity == 0 {
            return 0.0;
        }
        (self.bytes_buffered as f64 / capacity as f64) * 100.0
    }

    /// Calculates hit ratio for range requests (0-1)
    ///
    /// Both peeks and gets count as hits; a miss is any read that found
    /// the range not yet resident.
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.ranges_served + self.ranges_peeked;
        let total_requests = hits + self.range_misses;
        if total_requests == 0 {
            return 0.0;
        }
        hits as f64 / total_requests as f64
    }

    /// Calculates push throughput in bytes per second since the first push
    pub fn data_rate_bps(&self) -> f64 {
        let Some(first) = self.first_push_time else {
            return 0.0;
        };
        let elapsed = first.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_pushed as f64 / elapsed
    }

    pub(crate) fn record_push(&mut self, chunk_size: usize, resident: usize) {
        self.chunks_pushed += 1;
        self.bytes_pushed += chunk_size as u64;
        self.set_resident(resident);
        if self.first_push_time.is_none() {
            self.first_push_time = Some(Instant::now());
        }
    }

    pub(crate) fn record_removal(&mut self, chunks: usize, bytes: usize, resident: usize, pre_removed: bool) {
        self.chunks_evicted += chunks as u64;
        if pre_removed {
            self.bytes_pre_removed += bytes as u64;
        } else {
            self.bytes_consumed += bytes as u64;
        }
        self.set_resident(resident);
    }

    pub(crate) fn set_resident(&mut self, resident: usize) {
        self.bytes_buffered = resident as u64;
        self.peak_bytes_buffered = self.peak_bytes_buffered.max(self.bytes_buffered);
    }

    /// Formats statistics as human-readable string
    pub fn format_summary(&self, capacity: usize) -> String {
        format!(
            "Packer Stats: {} chunks / {:.1}MB pushed, {:.1}MB/{:.1}MB resident ({:.1}%), peak {:.1}MB, hit ratio: {:.1}%, waits: {} producer / {} consumer, flushes: {}",
            self.chunks_pushed,
            self.bytes_pushed as f64 / 1024.0 / 1024.0,
            self.bytes_buffered as f64 / 1024.0 / 1024.0,
            capacity as f64 / 1024.0 / 1024.0,
            self.utilization_percent(capacity),
            self.peak_bytes_buffered as f64 / 1024.0 / 1024.0,
            self.hit_ratio() * 100.0,
            self.producer_waits,
            self.consumer_waits,
            self.flushes
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packer_stats_new() {
        let stats = PackerStats::new();
        assert_eq!(stats.chunks_pushed, 0);
        assert_eq!(stats.bytes_buffered, 0);
        assert!(stats.first_push_time.is_none());
        assert_eq!(stats.data_rate_bps(), 0.0);
    }

    #[test]
    fn test_record_push_tracks_peak() {
        let mut stats = PackerStats::new();

        stats.record_push(1024, 1024);
        stats.record_push(1024, 2048);
        stats.record_removal(1, 1024, 1024, false);

        assert_eq!(stats.chunks_pushed, 2);
        assert_eq!(stats.bytes_pushed, 2048);
        assert_eq!(stats.bytes_buffered, 1024);
        assert_eq!(stats.peak_bytes_buffered, 2048);
        assert_eq!(stats.bytes_consumed, 1024);
        assert_eq!(stats.chunks_evicted, 1);
        assert!(stats.first_push_time.is_some());
    }

    #[test]
    fn test_pre_removed_bytes_counted_separately() {
        let mut stats = PackerStats::new();
        stats.record_removal(2, 300, 0, true);

        assert_eq!(stats.bytes_pre_removed, 300);
        assert_eq!(stats.bytes_consumed, 0);
    }

    #[test]
    fn test_utilization_percent() {
        let mut stats = PackerStats::new();
        stats.bytes_buffered = 5000;

        assert_eq!(stats.utilization_percent(10000), 50.0);
        assert_eq!(stats.utilization_percent(0), 0.0);
    }

    #[test]
    fn test_hit_ratio() {
        let mut stats = PackerStats::new();
        assert_eq!(stats.hit_ratio(), 0.0);

        stats.ranges_served = 6;
        stats.ranges_peeked = 2;
        stats.range_misses = 2;
        assert_eq!(stats.hit_ratio(), 0.8);
    }

    #[test]
    fn test_format_summary() {
        let mut stats = PackerStats::new();
        stats.chunks_pushed = 100;
        stats.bytes_buffered = 1024 * 1024;
        stats.ranges_served = 80;
        stats.range_misses = 20;

        let summary = stats.format_summary(10 * 1024 * 1024);
        assert!(summary.contains("100 chunks"));
        assert!(summary.contains("1.0MB/10.0MB"));
        assert!(summary.contains("80.0%"));
    }
}
