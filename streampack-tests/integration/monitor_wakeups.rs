//! Wakeup behavior of blocked producers and consumers
//!
//! Every test blocks real threads on the packer and checks that the matching
//! state change releases them with the right result.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use streampack_core::source::test_fixtures::patterned_bytes;
use streampack_core::{PackerConfig, PackerPhase, StreamDataPacker};

const TIMEOUT: Duration = Duration::from_secs(2);

fn started_packer(config: PackerConfig) -> Arc<StreamDataPacker> {
    let packer = Arc::new(StreamDataPacker::new(config));
    packer.start();
    packer
}

fn chunk(offset: u64, len: usize) -> Bytes {
    Bytes::from(patterned_bytes(offset, len))
}

/// Polls `condition` until it holds or the timeout elapses.
fn wait_until(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(1));
    }
}

/// Spawns a reader blocked in `get_or_wait_data_available`.
fn spawn_waiter(packer: &Arc<StreamDataPacker>, offset: u64, size: usize) -> Receiver<bool> {
    let (tx, rx) = mpsc::channel();
    let packer = Arc::clone(packer);
    thread::spawn(move || {
        let _ = tx.send(packer.get_or_wait_data_available(offset, size));
    });
    rx
}

#[test]
fn test_stop_releases_every_waiting_reader() {
    let packer = started_packer(PackerConfig::default());
    let waiters: Vec<_> = (0..4)
        .map(|i| spawn_waiter(&packer, i * 100, 100))
        .collect();
    wait_until(|| packer.stats().consumer_waits == 4);

    packer.stop();

    for waiter in waiters {
        assert_eq!(waiter.recv_timeout(TIMEOUT), Ok(false));
    }
    assert_eq!(packer.phase(), PackerPhase::Stopped);
    assert!(!packer.push_data(chunk(0, 10), 0));
}

#[test]
fn test_flush_fails_waiter_and_rebases() {
    let packer = started_packer(PackerConfig::default());
    assert!(packer.push_data(chunk(0, 100), 0));
    let waiter = spawn_waiter(&packer, 50, 200);
    wait_until(|| packer.stats().consumer_waits == 1);

    packer.flush(10_000);

    assert_eq!(waiter.recv_timeout(TIMEOUT), Ok(false));
    assert!(packer.is_empty());
    assert_eq!(packer.media_offset(), 10_000);

    // The packer keeps serving at the new position
    assert!(packer.push_data(chunk(10_000, 64), 10_000));
    let data = packer.get_range(10_000, 64).unwrap();
    assert_eq!(&data[..], &patterned_bytes(10_000, 64)[..]);
}

#[test]
fn test_end_of_stream_fails_unsatisfiable_wait() {
    let packer = started_packer(PackerConfig::default());
    assert!(packer.push_data(chunk(0, 100), 0));
    let waiter = spawn_waiter(&packer, 0, 200);
    wait_until(|| packer.stats().consumer_waits == 1);

    packer.set_eos();

    assert_eq!(waiter.recv_timeout(TIMEOUT), Ok(false));
    assert_eq!(packer.phase(), PackerPhase::Draining);
    // Resident bytes stay servable after end of stream
    assert!(packer.get_or_wait_data_available(0, 100));
    assert_eq!(packer.get_range(0, 100).unwrap().len(), 100);
    assert!(packer.is_empty());
}

#[test]
fn test_push_releases_only_satisfied_waiters() {
    let packer = started_packer(PackerConfig::default());
    let early = spawn_waiter(&packer, 0, 50);
    let late = spawn_waiter(&packer, 100, 50);
    wait_until(|| packer.stats().consumer_waits == 2);

    assert!(packer.push_data(chunk(0, 100), 0));
    assert_eq!(early.recv_timeout(TIMEOUT), Ok(true));
    assert!(late.recv_timeout(Duration::from_millis(50)).is_err());

    assert!(packer.push_data(chunk(100, 100), 100));
    assert_eq!(late.recv_timeout(TIMEOUT), Ok(true));
}

#[test]
fn test_consumption_releases_blocked_producer() {
    let packer = started_packer(PackerConfig::default().with_capacity(300));
    for i in 0..3 {
        assert!(packer.push_data(chunk(i * 100, 100), i * 100));
    }

    let (tx, rx) = mpsc::channel();
    let producer = Arc::clone(&packer);
    thread::spawn(move || {
        let _ = tx.send(producer.push_data(chunk(300, 100), 300));
    });
    wait_until(|| packer.stats().producer_waits == 1);
    assert_eq!(packer.size(), 300);

    let data = packer.get_range(0, 100).unwrap();
    assert_eq!(&data[..], &patterned_bytes(0, 100)[..]);

    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(true));
    assert_eq!(packer.size(), 300);
    assert_eq!(packer.buffered_range(), Some(100..400));
}

#[test]
fn test_pre_remove_releases_blocked_producer() {
    let packer = started_packer(PackerConfig::live().with_capacity(200));
    assert!(packer.push_data(chunk(0, 100), 0));
    assert!(packer.push_data(chunk(100, 100), 100));

    let (tx, rx) = mpsc::channel();
    let producer = Arc::clone(&packer);
    thread::spawn(move || {
        let _ = tx.send(producer.push_data(chunk(200, 100), 200));
    });
    wait_until(|| packer.stats().producer_waits == 1);

    assert_eq!(packer.pre_remove(150, true), 150);

    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(true));
    assert_eq!(packer.buffered_range(), Some(150..300));
    let data = packer.get_range_live(150, 0, false).unwrap();
    assert_eq!(&data[..], &patterned_bytes(150, 150)[..]);
}

#[test]
fn test_two_phase_flush_holds_readers_until_rebased() {
    let packer = started_packer(PackerConfig::default());
    assert!(packer.push_data(chunk(0, 100), 0));

    packer.begin_flush();
    assert!(!packer.push_data(chunk(100, 100), 100));

    let (tx, rx) = mpsc::channel();
    let reader = Arc::clone(&packer);
    thread::spawn(move || {
        let _ = tx.send(reader.peek_range(5_000, 10));
    });
    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());

    packer.end_flush(5_000);
    // The gated read runs against the empty, rebased window
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(None));

    assert!(packer.push_data(chunk(5_000, 10), 5_000));
    assert_eq!(
        packer.peek_range(5_000, 10).as_deref(),
        Some(&patterned_bytes(5_000, 10)[..])
    );
}

#[test]
fn test_wait_larger_than_capacity_returns_under_backpressure() {
    let packer = started_packer(PackerConfig::default().with_capacity(100));
    let waiter = spawn_waiter(&packer, 0, 150);
    wait_until(|| packer.stats().consumer_waits == 1);

    let (tx, rx) = mpsc::channel();
    let producer = Arc::clone(&packer);
    thread::spawn(move || {
        for i in 0..4u64 {
            if !producer.push_data(chunk(i * 50, 50), i * 50) {
                break;
            }
        }
        producer.set_eos();
        let _ = tx.send(());
    });

    // The producer blocking on the full window wakes the sleeping waiter
    assert_eq!(waiter.recv_timeout(TIMEOUT), Ok(false));
    assert_eq!(packer.stats().producer_waits, 1);

    // A parser falls back to what is resident and keeps going
    let mut consumed = Vec::new();
    let mut offset = 0u64;
    while offset < 200 {
        let size = if packer.get_or_wait_data_available(offset, 150) {
            150
        } else {
            packer.size()
        };
        let data = packer.get_range(offset, size).unwrap();
        offset += data.len() as u64;
        consumed.extend_from_slice(&data);
    }
    assert_eq!(consumed, patterned_bytes(0, 200));
    assert_eq!(rx.recv_timeout(TIMEOUT), Ok(()));
}
