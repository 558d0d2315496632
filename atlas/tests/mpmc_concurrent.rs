//! Concurrent stress tests for the MPMC queue.
//!
//! The main scenario drives the queue from both sides at once:
//! 1. Four producer threads each enqueue 100 000 values tagged with their
//!    producer id and a monotonic counter
//! 2. Four consumer threads dequeue until all 400 000 values are observed
//! 3. After join: exact conservation (every value exactly once) and
//!    per-producer FIFO within every consumer's local stream
//!
//! # Running with tracing
//!
//! ```bash
//! RUST_LOG=atlas=debug cargo test --features tracing --test mpmc_concurrent -- --nocapture
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::thread;

use atlas::mpmc::MpmcQueue;

static INIT_TRACING: Once = Once::new();

/// Initialize tracing for tests (only once).
fn init_test_tracing() {
    INIT_TRACING.call_once(|| {
        atlas::init_tracing();
    });
}

const PRODUCERS: u64 = 4;
const CONSUMERS: usize = 4;
const ITEMS_PER_PRODUCER: u64 = 100_000;

fn tag(producer: u64, counter: u64) -> u64 {
    (producer << 32) | counter
}

fn untag(value: u64) -> (u64, u64) {
    (value >> 32, value & 0xFFFF_FFFF)
}

#[test]
fn concurrent_conservation_and_per_producer_fifo() {
    init_test_tracing();

    let total = (PRODUCERS * ITEMS_PER_PRODUCER) as usize;
    let queue = Arc::new(MpmcQueue::<u64>::new(1024));
    let consumed = Arc::new(AtomicUsize::new(0));

    let consumers: Vec<_> = (0..CONSUMERS)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            thread::spawn(move || {
                let mut taken = Vec::new();
                loop {
                    match queue.pop() {
                        Some(value) => {
                            taken.push(value);
                            consumed.fetch_add(1, Ordering::AcqRel);
                        }
                        None => {
                            if consumed.load(Ordering::Acquire) >= total {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                taken
            })
        })
        .collect();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for counter in 0..ITEMS_PER_PRODUCER {
                    let mut value = tag(p, counter);
                    while let Err(returned) = queue.push(value) {
                        value = returned;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for handle in producers {
        handle.join().unwrap();
    }

    let streams: Vec<Vec<u64>> = consumers
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    // Exact conservation: every tagged value appears exactly once.
    let mut seen = HashSet::with_capacity(total);
    let mut count = 0usize;
    for stream in &streams {
        for &value in stream {
            count += 1;
            assert!(seen.insert(value), "duplicate value {value:#x}");
        }
    }
    assert_eq!(count, total);

    for p in 0..PRODUCERS {
        for counter in 0..ITEMS_PER_PRODUCER {
            assert!(seen.contains(&tag(p, counter)), "missing {p}/{counter}");
        }
    }

    // Per-producer FIFO: within each consumer's stream, any one producer's
    // counters are strictly increasing (each stream is a subsequence of the
    // global dequeue order).
    for stream in &streams {
        let mut last = [None::<u64>; PRODUCERS as usize];
        for &value in stream {
            let (p, counter) = untag(value);
            if let Some(prev) = last[p as usize] {
                assert!(
                    counter > prev,
                    "producer {p} reordered: {counter} after {prev}"
                );
            }
            last[p as usize] = Some(counter);
        }
    }

    // Nothing left behind.
    assert_eq!(queue.pop(), None);
    assert_eq!(queue.maybe_size(), 0);
}

#[test]
fn contended_small_queue_makes_progress() {
    init_test_tracing();

    // A deliberately tiny queue under heavy contention: forward progress and
    // conservation still hold, just with many full/empty retries.
    let total_per_producer = 10_000u64;
    let queue = Arc::new(MpmcQueue::<u64>::new(2));
    let consumed = Arc::new(AtomicUsize::new(0));
    let total = (2 * total_per_producer) as usize;

    let consumers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            let consumed = Arc::clone(&consumed);
            thread::spawn(move || {
                let mut sum = 0u64;
                loop {
                    match queue.pop() {
                        Some(value) => {
                            sum += value;
                            consumed.fetch_add(1, Ordering::AcqRel);
                        }
                        None => {
                            if consumed.load(Ordering::Acquire) >= total {
                                break;
                            }
                            thread::yield_now();
                        }
                    }
                }
                sum
            })
        })
        .collect();

    let producers: Vec<_> = (0..2)
        .map(|_| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for i in 0..total_per_producer {
                    let mut value = i;
                    while let Err(returned) = queue.push(value) {
                        value = returned;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    for handle in producers {
        handle.join().unwrap();
    }
    let sum: u64 = consumers
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .sum();

    // Each producer contributed 0 + 1 + ... + (n-1).
    let expected = 2 * (total_per_producer * (total_per_producer - 1) / 2);
    assert_eq!(sum, expected);
}
