//! Core lock-free MPMC bounded queue algorithm.
//!
//! # Algorithm
//!
//! The queue belongs to Dmitry Vyukov's bounded MPMC family, with per-slot
//! sequence numbers coordinating producer and consumer visits to each slot:
//!
//! - Each slot has an atomic sequence number, initialized to its index
//! - A producer claims a ticket by CAS-advancing `tail` after observing
//!   `slot.seq == ticket`, writes the payload, then publishes by storing
//!   `seq = ticket + 1`
//! - A consumer claims a ticket by CAS-advancing `head` after observing
//!   `slot.seq == ticket + 1`, reads the payload, then releases the slot by
//!   storing `seq = ticket + N`
//!
//! Tickets advance only on a successful claim, so a failed [`push`] or
//! [`pop`] has no effect at all: full and empty are plain `Err`/`None`
//! outcomes that the caller may retry. Successful operations are
//! linearizable at the release-store to the slot sequence, and consumer
//! ticket `k` always receives the value of producer ticket `k` — FIFO by
//! ticket.
//!
//! Ticket counters are 64-bit and wrap only after ~5×10¹⁷ operations, which
//! is treated as never in practice.
//!
//! [`push`]: MpmcQueue::push
//! [`pop`]: MpmcQueue::pop

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};

// Compile-time: tickets must be 64-bit wide. 32-bit counters wrap within
// reach of a long-running process.
const _: () = assert!(
    size_of::<usize>() >= size_of::<u64>(),
    "ticket counters must be 64 bits wide"
);

/// A slot in the queue with a sequence number for synchronization.
///
/// Slots are deliberately not cache-line padded: the aligned head/tail
/// state structs below carry the false-sharing burden, and padding every
/// slot would inflate the queue for payloads like boxed closures.
#[repr(C)]
struct Slot<T> {
    /// Sequence number for synchronization.
    /// - Initial: slot index (0, 1, 2, ..., N-1)
    /// - After producer write: ticket + 1 (signals "data ready")
    /// - After consumer read: ticket + N (signals "slot free")
    seq: AtomicUsize,

    /// The actual data stored in this slot.
    value: UnsafeCell<MaybeUninit<T>>,
}

impl<T> Slot<T> {
    fn new(seq: usize) -> Self {
        Self {
            seq: AtomicUsize::new(seq),
            value: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }
}

// SAFETY: Slot is Sync because:
// - seq is AtomicUsize (inherently Sync)
// - value is protected by the sequence number protocol
unsafe impl<T: Send> Sync for Slot<T> {}
unsafe impl<T: Send> Send for Slot<T> {}

/// Producer-side state: tail ticket counter.
#[repr(C)]
#[repr(align(64))]
struct ProducerState {
    /// Next ticket to claim for writing.
    /// Producers atomically advance this via compare-exchange.
    tail: AtomicUsize,
}

/// Consumer-side state: head ticket counter.
#[repr(C)]
#[repr(align(64))]
struct ConsumerState {
    /// Next ticket to claim for reading.
    /// Consumers atomically advance this via compare-exchange.
    head: AtomicUsize,
}

/// Lock-free bounded MPMC queue.
///
/// The requested capacity is rounded up to the next power of two (minimum
/// 2). Any number of threads may call [`push`] and [`pop`] concurrently
/// through a shared reference.
///
/// # Example
///
/// ```
/// use atlas::mpmc::MpmcQueue;
///
/// let q = MpmcQueue::new(4);
///
/// for i in 0..4 {
///     assert!(q.push(i).is_ok());
/// }
/// assert!(q.push(99).is_err()); // full
///
/// assert_eq!(q.pop(), Some(0));
/// ```
///
/// [`push`]: MpmcQueue::push
/// [`pop`]: MpmcQueue::pop
pub struct MpmcQueue<T> {
    /// Producer ticket counter (own cache line).
    producer: ProducerState,

    /// Consumer ticket counter (own cache line).
    consumer: ConsumerState,

    /// Slot array; length is a power of two.
    slots: Box<[Slot<T>]>,

    /// `capacity - 1`, for cheap modulo.
    mask: usize,
}

impl<T> MpmcQueue<T> {
    /// Creates a queue with at least `capacity` slots.
    ///
    /// The capacity is rounded up to the next power of two, with a minimum
    /// of 2.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two().max(2);
        let slots: Box<[Slot<T>]> = (0..capacity).map(Slot::new).collect();

        Self {
            producer: ProducerState {
                tail: AtomicUsize::new(0),
            },
            consumer: ConsumerState {
                head: AtomicUsize::new(0),
            },
            slots,
            mask: capacity - 1,
        }
    }

    /// Number of slots in the queue.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Attempts to push an item onto the queue.
    ///
    /// This operation is lock-free; any number of producers may call it
    /// concurrently.
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    pub fn push(&self, item: T) -> Result<(), T> {
        loop {
            let ticket = self.producer.tail.load(Ordering::Relaxed);
            let slot = &self.slots[ticket & self.mask];

            let seq = slot.seq.load(Ordering::Acquire);

            // Signed distance between the slot's sequence and our ticket;
            // wrapping subtraction keeps this correct across counter wrap.
            let diff = seq.wrapping_sub(ticket) as isize;

            if diff == 0 {
                // Slot is free for this ticket. Try to claim it.
                if self
                    .producer
                    .tail
                    .compare_exchange_weak(
                        ticket,
                        ticket.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // SAFETY: We have exclusive write access because:
                    // - The CAS succeeded, so no other producer holds this
                    //   ticket
                    // - seq == ticket means the consumer has released the
                    //   slot
                    unsafe {
                        (*slot.value.get()).write(item);
                    }
                    // Publish the write
                    slot.seq.store(ticket.wrapping_add(1), Ordering::Release);
                    return Ok(());
                }
                // CAS failed: another producer claimed the ticket, retry.
            } else if diff < 0 {
                // seq < ticket: the slot still holds an unconsumed item
                // from a lap ago. The queue is full.
                return Err(item);
            }
            // diff > 0: another producer already moved tail past this
            // ticket. Retry with a fresh ticket.
        }
    }

    /// Attempts to pop an item from the queue.
    ///
    /// This operation is lock-free; any number of consumers may call it
    /// concurrently. Returns `None` if the queue is empty.
    pub fn pop(&self) -> Option<T> {
        loop {
            let ticket = self.consumer.head.load(Ordering::Relaxed);
            let slot = &self.slots[ticket & self.mask];

            let seq = slot.seq.load(Ordering::Acquire);

            // A slot is readable for this ticket once the producer stored
            // seq = ticket + 1.
            let diff = seq.wrapping_sub(ticket.wrapping_add(1)) as isize;

            if diff == 0 {
                // Slot is readable for this ticket. Try to claim it.
                if self
                    .consumer
                    .head
                    .compare_exchange_weak(
                        ticket,
                        ticket.wrapping_add(1),
                        Ordering::AcqRel,
                        Ordering::Relaxed,
                    )
                    .is_ok()
                {
                    // SAFETY: The CAS succeeded, so no other consumer holds
                    // this ticket, and the sequence check confirmed the
                    // producer finished writing.
                    let item = unsafe { (*slot.value.get()).assume_init_read() };

                    // Release the slot for the producer a lap ahead.
                    slot.seq
                        .store(ticket.wrapping_add(self.capacity()), Ordering::Release);
                    return Some(item);
                }
                // CAS failed: another consumer claimed the ticket, retry.
            } else if diff < 0 {
                // seq == ticket: not published yet. The queue is empty.
                return None;
            }
            // diff > 0: another consumer already moved head past this
            // ticket. Retry with a fresh ticket.
        }
    }

    /// Approximate number of items in the queue.
    ///
    /// Sampling the two ticket counters is not atomic, so the result can be
    /// off by roughly the number of concurrently active producers and
    /// consumers, in either direction. Exact under quiescence. Suitable for
    /// monitoring, never for control flow.
    pub fn maybe_size(&self) -> usize {
        // Sample head on both sides of tail to reduce tearing.
        loop {
            let h1 = self.consumer.head.load(Ordering::Relaxed);
            let t = self.producer.tail.load(Ordering::Relaxed);
            let h2 = self.consumer.head.load(Ordering::Relaxed);
            if h1 == h2 {
                return t.wrapping_sub(h1);
            }
            // A consumer advanced head while we sampled; try again.
        }
    }

    /// Racy emptiness check.
    ///
    /// Might return `true` while a producer is publishing, or `false` just
    /// before another consumer claims the last item. A hint only.
    pub fn empty_hint(&self) -> bool {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let seq = self.slots[head & self.mask].seq.load(Ordering::Acquire);
        seq != head.wrapping_add(1)
    }
}

impl<T> Drop for MpmcQueue<T> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }

        // &mut self guarantees quiescence. Walk the claimed ticket range and
        // drop every payload that was published but never consumed.
        let mut ticket = self.consumer.head.load(Ordering::Relaxed);
        let tail = self.producer.tail.load(Ordering::Relaxed);
        while (tail.wrapping_sub(ticket) as isize) > 0 {
            let slot = &self.slots[ticket & self.mask];
            if slot.seq.load(Ordering::Relaxed) == ticket.wrapping_add(1) {
                // SAFETY: seq == ticket + 1 means the slot holds a live
                // payload for this ticket.
                unsafe {
                    (*slot.value.get()).assume_init_drop();
                }
            }
            ticket = ticket.wrapping_add(1);
        }
    }
}

// SAFETY: MpmcQueue is Send because all fields are Send.
unsafe impl<T: Send> Send for MpmcQueue<T> {}

// SAFETY: MpmcQueue is Sync because concurrent access is mediated by
// atomics: producers and consumers synchronize via CAS on their ticket
// counters, and per-slot sequence numbers order each slot's writes and
// reads.
unsafe impl<T: Send> Sync for MpmcQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(MpmcQueue::<u64>::new(0).capacity(), 2);
        assert_eq!(MpmcQueue::<u64>::new(1).capacity(), 2);
        assert_eq!(MpmcQueue::<u64>::new(4).capacity(), 4);
        assert_eq!(MpmcQueue::<u64>::new(5).capacity(), 8);
        assert_eq!(MpmcQueue::<u64>::new(100).capacity(), 128);
    }

    #[test]
    fn test_single_thread_fifo() {
        let q: MpmcQueue<u64> = MpmcQueue::new(4);

        // Enqueue 0..6: the first four succeed, the rest see a full queue.
        for i in 0..6u64 {
            if i < 4 {
                assert!(q.push(i).is_ok(), "push {i} should succeed");
            } else {
                assert_eq!(q.push(i), Err(i), "push {i} should fail");
            }
        }

        // Drain in FIFO order.
        for i in 0..4u64 {
            assert_eq!(q.pop(), Some(i));
        }
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_queue_full_recovers() {
        let q: MpmcQueue<u64> = MpmcQueue::new(4);

        for i in 0..4 {
            assert!(q.push(i).is_ok());
        }
        assert_eq!(q.push(5), Err(5));

        // Pop one, should be able to push again
        assert_eq!(q.pop(), Some(0));
        assert!(q.push(5).is_ok());
        assert_eq!(q.push(6), Err(6)); // Full again
    }

    #[test]
    fn test_wraparound() {
        let q: MpmcQueue<u64> = MpmcQueue::new(4);

        for round in 0..10 {
            for i in 0..4 {
                assert!(q.push(round * 10 + i).is_ok());
            }
            for i in 0..4 {
                assert_eq!(q.pop(), Some(round * 10 + i));
            }
            assert_eq!(q.pop(), None);
        }
    }

    #[test]
    fn test_maybe_size() {
        let q: MpmcQueue<u64> = MpmcQueue::new(8);
        assert_eq!(q.maybe_size(), 0);
        assert!(q.empty_hint());

        q.push(1).unwrap();
        q.push(2).unwrap();
        assert_eq!(q.maybe_size(), 2);
        assert!(!q.empty_hint());

        q.pop().unwrap();
        assert_eq!(q.maybe_size(), 1);

        q.pop().unwrap();
        assert_eq!(q.maybe_size(), 0);
        assert!(q.empty_hint());
    }

    #[test]
    fn test_non_copy_type() {
        let q: MpmcQueue<String> = MpmcQueue::new(4);

        q.push("hello".to_string()).unwrap();
        q.push("world".to_string()).unwrap();

        assert_eq!(q.pop(), Some("hello".to_string()));
        assert_eq!(q.pop(), Some("world".to_string()));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn test_drop_remaining_items() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        #[derive(Debug)]
        struct DropTracker(Arc<AtomicUsize>);
        impl Drop for DropTracker {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::Relaxed);
            }
        }

        let drops = Arc::new(AtomicUsize::new(0));

        {
            let q: MpmcQueue<DropTracker> = MpmcQueue::new(4);
            q.push(DropTracker(Arc::clone(&drops))).unwrap();
            q.push(DropTracker(Arc::clone(&drops))).unwrap();
            q.push(DropTracker(Arc::clone(&drops))).unwrap();

            // Consume one; its tracker drops immediately.
            drop(q.pop());
            assert_eq!(drops.load(Ordering::Relaxed), 1);
            // Two remain in the queue when it drops.
        }

        assert_eq!(drops.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn test_concurrent_producers() {
        let q: Arc<MpmcQueue<u64>> = Arc::new(MpmcQueue::new(64));
        let num_producers = 4;
        let items_per_producer = 1000;

        let mut handles = vec![];
        for p in 0..num_producers {
            let q = Arc::clone(&q);
            handles.push(thread::spawn(move || {
                for i in 0..items_per_producer {
                    let value = (p * 1_000_000 + i) as u64;
                    loop {
                        if q.push(value).is_ok() {
                            break;
                        }
                        thread::yield_now();
                    }
                }
            }));
        }

        // Drain on this thread while producers run.
        let mut items = vec![];
        while items.len() < num_producers * items_per_producer {
            match q.pop() {
                Some(item) => items.push(item),
                None => thread::yield_now(),
            }
        }

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(items.len(), num_producers * items_per_producer);

        // Per-producer FIFO: each producer's values appear in its own
        // submission order.
        for p in 0..num_producers {
            let base = (p * 1_000_000) as u64;
            let seen: Vec<u64> = items
                .iter()
                .copied()
                .filter(|v| (base..base + items_per_producer as u64).contains(v))
                .collect();
            assert_eq!(seen.len(), items_per_producer);
            for (i, v) in seen.iter().enumerate() {
                assert_eq!(*v, base + i as u64, "producer {p} reordered");
            }
        }
    }

    #[test]
    fn test_concurrent_consumers() {
        let q: Arc<MpmcQueue<u64>> = Arc::new(MpmcQueue::new(32));
        let total = 4000u64;

        let mut consumers = vec![];
        for _ in 0..4 {
            let q = Arc::clone(&q);
            consumers.push(thread::spawn(move || {
                let mut taken = vec![];
                loop {
                    match q.pop() {
                        // The producer signals completion with u64::MAX.
                        Some(u64::MAX) => break,
                        Some(v) => taken.push(v),
                        None => thread::yield_now(),
                    }
                }
                taken
            }));
        }

        for i in 0..total {
            while q.push(i).is_err() {
                thread::yield_now();
            }
        }
        for _ in 0..consumers.len() {
            while q.push(u64::MAX).is_err() {
                thread::yield_now();
            }
        }

        let mut all: Vec<u64> = consumers
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();

        // Conservation: every value exactly once.
        assert_eq!(all.len(), total as usize);
        for (i, v) in all.iter().enumerate() {
            assert_eq!(*v, i as u64);
        }
    }
}
