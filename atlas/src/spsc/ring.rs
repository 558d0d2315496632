//! Core lock-free SPSC ring buffer algorithm.
//!
//! A wait-free bounded ring over a power-of-two slot array. Indices advance
//! modulo `N`, and one slot is always left empty so that full and empty are
//! distinguishable without a separate size counter: the effective capacity
//! is `N - 1`, `head == tail` means empty, and `(tail + 1) % N == head`
//! means full.
//!
//! # Ordering
//!
//! Only the producer writes `tail` and only the consumer writes `head`, so
//! each side reads its own index relaxed. Cross-thread synchronization is
//! carried entirely by the release-store of one index and the acquire-load
//! of it on the other side, which transitively publishes the slot write (or
//! the slot vacancy) that preceded the store.
//!
//! Each side additionally keeps a cached copy of the *opposite* index and
//! only reloads it when the ring appears full (producer) or empty
//! (consumer). This keeps the remote cache line out of the hot path.
//!
//! # Safety
//!
//! The types in this module have unsafe APIs because they require the caller
//! to uphold the SPSC invariant: exactly one producer and one consumer, with
//! no concurrent access to either role.

use std::cell::UnsafeCell;
use std::marker::PhantomData;
use std::mem::MaybeUninit;

#[cfg(not(loom))]
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{AtomicUsize, Ordering};

/// Role marker: Fields with this role are owned exclusively by the producer.
pub struct ProducerRole;

/// Role marker: Fields with this role are owned exclusively by the consumer.
pub struct ConsumerRole;

/// Role marker: Buffer slots whose ownership transfers via the SPSC protocol.
pub struct SlotRole;

/// Interior-mutable cell with a role marker for nominal type safety.
///
/// `SpscCell<T, Role>` wraps an `UnsafeCell<T>` with a phantom `Role`
/// parameter. The `Role` doesn't affect runtime behavior; it exists purely to
/// make different logical "kinds" of cells into distinct types at compile
/// time.
#[repr(transparent)]
pub struct SpscCell<T, Role>(UnsafeCell<T>, PhantomData<Role>);

impl<T, Role> SpscCell<T, Role> {
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value), PhantomData)
    }

    pub const fn get(&self) -> &UnsafeCell<T> {
        &self.0
    }
}

// SAFETY: SpscCell is Sync because the SPSC algorithm guarantees that each
// cell is accessed by exactly one role at a time: the index caches by their
// owning side only, and each buffer slot by whichever side the head/tail
// protocol currently assigns it to. The atomic indices with Release/Acquire
// ordering provide the synchronization barrier between writes and reads.
unsafe impl<T: Send, Role> Sync for SpscCell<T, Role> {}
unsafe impl<T: Send, Role> Send for SpscCell<T, Role> {}

/// Cache cell owned exclusively by the producer.
pub type ProducerCache<T> = SpscCell<T, ProducerRole>;

/// Cache cell owned exclusively by the consumer.
pub type ConsumerCache<T> = SpscCell<T, ConsumerRole>;

/// Buffer slot cell with ownership governed by the SPSC protocol.
pub type SlotCell<T> = SpscCell<T, SlotRole>;

/// Producer-side state: write index and cached copy of the read index.
#[repr(C)]
#[repr(align(64))]
pub struct ProducerState {
    /// Write index (next slot to write to), always in `[0, N)`.
    /// Owned by producer, read by consumer.
    pub tail: AtomicUsize,

    /// Cached copy of the consumer's head index. Refreshed only when the
    /// ring appears full.
    pub cached_head: ProducerCache<usize>,
}

impl ProducerState {
    pub fn new() -> Self {
        Self {
            tail: AtomicUsize::new(0),
            cached_head: ProducerCache::new(0),
        }
    }
}

impl Default for ProducerState {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer-side state: read index and cached copy of the write index.
#[repr(C)]
#[repr(align(64))]
pub struct ConsumerState {
    /// Read index (next slot to read from), always in `[0, N)`.
    /// Owned by consumer, read by producer.
    pub head: AtomicUsize,

    /// Cached copy of the producer's tail index. Refreshed only when the
    /// ring appears empty.
    pub cached_tail: ConsumerCache<usize>,
}

impl ConsumerState {
    pub fn new() -> Self {
        Self {
            head: AtomicUsize::new(0),
            cached_tail: ConsumerCache::new(0),
        }
    }
}

impl Default for ConsumerState {
    fn default() -> Self {
        Self::new()
    }
}

/// A single slot in the ring buffer.
#[repr(C)]
pub struct Slot<T> {
    pub value: SlotCell<MaybeUninit<T>>,
}

/// Core SPSC ring buffer structure.
///
/// `N` must be a power of two and at least 2; the effective capacity is
/// `N - 1`. Construction through [`crate::sync::spsc::channel`] enforces
/// this at compile time.
#[repr(C)]
pub struct Ring<T, const N: usize> {
    /// Producer state (tail index + cached head).
    pub producer: ProducerState,

    /// Consumer state (head index + cached tail).
    pub consumer: ConsumerState,

    /// Prevent false sharing between consumer state and buffer.
    pub _padding: [u8; 64],

    /// Ring buffer slots.
    pub buffer: [Slot<T>; N],
}

impl<T, const N: usize> Ring<T, N> {
    const MASK: usize = N - 1;

    /// Creates a new empty ring. Slots start uninitialized.
    pub(crate) fn new() -> Self {
        Self {
            producer: ProducerState::new(),
            consumer: ConsumerState::new(),
            _padding: [0u8; 64],
            // SAFETY: MaybeUninit doesn't require initialization
            buffer: unsafe { MaybeUninit::<[Slot<T>; N]>::uninit().assume_init() },
        }
    }

    /// Advances an index to the next slot, wrapping at capacity.
    #[inline]
    const fn next(index: usize) -> usize {
        (index + 1) & Self::MASK
    }

    /// Attempts to push an item onto the queue.
    ///
    /// # Safety
    ///
    /// Caller must ensure only one thread calls this method (single
    /// producer).
    #[inline]
    pub unsafe fn push(&self, item: T) -> Result<(), T> {
        // Load current tail (producer-local, relaxed is fine)
        let tail = self.producer.tail.load(Ordering::Relaxed);
        let next = Self::next(tail);

        // Load cached head (local cache, doesn't need atomic ordering)
        // SAFETY: Producer has exclusive access to cached_head
        let mut cached_head = unsafe { *self.producer.cached_head.get().get() };

        // Check if queue appears full using cached value
        if next == cached_head {
            // Refresh cache from actual head (acquire to sync with consumer)
            cached_head = self.consumer.head.load(Ordering::Acquire);
            // SAFETY: Producer has exclusive write access to its cached_head field
            unsafe {
                *self.producer.cached_head.get().get() = cached_head;
            }

            // Check again with fresh value
            if next == cached_head {
                return Err(item); // Queue is full
            }
        }

        // SAFETY: The producer owns the slot at `tail` because:
        // - tail hasn't been published yet (store happens after this write)
        // - The check above ensures next != head, so the consumer isn't
        //   reading this slot
        // - tail is in [0, N) per the index invariant, so the indexing is in
        //   bounds
        unsafe {
            (*self.buffer[tail].value.get().get()).write(item);
        }

        // Publish the new tail (release to sync with consumer)
        self.producer.tail.store(next, Ordering::Release);

        Ok(())
    }

    /// Attempts to pop an item from the queue.
    ///
    /// # Safety
    ///
    /// Caller must ensure only one thread calls this method (single
    /// consumer).
    #[inline]
    pub unsafe fn pop(&self) -> Option<T> {
        // Load current head (consumer-local, relaxed is fine)
        let head = self.consumer.head.load(Ordering::Relaxed);

        // Load cached tail (local cache, doesn't need atomic ordering)
        // SAFETY: Consumer has exclusive access to cached_tail
        let mut cached_tail = unsafe { *self.consumer.cached_tail.get().get() };

        // Check if queue appears empty using cached value
        if head == cached_tail {
            // Refresh cache from actual tail (acquire to sync with producer)
            cached_tail = self.producer.tail.load(Ordering::Acquire);
            // SAFETY: Consumer has exclusive write access to its cached_tail field
            unsafe {
                *self.consumer.cached_tail.get().get() = cached_tail;
            }

            // Check again with fresh value
            if head == cached_tail {
                return None; // Queue is empty
            }
        }

        // SAFETY: The consumer owns the slot at `head` because:
        // - The check above ensures head != tail, so there's data to read
        // - head hasn't been published yet (store happens after this read)
        // - The producer won't overwrite this slot until we publish the new
        //   head
        // - The slot was initialized by the producer
        let item = unsafe { (*self.buffer[head].value.get().get()).assume_init_read() };

        // Publish the new head (release to sync with producer)
        self.consumer.head.store(Self::next(head), Ordering::Release);

        Some(item)
    }

    /// Returns `true` if the queue is observed empty.
    ///
    /// Exact only when no concurrent operations are in flight.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.consumer.head.load(Ordering::Acquire) == self.producer.tail.load(Ordering::Acquire)
    }

    /// Effective capacity: one slot is sacrificed to distinguish full from
    /// empty.
    #[inline]
    pub const fn capacity() -> usize {
        N - 1
    }

    /// Approximate number of items in the queue.
    ///
    /// Exact under quiescence; stale but always in `[0, N - 1]` otherwise,
    /// since head and tail are sampled independently.
    #[inline]
    pub fn maybe_size(&self) -> usize {
        let head = self.consumer.head.load(Ordering::Relaxed);
        let tail = self.producer.tail.load(Ordering::Relaxed);
        (N + tail - head) & Self::MASK
    }
}

impl<T, const N: usize> Drop for Ring<T, N> {
    fn drop(&mut self) {
        if !std::mem::needs_drop::<T>() {
            return;
        }

        // &mut self guarantees quiescence: walk the occupied range and drop
        // each remaining payload in place.
        let mut head = self.consumer.head.load(Ordering::Relaxed);
        let tail = self.producer.tail.load(Ordering::Relaxed);
        while head != tail {
            // SAFETY: Slots in [head, tail) (mod N) are initialized.
            unsafe {
                (*self.buffer[head].value.get().get()).assume_init_drop();
            }
            head = Self::next(head);
        }
    }
}

// SAFETY: Ring is Send because all fields are Send (AtomicUsize, SpscCell).
unsafe impl<T: Send, const N: usize> Send for Ring<T, N> {}

// SAFETY: Ring is Sync because concurrent access is mediated by atomics:
// - head/tail are AtomicUsize with Release/Acquire ordering
// - Buffer slots are protected by the SPSC invariant (see SpscCell)
unsafe impl<T: Send, const N: usize> Sync for Ring<T, N> {}
