//! Lock-free SPSC queue for in-process (inter-thread) communication.
//!
//! A wait-free bounded queue using a heap-allocated ring buffer with atomic
//! indices.
//!
//! # Overview
//!
//! - [`Producer`] - Write end (single producer per queue)
//! - [`Consumer`] - Read end (single consumer per queue)
//! - Lock-free, wait-free: no mutexes or syscalls, ever
//!
//! The ring holds `N` slots of which one is always left empty, so the
//! effective capacity is `N - 1`. `N` must be a power of two of at least 2,
//! checked at compile time.
//!
//! # Example
//!
//! ```
//! use atlas::sync::spsc;
//!
//! let (producer, consumer) = spsc::channel::<u64, 1024>();
//!
//! // Producer thread
//! producer.push(42).expect("Queue full");
//!
//! // Consumer thread
//! assert_eq!(consumer.pop(), Some(42));
//! ```

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::spsc::ring::Ring;

/// Marker type to opt-out of `Sync` while remaining `Send`.
type PhantomUnsync = PhantomData<Cell<&'static ()>>;

/// Write end of the SPSC queue.
///
/// Only one producer exists per queue; the constructor hands out exactly
/// one.
///
/// # Thread Safety
///
/// `Producer` is [`Send`] but **not** [`Sync`]:
/// - Can transfer ownership to another thread
/// - Cannot share `&Producer` (no concurrent `push()`)
pub struct Producer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    _unsync: PhantomUnsync,
}

/// Read end of the SPSC queue.
///
/// Only one consumer exists per queue; the constructor hands out exactly
/// one. See [`Producer`] for thread safety details (same semantics apply).
pub struct Consumer<T: Send, const N: usize> {
    ring: Arc<Ring<T, N>>,
    _unsync: PhantomUnsync,
}

struct CapacityCheck<const N: usize>;

impl<const N: usize> CapacityCheck<N> {
    /// Compile-time assertion on the ring capacity.
    const OK: () = {
        assert!(N >= 2, "Queue capacity must be at least 2");
        assert!(
            N & (N - 1) == 0,
            "Queue capacity must be a power of two"
        );
    };
}

/// Creates a new SPSC channel with `N` slots (effective capacity `N - 1`).
///
/// Returns a `(Producer, Consumer)` pair. The producer and consumer can be
/// sent to different threads.
///
/// Fails to compile if `N` is not a power of two or is below 2.
///
/// # Example
///
/// ```
/// use atlas::sync::spsc;
///
/// let (tx, rx) = spsc::channel::<String, 16>();
///
/// tx.push("hello".to_string()).unwrap();
/// assert_eq!(rx.pop(), Some("hello".to_string()));
/// ```
#[must_use]
pub fn channel<T: Send, const N: usize>() -> (Producer<T, N>, Consumer<T, N>) {
    let () = CapacityCheck::<N>::OK;

    let ring = Arc::new(Ring::new());

    let producer = Producer {
        ring: Arc::clone(&ring),
        _unsync: PhantomData,
    };

    let consumer = Consumer {
        ring,
        _unsync: PhantomData,
    };

    (producer, consumer)
}

impl<T: Send, const N: usize> Producer<T, N> {
    /// Attempts to push an item onto the queue (wait-free).
    ///
    /// # Errors
    ///
    /// Returns `Err(item)` if the queue is full, allowing retry.
    #[inline]
    pub fn push(&self, item: T) -> Result<(), T> {
        // SAFETY: Producer is !Sync and handed out once, so this thread has
        // exclusive access to the producer side of the ring.
        unsafe { self.ring.push(item) }
    }

    /// Returns `true` if the queue is observed empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Effective capacity of the queue (`N - 1`).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        Ring::<T, N>::capacity()
    }

    /// Approximate queue length; exact only under quiescence.
    #[inline]
    #[must_use]
    pub fn maybe_size(&self) -> usize {
        self.ring.maybe_size()
    }
}

impl<T: Send, const N: usize> Consumer<T, N> {
    /// Attempts to pop an item from the queue (wait-free).
    ///
    /// Returns `None` if the queue is empty.
    #[inline]
    #[must_use]
    pub fn pop(&self) -> Option<T> {
        // SAFETY: Consumer is !Sync and handed out once, so this thread has
        // exclusive access to the consumer side of the ring.
        unsafe { self.ring.pop() }
    }

    /// Returns `true` if the queue is observed empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Effective capacity of the queue (`N - 1`).
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        Ring::<T, N>::capacity()
    }

    /// Approximate queue length; exact only under quiescence.
    #[inline]
    #[must_use]
    pub fn maybe_size(&self) -> usize {
        self.ring.maybe_size()
    }
}
