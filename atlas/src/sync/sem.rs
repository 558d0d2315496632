//! Counting semaphore for cross-thread wake/sleep.
//!
//! A thin blocking primitive with a non-negative permit count:
//! [`acquire`](Semaphore::acquire) sleeps while the count is zero, then
//! decrements; [`release`](Semaphore::release) adds permits and wakes
//! waiters. There is no fairness guarantee — waiters wake in whatever order
//! the OS chooses.
//!
//! The permit counter is a `usize`; the intended workloads (queue depth plus
//! worker count plus submission bursts) stay far below its range, so
//! overflow is not a practical concern.

use parking_lot::{Condvar, Mutex};

/// A counting semaphore.
///
/// # Example
///
/// ```
/// use atlas::sync::sem::Semaphore;
///
/// let sem = Semaphore::new(0);
/// sem.release(1);
/// sem.acquire(); // returns immediately, consuming the permit
/// ```
pub struct Semaphore {
    permits: Mutex<usize>,
    available: Condvar,
}

impl Semaphore {
    /// Creates a semaphore with `permits` initially available.
    #[must_use]
    pub fn new(permits: usize) -> Self {
        Self {
            permits: Mutex::new(permits),
            available: Condvar::new(),
        }
    }

    /// Blocks until at least one permit is available, then takes it.
    pub fn acquire(&self) {
        let mut permits = self.permits.lock();
        while *permits == 0 {
            self.available.wait(&mut permits);
        }
        *permits -= 1;
    }

    /// Takes a permit if one is available, without blocking.
    ///
    /// Returns `true` if a permit was taken.
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if *permits == 0 {
            return false;
        }
        *permits -= 1;
        true
    }

    /// Adds `n` permits and wakes up to `n` waiters.
    pub fn release(&self, n: usize) {
        if n == 0 {
            return;
        }
        let mut permits = self.permits.lock();
        *permits += n;
        drop(permits);

        if n == 1 {
            self.available.notify_one();
        } else {
            self.available.notify_all();
        }
    }

    /// Current permit count. Stale the moment it is returned; for
    /// diagnostics only.
    #[must_use]
    pub fn permits(&self) -> usize {
        *self.permits.lock()
    }
}
