//! Bounded worker pool over the lock-free MPMC queue.
//!
//! # Architecture
//!
//! The pool owns one [`MpmcQueue`] of type-erased tasks, one counting
//! [`Semaphore`], and a fixed set of worker threads:
//!
//! - [`Pool::submit`] enqueues the task and releases one permit; a sleeping
//!   worker wakes, dequeues, runs the task, and goes back to
//!   [`Semaphore::acquire`].
//! - If the queue is full, the configured [`FullQueuePolicy`] applies. The
//!   default, caller-runs, executes the task synchronously on the
//!   submitting thread: natural backpressure without blocking.
//! - [`Pool::shutdown`] flips the shutdown flag once, releases one sentinel
//!   permit per worker so every worker observes the flag, and joins them
//!   all. Tasks still queued at that point are discarded without execution.
//!
//! # Ordering
//!
//! Tasks submitted from a single thread that all take the fast path are
//! dequeued in submission order (the queue is FIFO by ticket). Execution
//! order across workers is unspecified — several workers run concurrently.
//!
//! # Panics in tasks
//!
//! A panicking task is caught and logged; it never terminates the worker or
//! poisons the pool.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::mpmc::MpmcQueue;
use crate::sync::sem::Semaphore;
use crate::trace::{debug, info, warn};

/// Type-erased unit of work: a callable with a single invoke capability.
type Task = Box<dyn FnOnce() + Send + 'static>;

/// Policy applied when [`Pool::submit`] finds the task queue full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FullQueuePolicy {
    /// Execute the task synchronously on the submitting thread.
    ///
    /// Provides backpressure and liveness without blocking, at the price of
    /// stealing the caller's time.
    #[default]
    CallerRuns,

    /// Yield and retry the enqueue until space frees up.
    ///
    /// Keeps the caller's stack shallow but can spin for as long as every
    /// worker is busy.
    SpinYield,
}

/// Configuration for the worker pool.
pub struct PoolConfig {
    /// Number of worker threads. Must be at least 1.
    pub workers: usize,
    /// Task queue capacity; rounded up to the next power of two (minimum 2).
    pub queue_capacity: usize,
    /// What `submit` does when the queue is full.
    pub full_queue_policy: FullQueuePolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: thread::available_parallelism().map_or(1, usize::from),
            queue_capacity: 256,
            full_queue_policy: FullQueuePolicy::CallerRuns,
        }
    }
}

/// Error constructing the pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Failed to spawn a worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

/// State shared between the pool handle and its workers.
struct Shared {
    /// Task queue.
    queue: MpmcQueue<Task>,
    /// One permit per published task, plus one sentinel per worker at
    /// shutdown.
    work_available: Semaphore,
    /// Set exactly once, by the first successful `shutdown`.
    stop: AtomicBool,
}

/// Handle to a running worker pool.
///
/// Dropping the handle shuts the pool down and joins every worker; prefer
/// calling [`Pool::shutdown`] explicitly at a point where blocking is
/// acceptable.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// use atlas::pool::Pool;
///
/// let mut pool = Pool::new(4, 64).unwrap();
/// let counter = Arc::new(AtomicUsize::new(0));
///
/// for _ in 0..100 {
///     let counter = Arc::clone(&counter);
///     pool.submit(move || {
///         counter.fetch_add(1, Ordering::Relaxed);
///     });
/// }
///
/// pool.shutdown();
/// ```
pub struct Pool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    policy: FullQueuePolicy,
}

impl Pool {
    /// Creates a pool with `workers` threads and a task queue of at least
    /// `queue_capacity` slots, using the default caller-runs policy.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be spawned.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero.
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self, PoolError> {
        Self::with_config(PoolConfig {
            workers,
            queue_capacity,
            full_queue_policy: FullQueuePolicy::default(),
        })
    }

    /// Creates a pool from an explicit [`PoolConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Spawn`] if a worker thread cannot be spawned;
    /// workers spawned before the failure are woken and joined.
    ///
    /// # Panics
    ///
    /// Panics if `config.workers` is zero.
    pub fn with_config(config: PoolConfig) -> Result<Self, PoolError> {
        assert!(config.workers >= 1, "pool requires at least one worker");

        info!(
            workers = config.workers,
            queue_capacity = config.queue_capacity,
            policy = ?config.full_queue_policy,
            "pool starting"
        );

        let shared = Arc::new(Shared {
            queue: MpmcQueue::new(config.queue_capacity),
            work_available: Semaphore::new(0),
            stop: AtomicBool::new(false),
        });

        let mut workers = Vec::with_capacity(config.workers);
        for i in 0..config.workers {
            let shared_worker = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("atlas-worker-{i}"))
                .spawn(move || {
                    debug!("worker started");
                    worker_loop(&shared_worker);
                    debug!("worker exiting");
                });

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    // Unwind: wake and join the workers spawned so far.
                    shared.stop.store(true, Ordering::Release);
                    shared.work_available.release(workers.len());
                    for handle in workers.drain(..) {
                        let _ = handle.join();
                    }
                    return Err(PoolError::Spawn(e));
                }
            }
        }

        Ok(Self {
            shared,
            workers,
            policy: config.full_queue_policy,
        })
    }

    /// Submits a task for execution.
    ///
    /// Fast path: the task is enqueued and a sleeping worker is woken.
    /// If the queue is full, the configured [`FullQueuePolicy`] applies;
    /// under the default caller-runs policy the task runs synchronously on
    /// the current thread before `submit` returns.
    ///
    /// Always returns `true`: a task is never rejected, only (possibly)
    /// executed by the caller.
    ///
    /// # Warning
    ///
    /// Under caller-runs, a task that itself submits to the same full pool
    /// executes recursively on the submitting thread, and the stack grows
    /// without bound if the queue stays full. Use [`FullQueuePolicy::SpinYield`]
    /// if tasks re-submit.
    pub fn submit<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let task: Task = Box::new(f);

        match self.shared.queue.push(task) {
            Ok(()) => {
                // Signal "work available"
                self.shared.work_available.release(1);
                true
            }
            Err(task) => self.run_full_queue_policy(task),
        }
    }

    fn run_full_queue_policy(&self, mut task: Task) -> bool {
        match self.policy {
            FullQueuePolicy::CallerRuns => {
                task();
                true
            }
            FullQueuePolicy::SpinYield => loop {
                thread::yield_now();
                match self.shared.queue.push(task) {
                    Ok(()) => {
                        self.shared.work_available.release(1);
                        return true;
                    }
                    Err(returned) => task = returned,
                }
            },
        }
    }

    /// Initiates shutdown and waits for all workers to exit.
    ///
    /// At most once: only the first call does anything, later calls (and the
    /// destructor) are no-ops. Tasks already being executed run to
    /// completion; tasks still in the queue are discarded without execution.
    pub fn shutdown(&mut self) {
        if self
            .shared
            .stop
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return; // Already stopped
        }

        info!("pool shutdown initiated");

        // Wake every worker so it can observe the flag and exit.
        self.shared.work_available.release(self.workers.len());

        for handle in self.workers.drain(..) {
            debug!("waiting for worker to exit");
            let _ = handle.join();
        }

        info!("pool shutdown complete");
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        // Sleep until a task has been published or shutdown released a
        // sentinel permit.
        shared.work_available.acquire();

        if shared.stop.load(Ordering::Acquire) {
            break;
        }

        // One permit corresponds to one published task, but another worker
        // may still be racing for it; retry until this worker holds a task
        // or shutdown begins.
        let task = loop {
            match shared.queue.pop() {
                Some(task) => break task,
                None => {
                    if shared.stop.load(Ordering::Relaxed) {
                        return;
                    }
                    thread::yield_now();
                }
            }
        };

        run_task(task);
    }
}

fn run_task(task: Task) {
    // A panicking task must not take the worker down or poison the pool.
    if panic::catch_unwind(AssertUnwindSafe(task)).is_err() {
        warn!("task panicked; worker continues");
    }
}
