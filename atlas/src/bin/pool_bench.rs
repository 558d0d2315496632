//! Worker pool throughput benchmark.
//!
//! Submits a batch of tasks from a single thread to the bounded lock-free
//! pool and to a mutex/condvar baseline pool, and reports tasks/ms for each.
//! Two workloads per pool: no-op tasks (pure dispatch overhead) and tasks
//! that busy-wait for ~500 ns (a small but non-trivial unit of work).
//!
//! Usage:
//!     cargo run --release --bin pool_bench

use std::hint;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use minstant::Instant;

use atlas::pool::Pool;
use atlas::sync::blocking::BlockingQueue;

const WORKERS: usize = 16;
const QUEUE_CAPACITY: usize = 256;
const TASKS: usize = 1 << 20;

/// Tiny busy-work for each task.
fn busy_work(ns: u64) {
    if ns == 0 {
        return;
    }
    let start = Instant::now();
    let budget = Duration::from_nanos(ns);
    while start.elapsed() < budget {
        hint::spin_loop();
    }
}

/// Minimal mutex/condvar pool used purely as a baseline.
struct MutexPool {
    queue: Arc<BlockingQueue<Box<dyn FnOnce() + Send + 'static>>>,
    workers: Vec<JoinHandle<()>>,
}

impl MutexPool {
    fn new(workers: usize) -> Self {
        let queue: Arc<BlockingQueue<Box<dyn FnOnce() + Send + 'static>>> =
            Arc::new(BlockingQueue::new());
        let workers = (0..workers)
            .map(|i| {
                let queue = Arc::clone(&queue);
                thread::Builder::new()
                    .name(format!("baseline-worker-{i}"))
                    .spawn(move || {
                        while let Some(job) = queue.wait_and_pop() {
                            job();
                        }
                    })
                    .expect("failed to spawn baseline worker")
            })
            .collect();
        Self { queue, workers }
    }

    fn submit<F: FnOnce() + Send + 'static>(&self, f: F) {
        self.queue.push(Box::new(f));
    }

    fn shutdown(mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn wait_for_zero(remaining: &AtomicUsize) {
    while remaining.load(Ordering::Acquire) > 0 {
        hint::spin_loop();
    }
}

fn bench_bounded_pool(work_ns: u64) {
    let mut pool = Pool::new(WORKERS, QUEUE_CAPACITY).expect("failed to start pool");
    let remaining = Arc::new(AtomicUsize::new(TASKS));

    let start = Instant::now();
    for _ in 0..TASKS {
        let remaining = Arc::clone(&remaining);
        pool.submit(move || {
            busy_work(work_ns);
            remaining.fetch_sub(1, Ordering::AcqRel);
        });
    }
    wait_for_zero(&remaining);
    let elapsed = start.elapsed();

    pool.shutdown();

    let tasks_per_ms = TASKS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("bounded pool, work={work_ns}ns: {tasks_per_ms} tasks/ms");
}

fn bench_mutex_pool(work_ns: u64) {
    let pool = MutexPool::new(WORKERS);
    let remaining = Arc::new(AtomicUsize::new(TASKS));

    let start = Instant::now();
    for _ in 0..TASKS {
        let remaining = Arc::clone(&remaining);
        pool.submit(move || {
            busy_work(work_ns);
            remaining.fetch_sub(1, Ordering::AcqRel);
        });
    }
    wait_for_zero(&remaining);
    let elapsed = start.elapsed();

    pool.shutdown();

    let tasks_per_ms = TASKS as u128 * 1_000_000 / elapsed.as_nanos();
    println!("mutex pool,   work={work_ns}ns: {tasks_per_ms} tasks/ms");
}

fn main() {
    println!(
        "atlas pool bench (workers={}, capacity={}, tasks={}):",
        WORKERS, QUEUE_CAPACITY, TASKS
    );
    for work_ns in [0, 500] {
        bench_bounded_pool(work_ns);
        bench_mutex_pool(work_ns);
    }
}
