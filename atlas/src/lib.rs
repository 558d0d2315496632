//! Lock-free in-memory queues and a bounded worker pool for low-latency task
//! dispatch on shared-memory multicore hardware.
//!
//! # Components
//!
//! - [`sync::spsc`] - Wait-free single-producer/single-consumer channel over a
//!   power-of-two ring.
//! - [`mpmc`] - Lock-free bounded multi-producer/multi-consumer queue using
//!   per-slot sequence counters.
//! - [`sync::sem`] - Counting semaphore used to sleep idle workers.
//! - [`pool`] - Bounded worker pool built on the MPMC queue and the semaphore,
//!   with a caller-runs full-queue policy.
//!
//! The lock-free queues never block and never allocate after construction.
//! The pool's only suspension points are a worker sleeping in
//! [`sync::sem::Semaphore::acquire`] and [`pool::Pool::shutdown`] joining its
//! workers. [`sync::blocking`] is the deliberate exception: a mutex/condvar
//! queue kept as a benchmark baseline.

pub mod mpmc;
pub mod pool;
pub(crate) mod spsc;
pub mod sync;

mod trace;

pub use trace::init_tracing;
