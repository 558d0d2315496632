//! Bounded MPMC (Multi-Producer Multi-Consumer) queue.
//!
//! This module contains a lock-free bounded queue using per-slot sequence
//! numbers. Any number of threads may push and pop concurrently.
//!
//! Used by:
//! - [`crate::pool`] - Task queue feeding the bounded worker pool

mod queue;

pub use queue::MpmcQueue;
