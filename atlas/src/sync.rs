//! Synchronization primitives for in-process communication.
//!
//! This module provides thread-safe queues and other primitives for
//! communication between threads within the same process.

pub mod blocking;
pub mod sem;
pub mod spsc;
