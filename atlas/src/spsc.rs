//! Core SPSC (Single-Producer Single-Consumer) queue primitives.
//!
//! This module contains the ring buffer algorithm behind
//! [`crate::sync::spsc`], the safe in-process channel built on top of it.

pub(crate) mod ring;
