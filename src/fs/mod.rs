//! Filesystem utilities for cs3lease.

pub mod atomic;

pub use atomic::atomic_write;
