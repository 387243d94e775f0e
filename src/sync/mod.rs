//! Synchronization primitives
//!
//! Contains the busy-wait binary semaphore.

#[cfg(feature = "sem")]
pub mod sem;
