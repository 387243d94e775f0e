//! Preemptive user-level threads on Unix signals
//!
//! A minimal green-thread scheduler providing:
//! - Signal-driven round-robin preemption
//! - Per-thread virtual CPU-time accounting
//! - A busy-wait binary semaphore
//! - Context switching over the ucontext API
//!
//! The kernel owns the whole process once [`os_start`] runs: exactly one
//! logical thread executes at a time, and every switch happens inside the
//! signal handler. The API is not for use from multiple OS threads.

#![deny(unsafe_op_in_unsafe_fn)]

// ============ Modules ============

pub mod log;

pub mod core;
pub mod sync;
pub mod port;

// ============ Re-exports ============

pub use crate::core::config;
pub use crate::core::config::*;
pub use crate::core::critical;
pub use crate::core::error;
pub use crate::core::error::{OsError, OsResult, SYS_ERR, TAB_FULL};
pub use crate::core::kernel;
pub use crate::core::kernel::{os_init, os_kernel_state, os_start, os_thread_current};
pub use crate::core::thread;
pub use crate::core::thread::os_thread_create;
pub use crate::core::time;
pub use crate::core::time::os_thread_vtime_ms;
pub use crate::core::types;
pub use crate::core::types::*;

#[cfg(feature = "sem")]
pub use crate::sync::sem;
#[cfg(feature = "sem")]
pub use crate::sync::sem::OsBinSem;
