//! Core type definitions for the thread runtime
//!
//! These types provide strong typing for the scheduler primitives.

/// Thread id: the slot index assigned at registration, 0-based
pub type OsTid = usize;

/// Entry point of a logical thread.
///
/// Takes the registration argument and is assumed to run forever; if it does
/// return, control unwinds through the context link back into
/// [`crate::os_start`].
pub type OsThreadFn = fn(i32);

/// Accumulated virtual (CPU) time, in the unit the reporting call states
pub type OsVirtTime = u64;

/// Kernel lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OsKernelState {
    /// Before [`crate::os_init`]
    Uninitialized = 0,
    /// Table allocated, threads may be registered
    Configured = 1,
    /// Scheduler owns the process; timers are armed
    Running = 2,
}

impl OsKernelState {
    /// True once the table exists, whether or not the scheduler has started.
    #[inline]
    pub fn is_initialized(self) -> bool {
        self != OsKernelState::Uninitialized
    }

    /// True while the scheduler owns the process.
    #[inline]
    pub fn is_running(self) -> bool {
        self == OsKernelState::Running
    }
}
