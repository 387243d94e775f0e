//! Port layer - OS-specific implementations
//!
//! This module isolates every privileged operation the scheduler needs from
//! the host: signal handler installation, interval timers, signal masking and
//! ucontext-based context switching. All other modules go through this
//! boundary and never name a syscall directly.

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub mod unix;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub use unix::*;

// Stub implementations for other targets (keeps docs builds and tests of the
// pure surfaces working; every operation that would need the real platform
// reports a system error instead)
#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub mod stub {
    use crate::error::{OsError, OsResult};

    /// Saved execution context placeholder
    pub struct PortContext;

    /// Saved signal mask placeholder
    pub type SavedMask = ();

    pub fn context_new() -> PortContext {
        PortContext
    }

    pub fn install_handler() -> OsResult<()> {
        crate::error!("scheduler signals are not supported on this platform");
        Err(OsError::Sys)
    }

    pub fn arm_acct_timer() -> OsResult<()> {
        Err(OsError::Sys)
    }

    pub fn arm_preempt_timer() {
        // No-op for foreign targets
    }

    pub fn disarm_timers() {
        // No-op for foreign targets
    }

    pub fn acct_timer_elapsed_restart() -> Result<u64, ()> {
        Err(())
    }

    pub fn raise_sched_signal() -> OsResult<()> {
        Err(OsError::Sys)
    }

    pub fn block_sched_signals() -> SavedMask {}

    pub fn restore_signal_mask(_saved: &SavedMask) {}

    pub unsafe fn context_capture(
        _ctx: *mut PortContext,
        _stack: *mut u8,
        _stack_len: usize,
        _link: *mut PortContext,
    ) -> OsResult<()> {
        Err(OsError::Sys)
    }

    pub unsafe fn context_install_entry(_ctx: *mut PortContext, _slot: usize) {}

    pub unsafe fn context_switch(
        _save: *mut PortContext,
        _load: *mut PortContext,
    ) -> Result<(), ()> {
        Err(())
    }

    pub(crate) fn fatal(msg: &str) -> ! {
        panic!("{}", msg);
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
pub use stub::*;
