//! Compile-time configuration for the thread runtime
//!
//! These constants control the resource limits and timer periods of the
//! scheduler.

/// Minimum accepted thread-table capacity
pub const CFG_TAB_SIZE_MIN: usize = 2;

/// Maximum accepted thread-table capacity
pub const CFG_TAB_SIZE_MAX: usize = 64;

/// Stack size of each logical thread, in bytes
pub const CFG_STACK_SIZE: usize = 64 * 1024;

/// Period of the preemption timer, in whole seconds
pub const CFG_PREEMPT_INTERVAL_SEC: u32 = 1;

/// Period of the CPU-accounting timer, in microseconds
pub const CFG_ACCT_TICK_USEC: u64 = 10_000;

/// Clamp a requested table capacity into the accepted range.
///
/// Requests outside `[CFG_TAB_SIZE_MIN, CFG_TAB_SIZE_MAX]` fall back to the
/// maximum, matching the table-creation contract of [`crate::os_init`].
pub const fn clamp_tab_size(requested: usize) -> usize {
    if requested < CFG_TAB_SIZE_MIN || requested > CFG_TAB_SIZE_MAX {
        CFG_TAB_SIZE_MAX
    } else {
        requested
    }
}
