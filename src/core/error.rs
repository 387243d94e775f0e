//! Error types for the thread runtime
//!
//! Uses Rust's Result pattern instead of C-style error codes; the classic
//! numeric codes remain available through [`OsError::code`] for callers that
//! want the flat `-1`/`-2` contract.

use thiserror::Error;

/// Runtime error type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[repr(u16)]
pub enum OsError {
    // ============ System errors ============
    /// An underlying OS operation (signal, timer, allocation, context
    /// capture) failed
    #[error("system-level operation failed")]
    Sys = 10001,

    // ============ Table errors ============
    /// Thread table is full
    #[error("thread table is full")]
    TableFull = 20001,
    /// Thread id does not name a registered thread
    #[error("invalid thread id")]
    TidInvalid = 20002,

    // ============ Kernel state errors ============
    /// Scheduler not initialized
    #[error("scheduler is not initialized")]
    NotInit = 30001,
    /// Scheduler is already running
    #[error("scheduler is already running")]
    Running = 30002,
    /// No threads registered before start
    #[error("no threads registered")]
    NoThreads = 30003,
}

/// Result type alias for runtime operations
pub type OsResult<T> = Result<T, OsError>;

/// C-style code for system-level failures
pub const SYS_ERR: i32 = -1;

/// C-style code for a full thread table
pub const TAB_FULL: i32 = -2;

impl OsError {
    /// Collapse the error onto the two classic negative codes.
    ///
    /// Every error maps to [`SYS_ERR`] except [`OsError::TableFull`], which
    /// keeps its own distinguished value. Both are disjoint from valid
    /// (non-negative) thread ids.
    #[inline]
    pub const fn code(self) -> i32 {
        match self {
            OsError::TableFull => TAB_FULL,
            _ => SYS_ERR,
        }
    }
}
