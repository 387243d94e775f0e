//! Thread slot definition

use portable_atomic::AtomicU64;

use crate::port;
use crate::port::PortContext;
use crate::types::{OsThreadFn, OsTid};

// ============ Thread Slot ============

/// One registered logical thread.
///
/// Slots live in the kernel's table and stay at a fixed address from
/// registration until the next re-init; the saved context is captured in
/// place and must never move.
pub struct ThreadSlot {
    // ---- Identity ----
    /// Registration-order id, equal to the slot index
    pub(crate) tid: OsTid,

    // ---- Entry ----
    /// Entry function, run on first activation
    pub(crate) entry: OsThreadFn,
    /// Argument handed to the entry function
    pub(crate) arg: i32,

    // ---- Execution state ----
    /// Saved execution context, pinned inside the slot
    pub(crate) ctx: PortContext,
    /// Private stack backing `ctx`
    pub(crate) stack: Box<[u8]>,

    // ---- Accounting ----
    /// Accumulated virtual CPU time in microseconds
    pub(crate) vtime: AtomicU64,
}

impl ThreadSlot {
    /// Create a slot with a blank context.
    ///
    /// The context carries nothing useful until
    /// [`port::context_capture`] runs against the slot in its final place.
    pub(crate) fn new(tid: OsTid, entry: OsThreadFn, arg: i32, stack: Box<[u8]>) -> Self {
        Self {
            tid,
            entry,
            arg,
            ctx: port::context_new(),
            stack,
            vtime: AtomicU64::new(0),
        }
    }
}
