//! Thread registration
//!
//! Threads are registered between [`os_init`](crate::os_init) and
//! [`os_start`](crate::os_start). Registration allocates a private stack,
//! reserves the next table slot and captures the initial context in place.

mod slot;

pub use slot::ThreadSlot;

use crate::config::CFG_STACK_SIZE;
use crate::critical::critical_section;
use crate::error::{OsError, OsResult};
use crate::kernel::{KERNEL, SCHED};
use crate::port;
use crate::types::{OsThreadFn, OsTid};

// ============ Thread Creation ============

/// Register a thread with the scheduler
///
/// Ids are handed out in registration order starting at 0 and stay dense.
/// The entry function is not run here; it first executes once
/// [`os_start`](crate::os_start) schedules the new slot.
///
/// # Arguments
/// * `entry` - Thread entry function, expected to run indefinitely
/// * `arg` - Value passed to `entry` on first activation
///
/// # Returns
/// * `Ok(tid)` - Id of the new thread
/// * `Err(OsError::NotInit)` - [`os_init`](crate::os_init) has not been called
/// * `Err(OsError::Running)` - registration after [`os_start`](crate::os_start)
/// * `Err(OsError::TableFull)` - every configured slot is taken
/// * `Err(OsError::Sys)` - stack allocation or context capture failed
///
/// # Example
/// ```
/// fn worker(arg: i32) {
///     let _ = arg;
///     loop {}
/// }
///
/// uthreads::os_init(8).unwrap();
/// let tid = uthreads::os_thread_create(worker, 7).unwrap();
/// assert_eq!(tid, 0);
/// ```
pub fn os_thread_create(entry: OsThreadFn, arg: i32) -> OsResult<OsTid> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }
    if KERNEL.is_running() {
        return Err(OsError::Running);
    }

    let stack = alloc_stack()?;

    critical_section(|cs| {
        let sched = SCHED.get(cs);
        if sched.slots.len() == sched.capacity {
            return Err(OsError::TableFull);
        }
        let main_ctx = match sched.main_ctx_ptr() {
            Some(ctx) => ctx,
            None => return Err(OsError::NotInit),
        };

        // Reserved space only; the slot address is final from here on.
        let tid = sched.slots.len();
        sched.slots.push(ThreadSlot::new(tid, entry, arg, stack));

        let new = &mut sched.slots[tid];
        let stack_ptr = new.stack.as_mut_ptr();
        let stack_len = new.stack.len();
        // SAFETY: slot and main context are pinned in the table, and the
        // stack buffer is owned by the slot being wired up.
        let captured =
            unsafe { port::context_capture(&mut new.ctx, stack_ptr, stack_len, main_ctx) };
        if captured.is_err() {
            sched.slots.pop();
            return Err(OsError::Sys);
        }

        crate::debug!("thread {} registered", tid);
        Ok(tid)
    })
}

/// Allocate a thread stack without aborting on exhaustion.
fn alloc_stack() -> OsResult<Box<[u8]>> {
    let mut stack: Vec<u8> = Vec::new();
    if stack.try_reserve_exact(CFG_STACK_SIZE).is_err() {
        crate::error!("thread stack allocation failed ({} bytes)", CFG_STACK_SIZE);
        return Err(OsError::Sys);
    }
    stack.resize(CFG_STACK_SIZE, 0);
    Ok(stack.into_boxed_slice())
}
