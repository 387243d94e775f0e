//! Virtual CPU-time queries
//!
//! Thin read side of the accounting the scheduler tick maintains. Internally
//! time is tracked in microseconds; the public query reports milliseconds.

use portable_atomic::Ordering;

use crate::error::{OsError, OsResult};
use crate::kernel::{KERNEL, SCHED};
use crate::types::{OsTid, OsVirtTime};

/// Virtual CPU time consumed by a thread, in milliseconds
///
/// Safe to call at any moment, including while the scheduler is running and
/// the thread in question is executing: the counter is read atomically and
/// the value only ever grows. A thread that has not run yet reports 0.
///
/// # Arguments
/// * `tid` - Id returned by [`os_thread_create`](crate::os_thread_create)
///
/// # Returns
/// * `Ok(ms)` - Accumulated virtual time, truncated to milliseconds
/// * `Err(OsError::NotInit)` - [`os_init`](crate::os_init) has not been called
/// * `Err(OsError::TidInvalid)` - no thread registered under `tid`
pub fn os_thread_vtime_ms(tid: OsTid) -> OsResult<OsVirtTime> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }

    // Read through raw pointers: taking a reference to the whole table here
    // could alias the handler's writes into neighboring slot fields.
    let us = unsafe {
        let sched = SCHED.as_ptr();
        if tid >= (*sched).slots.len() {
            return Err(OsError::TidInvalid);
        }
        let slot = (*sched).slots.as_ptr().add(tid);
        (*slot).vtime.load(Ordering::Relaxed)
    };
    Ok(us / 1000)
}
