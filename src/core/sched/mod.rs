//! Round-robin preemption and CPU-time accounting
//!
//! Everything in this module executes inside the signal handler. The rules
//! here are strict: no allocation, no locks, no logging, no references into
//! [`SchedState`](crate::kernel::SchedState). State is reached through the
//! raw pointers published in `CPU_STATE` and through atomics, and failures
//! end the process via `port::fatal`.

use portable_atomic::Ordering;

use crate::config::CFG_ACCT_TICK_USEC;
use crate::kernel::{CPU_STATE, KERNEL};
use crate::port;

// ============ Preemption ============

/// Charge the outgoing thread, pick the next slot round-robin and switch.
///
/// Runs on every preemption-timer expiry and on every voluntary yield a
/// contended semaphore raises. Control returns here only when some later
/// tick switches back into the saved context; the handler frame then
/// unwinds on the resumed thread's own stack.
pub(crate) fn preempt_tick() {
    if !KERNEL.is_running() {
        return;
    }
    let cpu = unsafe { &*CPU_STATE.as_ptr() };

    let elapsed = match port::acct_timer_elapsed_restart() {
        Ok(us) => us,
        Err(()) => port::fatal("uthreads: accounting timer read failed in handler\n"),
    };

    let prev = KERNEL.current();
    unsafe {
        (*cpu.slot_base.add(prev)).vtime.fetch_add(elapsed, Ordering::Relaxed);
    }

    port::arm_preempt_timer();

    // Running implies at least one registered slot.
    let next = (prev + 1) % cpu.slot_count;
    KERNEL.set_current(next);

    let save = unsafe { &raw mut (*cpu.slot_base.add(prev)).ctx };
    let load = unsafe { &raw mut (*cpu.slot_base.add(next)).ctx };
    if unsafe { port::context_switch(save, load) }.is_err() {
        port::fatal("uthreads: context switch failed in handler\n");
    }
}

// ============ Accounting ============

/// Charge one accounting quantum to the thread currently executing.
///
/// Fired by the virtual (CPU-time) interval timer, so a thread only pays
/// while the process is actually consuming processor time.
pub(crate) fn acct_tick() {
    if !KERNEL.is_running() {
        return;
    }
    let cpu = unsafe { &*CPU_STATE.as_ptr() };
    let curr = KERNEL.current();
    unsafe {
        (*cpu.slot_base.add(curr))
            .vtime
            .fetch_add(CFG_ACCT_TICK_USEC, Ordering::Relaxed);
    }
}
