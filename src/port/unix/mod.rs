//! Unix (glibc) port implementation
//!
//! Provides preemption via SIGALRM/SIGVTALRM and context switching via the
//! ucontext family. Functions on the signal-handler path (`acct_timer_elapsed_
//! restart`, `context_switch`, `fatal`) restrict themselves to async-signal-
//! safe syscalls: no allocation, no locks, no logging.

use libc::c_int;

use crate::config::{CFG_ACCT_TICK_USEC, CFG_PREEMPT_INTERVAL_SEC};
use crate::error::{OsError, OsResult};

/// Saved execution context of one logical thread or of the main flow.
///
/// glibc contexts hold internal self-references once captured, so a
/// `PortContext` must never be moved after [`context_capture`] has filled it.
/// The kernel guarantees this by reserving the whole slot table up front.
pub type PortContext = libc::ucontext_t;

/// Signal mask saved by [`block_sched_signals`]
pub type SavedMask = libc::sigset_t;

/// A context value ready to be captured into.
pub fn context_new() -> PortContext {
    // All-zero is a valid "not yet captured" state; getcontext overwrites it.
    unsafe { std::mem::zeroed() }
}

// ============ Signal handler installation ============

/// Shared entry point for both scheduler signals.
///
/// SIGALRM drives preemption (and is also raised synchronously by a contended
/// semaphore); SIGVTALRM is the fine-grained CPU accounting tick.
extern "C" fn sched_signal_entry(sig: c_int) {
    if sig == libc::SIGALRM {
        crate::core::sched::preempt_tick();
    } else if sig == libc::SIGVTALRM {
        crate::core::sched::acct_tick();
    }
}

/// Install [`sched_signal_entry`] for SIGALRM and SIGVTALRM.
///
/// The handler runs with all signals masked and restarts interrupted
/// syscalls, so the context-switch sequence cannot be re-entered.
pub fn install_handler() -> OsResult<()> {
    let mut sa: libc::sigaction = unsafe { std::mem::zeroed() };
    sa.sa_flags = libc::SA_RESTART;
    sa.sa_sigaction = sched_signal_entry as libc::sighandler_t;
    unsafe {
        libc::sigfillset(&mut sa.sa_mask);
    }

    for sig in [libc::SIGALRM, libc::SIGVTALRM] {
        if unsafe { libc::sigaction(sig, &sa, std::ptr::null_mut()) } == -1 {
            crate::error!(
                "sigaction({}) failed: {}",
                sig,
                std::io::Error::last_os_error()
            );
            return Err(OsError::Sys);
        }
    }
    Ok(())
}

// ============ Timers ============

/// Arm the periodic CPU-accounting timer (ITIMER_VIRTUAL).
pub fn arm_acct_timer() -> OsResult<()> {
    let period = libc::timeval {
        tv_sec: 0,
        tv_usec: CFG_ACCT_TICK_USEC as libc::suseconds_t,
    };
    let itv = libc::itimerval {
        it_interval: period,
        it_value: period,
    };
    if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &itv, std::ptr::null_mut()) } == -1 {
        crate::error!(
            "setitimer(ITIMER_VIRTUAL) failed: {}",
            std::io::Error::last_os_error()
        );
        return Err(OsError::Sys);
    }
    Ok(())
}

/// Arm (or re-arm) the wall-clock preemption timer.
#[inline]
pub fn arm_preempt_timer() {
    // alarm cannot fail; it returns the seconds left on any previous alarm
    unsafe {
        libc::alarm(CFG_PREEMPT_INTERVAL_SEC);
    }
}

/// Cancel both timers. Best effort, used when scheduling winds down.
pub fn disarm_timers() {
    let zero = libc::timeval {
        tv_sec: 0,
        tv_usec: 0,
    };
    let itv = libc::itimerval {
        it_interval: zero,
        it_value: zero,
    };
    unsafe {
        libc::alarm(0);
        libc::setitimer(libc::ITIMER_VIRTUAL, &itv, std::ptr::null_mut());
    }
}

#[inline]
fn timeval_usec(tv: &libc::timeval) -> u64 {
    tv.tv_sec as u64 * 1_000_000 + tv.tv_usec as u64
}

/// Read how much of the accounting period has elapsed and restart the period.
///
/// Returns the consumed CPU time in microseconds. Async-signal-safe; called
/// from the preemption path, the caller treats `Err` as fatal.
pub fn acct_timer_elapsed_restart() -> Result<u64, ()> {
    let mut itv: libc::itimerval = unsafe { std::mem::zeroed() };
    if unsafe { libc::getitimer(libc::ITIMER_VIRTUAL, &mut itv) } == -1 {
        return Err(());
    }
    let interval = timeval_usec(&itv.it_interval);
    let remaining = timeval_usec(&itv.it_value);
    let elapsed = interval.saturating_sub(remaining);

    itv.it_value = itv.it_interval;
    if unsafe { libc::setitimer(libc::ITIMER_VIRTUAL, &itv, std::ptr::null_mut()) } == -1 {
        return Err(());
    }
    Ok(elapsed)
}

// ============ Signal masking and delivery ============

/// Block both scheduler signals, returning the previous mask.
pub fn block_sched_signals() -> SavedMask {
    unsafe {
        let mut block: libc::sigset_t = std::mem::zeroed();
        let mut saved: libc::sigset_t = std::mem::zeroed();
        libc::sigemptyset(&mut block);
        libc::sigaddset(&mut block, libc::SIGALRM);
        libc::sigaddset(&mut block, libc::SIGVTALRM);
        // Cannot fail with a valid `how` argument
        libc::sigprocmask(libc::SIG_BLOCK, &block, &mut saved);
        saved
    }
}

/// Restore a mask saved by [`block_sched_signals`].
pub fn restore_signal_mask(saved: &SavedMask) {
    unsafe {
        libc::sigprocmask(libc::SIG_SETMASK, saved, std::ptr::null_mut());
    }
}

/// Deliver the preemption signal to ourselves, synchronously.
///
/// This is the voluntary-yield mechanism of a contended semaphore: the
/// handler runs before this returns and switches to the next thread.
pub fn raise_sched_signal() -> OsResult<()> {
    if unsafe { libc::raise(libc::SIGALRM) } != 0 {
        crate::error!("raise(SIGALRM) failed: {}", std::io::Error::last_os_error());
        return Err(OsError::Sys);
    }
    Ok(())
}

// ============ Context switching ============

/// makecontext requires a zero-argument entry; the slot index rides through
/// as a variadic int and the trampoline looks the thread up again.
extern "C" fn thread_trampoline(slot: c_int) {
    crate::kernel::thread_entry_dispatch(slot as usize);
}

/// Capture the current execution state into `ctx` and wire its stack and
/// return link.
///
/// SIGALRM and SIGVTALRM are removed from the captured signal mask, so a
/// thread built from this context starts preemptible even though
/// registration itself runs with those signals blocked.
///
/// # Safety
/// `ctx` and `link` must point to valid, pinned `PortContext` values and
/// `stack` must reference `stack_len` writable bytes that outlive the
/// context.
pub unsafe fn context_capture(
    ctx: *mut PortContext,
    stack: *mut u8,
    stack_len: usize,
    link: *mut PortContext,
) -> OsResult<()> {
    if unsafe { libc::getcontext(ctx) } == -1 {
        crate::error!("getcontext failed: {}", std::io::Error::last_os_error());
        return Err(OsError::Sys);
    }
    unsafe {
        libc::sigdelset(&mut (*ctx).uc_sigmask, libc::SIGALRM);
        libc::sigdelset(&mut (*ctx).uc_sigmask, libc::SIGVTALRM);
        (*ctx).uc_stack.ss_sp = stack.cast();
        (*ctx).uc_stack.ss_size = stack_len;
        (*ctx).uc_stack.ss_flags = 0;
        (*ctx).uc_link = link;
    }
    Ok(())
}

/// Point a captured context at the thread entry trampoline for `slot`.
///
/// The scheduler signals are stripped from the context's mask once more:
/// a context reused across scheduler runs may still carry the all-blocked
/// mask it was last suspended with inside the handler, and `makecontext`
/// itself never touches the mask.
///
/// # Safety
/// `ctx` must have been filled by [`context_capture`] and must stay pinned
/// until the scheduler is done with it.
pub unsafe fn context_install_entry(ctx: *mut PortContext, slot: usize) {
    let entry: extern "C" fn(c_int) = thread_trampoline;
    unsafe {
        libc::sigdelset(&mut (*ctx).uc_sigmask, libc::SIGALRM);
        libc::sigdelset(&mut (*ctx).uc_sigmask, libc::SIGVTALRM);
        let entry = std::mem::transmute::<extern "C" fn(c_int), extern "C" fn()>(entry);
        libc::makecontext(ctx, entry, 1, slot as c_int);
    }
}

/// Save the running state into `save` and resume `load`.
///
/// Returns only once something switches back into `save` (reported as `Ok`),
/// or immediately with `Err` if the switch itself failed. The signal mask
/// travels with each context, which is what lets a thread suspended inside
/// the signal handler finish that handler when it is resumed. Async-signal-
/// safe.
///
/// # Safety
/// Both pointers must reference captured, pinned contexts; `load` must hold
/// either a makecontext-initialized entry or a previously saved suspension.
pub unsafe fn context_switch(save: *mut PortContext, load: *mut PortContext) -> Result<(), ()> {
    if unsafe { libc::swapcontext(save, load as *const PortContext) } == -1 {
        return Err(());
    }
    Ok(())
}

// ============ Fatal path ============

/// Terminate the process from the signal handler.
///
/// Mid-switch failures leave no valid current context, so there is nothing
/// to return to. Writes straight to stderr and exits without running any
/// cleanup; both calls are async-signal-safe.
pub(crate) fn fatal(msg: &str) -> ! {
    unsafe {
        let _ = libc::write(libc::STDERR_FILENO, msg.as_ptr().cast(), msg.len());
        libc::_exit(1);
    }
}
