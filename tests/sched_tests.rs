//! Scheduler integration tests
//!
//! Starting the scheduler takes over a whole process: signal dispositions,
//! both interval timers and the main control flow. Every test that calls
//! `os_init` therefore runs its scenario inside a forked child and reports
//! back through a shared memory page plus its exit status, keeping the test
//! harness process untouched.
//!
//! Ground rules for scenarios:
//! - the harness process never touches kernel state, so every child starts
//!   from a clean `Uninitialized` kernel;
//! - panics are fine in a child's main flow (they turn into exit code 101),
//!   but thread bodies must leave via `libc::_exit` because unwinding off a
//!   scheduled stack is not survivable;
//! - anything that must outlive the child goes into the shared page.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============ Harness ============

/// Kernel state and the shared page are process-global; scenarios serialize
/// here so concurrent harness threads cannot interleave forks.
fn kernel_lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

/// Map one zeroed page shared between the harness and its forked children.
fn map_shared_words() -> &'static [AtomicU64] {
    let len = 4096;
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    assert_ne!(ptr, libc::MAP_FAILED, "mmap failed");
    unsafe { std::slice::from_raw_parts(ptr as *const AtomicU64, len / 8) }
}

/// Run `child` in a forked process and return its exit code.
///
/// A child that panics exits with 101; one that wedges is killed by the
/// watchdog and fails the test.
fn run_forked(child: impl FnOnce()) -> i32 {
    let pid = unsafe { libc::fork() };
    assert!(pid >= 0, "fork failed");
    if pid == 0 {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(child));
        unsafe { libc::_exit(if outcome.is_ok() { 0 } else { 101 }) };
    }
    wait_child(pid)
}

fn wait_child(pid: libc::pid_t) -> i32 {
    let deadline = Instant::now() + Duration::from_secs(60);
    let mut status = 0;
    loop {
        let rc = unsafe { libc::waitpid(pid, &mut status, libc::WNOHANG) };
        assert!(rc >= 0, "waitpid failed");
        if rc == pid {
            break;
        }
        if Instant::now() > deadline {
            unsafe {
                libc::kill(pid, libc::SIGKILL);
                libc::waitpid(pid, &mut status, 0);
            }
            panic!("scheduler child timed out");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    if libc::WIFEXITED(status) {
        libc::WEXITSTATUS(status)
    } else {
        panic!("scheduler child killed by signal {}", libc::WTERMSIG(status));
    }
}

// Words 0..16 form an append-only event log: word 0 is the cursor, the
// events live behind it.
fn push_event(words: &[AtomicU64], value: u64) {
    let idx = words[0].fetch_add(1, Ordering::SeqCst) as usize;
    words[1 + idx].store(value, Ordering::SeqCst);
}

fn events(words: &[AtomicU64]) -> Vec<u64> {
    let count = words[0].load(Ordering::SeqCst) as usize;
    (0..count)
        .map(|i| words[1 + i].load(Ordering::SeqCst))
        .collect()
}

/// Spin forever on a token nobody releases; each attempt yields the rest of
/// the caller's window, so parked threads cost almost nothing.
fn park_forever() -> ! {
    static NEVER: uthreads::OsBinSem = uthreads::OsBinSem::new(0);
    loop {
        if NEVER.down().is_err() {
            unsafe { libc::_exit(90) };
        }
    }
}

// ============ Registration and state guards ============

#[cfg(test)]
mod registration_tests {
    use super::*;
    use uthreads::{os_init, os_thread_create, os_thread_vtime_ms, OsError};

    fn spin_entry(_arg: i32) {
        park_forever();
    }

    #[test]
    fn test_uninitialized_kernel_rejects_everything() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            assert_eq!(os_thread_create(spin_entry, 0), Err(OsError::NotInit));
            assert_eq!(uthreads::os_start(), Err(OsError::NotInit));
            assert_eq!(os_thread_vtime_ms(0), Err(OsError::NotInit));
            assert_eq!(uthreads::os_thread_current(), None);
            assert_eq!(
                uthreads::os_kernel_state(),
                uthreads::OsKernelState::Uninitialized
            );
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn test_ids_are_dense_and_zero_based() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            os_init(8).unwrap();
            assert_eq!(
                uthreads::os_kernel_state(),
                uthreads::OsKernelState::Configured
            );
            for expected in 0..4 {
                assert_eq!(os_thread_create(spin_entry, 0), Ok(expected));
            }
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn test_reinit_resets_the_table() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            os_init(4).unwrap();
            assert_eq!(os_thread_create(spin_entry, 0), Ok(0));
            assert_eq!(os_thread_create(spin_entry, 0), Ok(1));

            // A kernel that is not running may be reconfigured from scratch
            os_init(8).unwrap();
            assert_eq!(os_thread_create(spin_entry, 0), Ok(0));
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn test_vtime_before_start_is_zero() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            os_init(4).unwrap();
            os_thread_create(spin_entry, 0).unwrap();
            assert_eq!(os_thread_vtime_ms(0), Ok(0));
            assert_eq!(os_thread_vtime_ms(1), Err(OsError::TidInvalid));
        });
        assert_eq!(code, 0);
    }
}

#[cfg(test)]
mod capacity_tests {
    use super::*;
    use uthreads::{os_init, os_thread_create, OsError, CFG_TAB_SIZE_MAX, TAB_FULL};

    fn spin_entry(_arg: i32) {
        park_forever();
    }

    #[test]
    fn test_table_full_after_capacity() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            os_init(2).unwrap();
            assert_eq!(os_thread_create(spin_entry, 0), Ok(0));
            assert_eq!(os_thread_create(spin_entry, 0), Ok(1));

            let err = os_thread_create(spin_entry, 0).unwrap_err();
            assert_eq!(err, OsError::TableFull);
            assert_eq!(err.code(), TAB_FULL);
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn test_out_of_range_request_falls_back_to_max() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            os_init(CFG_TAB_SIZE_MAX + 1).unwrap();
            for expected in 0..CFG_TAB_SIZE_MAX {
                assert_eq!(os_thread_create(spin_entry, 0), Ok(expected));
            }
            assert_eq!(os_thread_create(spin_entry, 0), Err(OsError::TableFull));
        });
        assert_eq!(code, 0);
    }

    #[test]
    fn test_start_with_empty_table() {
        let _guard = kernel_lock();
        let code = run_forked(|| {
            os_init(4).unwrap();
            assert_eq!(uthreads::os_start(), Err(OsError::NoThreads));
            // The failed start must leave the kernel configured
            assert_eq!(
                uthreads::os_kernel_state(),
                uthreads::OsKernelState::Configured
            );
        });
        assert_eq!(code, 0);
    }
}

// ============ Scheduling behavior ============

#[cfg(test)]
mod first_window_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create, os_thread_current, os_thread_vtime_ms};

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    fn recorder(arg: i32) {
        push_event(words(), arg as u64);
        if arg == 1 {
            // Word 20: whether a thread body sees its own id
            let me = os_thread_current() == Some(1);
            words()[20].store(me as u64, Ordering::SeqCst);
        }
        park_forever();
    }

    fn last(arg: i32) {
        push_event(words(), arg as u64);
        // Word 21: a never-scheduled-again thread still answers time queries
        match os_thread_vtime_ms(2) {
            Ok(ms) => words()[21].store(ms + 1, Ordering::SeqCst),
            Err(_) => words()[21].store(0, Ordering::SeqCst),
        }
        unsafe { libc::_exit(0) };
    }

    /// Threads run for the first time in registration order: the voluntary
    /// yields of the parked threads drive the rotation in microseconds, so
    /// nothing here waits out a preemption window.
    #[test]
    fn test_first_activations_in_registration_order() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(4).unwrap();
            os_thread_create(recorder, 0).unwrap();
            os_thread_create(recorder, 1).unwrap();
            os_thread_create(last, 2).unwrap();
            os_start().unwrap();
        });
        assert_eq!(code, 0);
        assert_eq!(events(words()), vec![0, 1, 2]);
        assert_eq!(words()[20].load(Ordering::SeqCst), 1);
        // Fresh thread, microseconds of CPU: reports Ok(0), stored as 1
        assert_eq!(words()[21].load(Ordering::SeqCst), 1);
    }
}

#[cfg(test)]
mod alternation_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create, os_thread_vtime_ms};

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    // Words 30/31: per-thread progress counters
    fn burner(arg: i32) {
        let w = words();
        loop {
            w[30 + arg as usize].fetch_add(1, Ordering::Relaxed);
            if arg == 0 {
                let mine = os_thread_vtime_ms(0).unwrap_or(0);
                let other_progress = w[31].load(Ordering::Relaxed);
                // Over a window of CPU charged to us and the other thread
                // has run: preemption has rotated 0 -> 1 -> 0.
                if mine >= 1100 && other_progress > 0 {
                    unsafe { libc::_exit(0) };
                }
            }
        }
    }

    /// Two busy threads, no voluntary yields: only the preemption timer can
    /// rotate them. Takes a couple of wall-clock seconds.
    #[test]
    fn test_preemption_alternates_busy_threads() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(2).unwrap();
            os_thread_create(burner, 0).unwrap();
            os_thread_create(burner, 1).unwrap();
            os_start().unwrap();
        });
        assert_eq!(code, 0);
        let w = words();
        assert!(w[30].load(Ordering::SeqCst) > 0, "thread 0 never ran");
        assert!(w[31].load(Ordering::SeqCst) > 0, "thread 1 never ran");
    }
}

// ============ Semaphore behavior under scheduling ============

#[cfg(test)]
mod sem_sched_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create, OsBinSem};

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();
    static TOKEN: OsBinSem = OsBinSem::new(1);

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    fn consumer(_arg: i32) {
        // Token starts available: this down returns on the spot
        TOKEN.down().unwrap();
        push_event(words(), 1);
        // Taken now; this down spins, yielding to the producer
        TOKEN.down().unwrap();
        push_event(words(), 3);
        unsafe { libc::_exit(0) };
    }

    fn producer(_arg: i32) {
        push_event(words(), 2);
        TOKEN.up();
        park_forever();
    }

    /// A blocked `down` completes only after the peer's `up`, and the yield
    /// loop hands the CPU over without waiting out a preemption window.
    #[test]
    fn test_contended_down_waits_for_up() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(2).unwrap();
            os_thread_create(consumer, 0).unwrap();
            os_thread_create(producer, 1).unwrap();
            os_start().unwrap();
        });
        assert_eq!(code, 0);
        assert_eq!(events(words()), vec![1, 2, 3]);
    }
}

#[cfg(test)]
mod exclusion_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create, OsBinSem};

    const ROUNDS: u64 = 25;
    const THREADS: usize = 3;

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();
    static GATE: OsBinSem = OsBinSem::new(1);

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    // Word 40: threads inside the critical section. Word 41: total rounds.
    // Word 42: finished threads.
    fn contender(_arg: i32) {
        let w = words();
        for _ in 0..ROUNDS {
            if GATE.down().is_err() {
                unsafe { libc::_exit(91) };
            }
            if w[40].fetch_add(1, Ordering::SeqCst) != 0 {
                // Someone else is inside the critical section
                unsafe { libc::_exit(92) };
            }
            w[41].fetch_add(1, Ordering::SeqCst);
            w[40].fetch_sub(1, Ordering::SeqCst);
            GATE.up();
        }
        if w[42].fetch_add(1, Ordering::SeqCst) + 1 == THREADS as u64 {
            unsafe { libc::_exit(0) };
        }
        park_forever();
    }

    /// The binary semaphore used as a lock: three contenders hammer one
    /// critical section and every entry must be exclusive. Yield-driven
    /// handoffs keep the whole thing in the millisecond range.
    #[test]
    fn test_semaphore_provides_mutual_exclusion() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(4).unwrap();
            for i in 0..THREADS {
                os_thread_create(contender, i as i32).unwrap();
            }
            os_start().unwrap();
        });
        assert_eq!(code, 0);
        let w = words();
        assert_eq!(w[41].load(Ordering::SeqCst), ROUNDS * THREADS as u64);
        assert_eq!(w[40].load(Ordering::SeqCst), 0);
    }
}

// ============ Lifecycle around a running scheduler ============

#[cfg(test)]
mod running_guard_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create, OsError};

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    fn idle(_arg: i32) {
        park_forever();
    }

    fn prober(_arg: i32) {
        let w = words();
        let created = os_thread_create(idle, 0) == Err(OsError::Running);
        let inited = os_init(4) == Err(OsError::Running);
        let started = os_start() == Err(OsError::Running);
        let state = uthreads::os_kernel_state() == uthreads::OsKernelState::Running;
        w[50].store(created as u64, Ordering::SeqCst);
        w[51].store(inited as u64, Ordering::SeqCst);
        w[52].store(started as u64, Ordering::SeqCst);
        w[53].store(state as u64, Ordering::SeqCst);
        unsafe { libc::_exit(0) };
    }

    #[test]
    fn test_running_scheduler_rejects_reconfiguration() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(4).unwrap();
            os_thread_create(prober, 0).unwrap();
            os_start().unwrap();
        });
        assert_eq!(code, 0);
        let w = words();
        for idx in 50..=53 {
            assert_eq!(w[idx].load(Ordering::SeqCst), 1, "probe {} failed", idx);
        }
    }
}

#[cfg(test)]
mod unwind_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create, os_thread_current};

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    fn parked(_arg: i32) {
        push_event(words(), 10);
        park_forever();
    }

    fn returns(_arg: i32) {
        push_event(words(), 11);
        // Returning from a thread entry hands control back to os_start
    }

    /// A returning entry unwinds into the main context: `os_start` comes
    /// back `Ok`, the kernel drops to configured and the other thread stays
    /// suspended forever.
    #[test]
    fn test_entry_return_stops_the_scheduler() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(4).unwrap();
            os_thread_create(parked, 0).unwrap();
            os_thread_create(returns, 1).unwrap();
            os_start().unwrap();

            assert_eq!(os_thread_current(), None);
            assert_eq!(
                uthreads::os_kernel_state(),
                uthreads::OsKernelState::Configured
            );
            // Queries still work against the stopped table
            assert!(uthreads::os_thread_vtime_ms(0).is_ok());
        });
        assert_eq!(code, 0);
        assert_eq!(events(words()), vec![10, 11]);
    }
}

#[cfg(test)]
mod restart_tests {
    use super::*;
    use std::sync::OnceLock;
    use uthreads::{os_init, os_start, os_thread_create};

    static W: OnceLock<&'static [AtomicU64]> = OnceLock::new();

    fn words() -> &'static [AtomicU64] {
        W.get().unwrap()
    }

    fn one_shot(_arg: i32) {
        words()[60].fetch_add(1, Ordering::SeqCst);
    }

    /// After an unwind the same kernel can be started again; entries are
    /// re-armed from scratch, so the thread body runs once per start.
    #[test]
    fn test_start_again_after_unwind() {
        let _guard = kernel_lock();
        W.get_or_init(map_shared_words);
        let code = run_forked(|| {
            os_init(4).unwrap();
            os_thread_create(one_shot, 0).unwrap();
            os_start().unwrap();
            os_start().unwrap();
        });
        assert_eq!(code, 0);
        assert_eq!(words()[60].load(Ordering::SeqCst), 2);
    }
}
