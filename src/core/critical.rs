//! Critical section handling for the thread runtime
//!
//! Mainline code that rebuilds kernel state must not be interrupted by the
//! scheduler signals halfway through. The guard blocks SIGALRM and SIGVTALRM
//! for its lifetime and restores the caller's previous signal mask on drop,
//! so nested sections compose.

use crate::port;

/// RAII guard for critical sections
///
/// When this guard is created, the scheduler signals are blocked.
/// When it is dropped, the signal mask is restored to its previous state.
pub struct CriticalSection {
    saved: port::SavedMask,
}

impl CriticalSection {
    /// Enter a critical section by blocking the scheduler signals.
    ///
    /// Returns a guard that will restore the signal mask when dropped.
    #[inline]
    pub fn enter() -> Self {
        CriticalSection {
            saved: port::block_sched_signals(),
        }
    }
}

impl Drop for CriticalSection {
    #[inline]
    fn drop(&mut self) {
        port::restore_signal_mask(&self.saved);
    }
}

/// Execute a closure with the scheduler signals blocked
///
/// The closure receives a reference to the critical section guard,
/// which can be used to access [`CsCell`](crate::core::cs_cell::CsCell)
/// protected data.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(&CriticalSection) -> R,
{
    let cs = CriticalSection::enter();
    f(&cs)
}
