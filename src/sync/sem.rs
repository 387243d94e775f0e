//! Binary semaphore implementation
//!
//! Busy-wait binary semaphores for thread synchronization. A contended
//! wait does not park the caller: it yields its remaining preemption window
//! and retries when rescheduled.

use portable_atomic::{AtomicU32, Ordering};

use crate::error::OsResult;
use crate::port;

/// Binary semaphore
///
/// Holds a single token: 1 means available, 0 means taken. All state lives
/// in one atomic word, so a `static` semaphore can be shared freely between
/// threads and touched concurrently with scheduler switches.
pub struct OsBinSem {
    /// Token word, always 0 or 1
    value: AtomicU32,
}

impl OsBinSem {
    /// Create a new binary semaphore
    ///
    /// # Arguments
    /// * `init` - Initial state; any nonzero value is treated as 1
    pub const fn new(init: u32) -> Self {
        OsBinSem {
            value: AtomicU32::new(if init == 0 { 0 } else { 1 }),
        }
    }

    /// Reinitialize the semaphore state
    ///
    /// # Arguments
    /// * `init` - New state; any nonzero value is treated as 1
    pub fn init(&self, init: u32) {
        self.value
            .store(if init == 0 { 0 } else { 1 }, Ordering::SeqCst);
    }

    /// Release the token (up)
    ///
    /// Sets the semaphore to available regardless of its previous state:
    /// releasing an already-available semaphore is a no-op, not an error.
    /// No waiter is woken directly; spinning threads pick the token up the
    /// next time they are scheduled.
    pub fn up(&self) {
        self.value.swap(1, Ordering::SeqCst);
    }

    /// Acquire the token (down), yielding while it is taken
    ///
    /// Each failed attempt gives up the rest of the caller's preemption
    /// window by raising the scheduler signal, so a waiter burns almost no
    /// CPU time while the token is held elsewhere. There is no wait queue
    /// and no fairness: with several waiters, whichever one the scheduler
    /// runs after an [`up`](Self::up) wins the token.
    ///
    /// Contended waits make progress only while the scheduler is running;
    /// before [`os_start`](crate::os_start) a `down` on a taken semaphore
    /// has nothing to yield to.
    ///
    /// # Returns
    /// * `Ok(())` - Token acquired
    /// * `Err(OsError::Sys)` - yielding to the scheduler failed
    pub fn down(&self) -> OsResult<()> {
        loop {
            if self.value.swap(0, Ordering::SeqCst) == 1 {
                return Ok(());
            }
            port::raise_sched_signal()?;
        }
    }

    /// Current token state (0 taken, 1 available)
    ///
    /// A snapshot; another thread may take or release the token right after
    /// the load.
    #[inline(always)]
    pub fn value(&self) -> u32 {
        self.value.load(Ordering::SeqCst)
    }
}

impl Default for OsBinSem {
    fn default() -> Self {
        Self::new(0)
    }
}
