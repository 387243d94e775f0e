//! Critical section protected cell
//!
//! Zero-overhead wrapper for kernel state that must only be reshaped while
//! the scheduler signals are blocked.

use crate::critical::CriticalSection;
use std::cell::UnsafeCell;

/// A cell that can only be borrowed within a critical section.
///
/// The signal handler never takes the `&mut` path; it goes through
/// [`CsCell::as_ptr`] and touches only atomic fields and the context slots
/// published for it, so a mainline borrow and a handler access never alias
/// the same bytes.
pub struct CsCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for CsCell<T> {}

impl<T> CsCell<T> {
    /// Create a new CsCell
    #[inline(always)]
    pub const fn new(value: T) -> Self {
        Self(UnsafeCell::new(value))
    }

    /// Get a mutable reference to the inner value
    #[inline(always)]
    pub fn get(&self, _cs: &CriticalSection) -> &mut T {
        unsafe { &mut *self.0.get() }
    }

    /// Get a raw pointer
    #[inline(always)]
    pub const fn as_ptr(&self) -> *mut T {
        self.0.get()
    }
}
