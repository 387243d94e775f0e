//! Global kernel state and initialization
//!
//! This module manages the process-wide scheduler state: the thread table,
//! the main (scheduler-entry) context, the lifecycle flags, and the raw
//! pointers published for the signal handler. Initialization, activation and
//! the current-thread query live here.

use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::config;
use crate::core::cs_cell::CsCell;
use crate::core::thread::ThreadSlot;
use crate::critical::{critical_section, CriticalSection};
use crate::error::{OsError, OsResult};
use crate::port;
use crate::port::PortContext;
use crate::types::{OsKernelState, OsTid};

// ============ Kernel State Structures ============

/// Atomic kernel flags
///
/// Readable from the signal handler and from any mainline code without
/// taking references into [`SchedState`].
pub struct KernelFlags {
    initialized: AtomicBool,
    running: AtomicBool,
    current: AtomicUsize,
}

impl KernelFlags {
    const fn new() -> Self {
        Self {
            initialized: AtomicBool::new(false),
            running: AtomicBool::new(false),
            current: AtomicUsize::new(0),
        }
    }

    pub(crate) fn reset(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.current.store(0, Ordering::SeqCst);
    }

    /// Check if the scheduler is running
    #[inline(always)]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Check if the kernel is initialized
    #[inline(always)]
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Index of the slot currently executing
    #[inline(always)]
    pub(crate) fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    /// Set the current slot index
    #[inline(always)]
    pub(crate) fn set_current(&self, idx: usize) {
        self.current.store(idx, Ordering::Relaxed);
    }

    /// Set initialized flag
    #[inline(always)]
    pub(crate) fn set_initialized(&self, val: bool) {
        self.initialized.store(val, Ordering::SeqCst);
    }

    /// Set running flag
    #[inline(always)]
    pub(crate) fn set_running(&self, val: bool) {
        self.running.store(val, Ordering::SeqCst);
    }
}

// ============ Global Instances ============

/// Global kernel state instance
pub(crate) static KERNEL: KernelFlags = KernelFlags::new();

/// Scheduler state: the thread table and the main context.
///
/// Lives in a static, so captured contexts and stacks never move once the
/// table has been reserved.
pub struct SchedState {
    pub(crate) capacity: usize,
    pub(crate) slots: Vec<ThreadSlot>,
    pub(crate) main_ctx: Option<PortContext>,
}

impl SchedState {
    const fn new() -> Self {
        Self {
            capacity: 0,
            slots: Vec::new(),
            main_ctx: None,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.capacity = 0;
        self.slots = Vec::new();
        self.main_ctx = None;
    }

    /// Reserve the whole table up front.
    ///
    /// Slots are only ever pushed into reserved space, which keeps every
    /// captured context at a stable address.
    pub(crate) fn configure(&mut self, capacity: usize) -> OsResult<()> {
        let mut slots = Vec::new();
        if slots.try_reserve_exact(capacity).is_err() {
            crate::error!("thread table allocation failed ({} slots)", capacity);
            return Err(OsError::Sys);
        }
        self.capacity = capacity;
        self.slots = slots;
        self.main_ctx = Some(port::context_new());
        Ok(())
    }

    /// Pointer to the pinned main context, if configured.
    #[inline]
    pub(crate) fn main_ctx_ptr(&mut self) -> Option<*mut PortContext> {
        self.main_ctx.as_mut().map(|ctx| ctx as *mut PortContext)
    }
}

/// Global scheduler state instance
pub(crate) static SCHED: CsCell<SchedState> = CsCell::new(SchedState::new());

// ============ CPU/Context Switch State ============

/// Raw state the signal handler switches with.
///
/// Published under a critical section before activation; the handler reads
/// it without ever forming a reference into [`SchedState`]. Unwinding back
/// to the main context needs no pointer here: every thread context carries
/// it as its return link.
pub(crate) struct CpuState {
    /// Base of the slot array
    pub(crate) slot_base: *mut ThreadSlot,
    /// Number of registered slots at activation
    pub(crate) slot_count: usize,
}

impl CpuState {
    const fn new() -> Self {
        Self {
            slot_base: std::ptr::null_mut(),
            slot_count: 0,
        }
    }

    pub(crate) fn reset(&mut self) {
        self.slot_base = std::ptr::null_mut();
        self.slot_count = 0;
    }
}

/// Global CPU state instance
pub(crate) static CPU_STATE: CsCell<CpuState> = CsCell::new(CpuState::new());

// ============ Public API ============

/// Initialize the scheduler kernel
///
/// Installs the preemption/accounting signal handler and allocates the
/// thread table. A requested capacity outside
/// [`CFG_TAB_SIZE_MIN`](config::CFG_TAB_SIZE_MIN)..=[`CFG_TAB_SIZE_MAX`](config::CFG_TAB_SIZE_MAX)
/// falls back to the maximum. May be called again to reset a kernel that is
/// not running; the previous table and its stacks are released.
///
/// # Returns
/// * `Ok(())` - Initialization successful
/// * `Err(OsError::Running)` - the scheduler currently owns the process
/// * `Err(OsError::Sys)` - handler installation or table allocation failed
pub fn os_init(tab_size: usize) -> OsResult<()> {
    if KERNEL.is_running() {
        return Err(OsError::Running);
    }

    port::install_handler()?;

    let capacity = config::clamp_tab_size(tab_size);
    critical_section(|cs| {
        KERNEL.reset();
        CPU_STATE.get(cs).reset();
        let sched = SCHED.get(cs);
        sched.reset();
        sched.configure(capacity)
    })?;

    KERNEL.set_initialized(true);
    crate::info!("kernel initialized, thread table capacity {}", capacity);
    Ok(())
}

/// Hand the process over to the scheduler
///
/// Arms the accounting and preemption timers, installs every registered
/// thread's entry point, then switches from the main context into thread 0.
/// Under normal operation this never returns: control lives inside the
/// scheduler and its threads from here on. It does return `Ok(())` if some
/// thread's entry function ever returns, in which case both timers are
/// disarmed and the kernel drops back to the configured state.
///
/// # Returns
/// * `Err(OsError::NotInit)` - [`os_init`] has not been called
/// * `Err(OsError::Running)` - the scheduler is already running
/// * `Err(OsError::NoThreads)` - nothing registered to run
/// * `Err(OsError::Sys)` - timer setup or the initial switch failed
pub fn os_start() -> OsResult<()> {
    if !KERNEL.is_initialized() {
        return Err(OsError::NotInit);
    }
    if KERNEL.is_running() {
        return Err(OsError::Running);
    }

    // Signals stay blocked from here until the switch installs thread 0's
    // own mask; the unwind path below resumes with them blocked again.
    let cs = CriticalSection::enter();

    let sched = SCHED.get(&cs);
    if sched.slots.is_empty() {
        return Err(OsError::NoThreads);
    }

    port::install_handler()?;
    port::arm_acct_timer()?;

    for slot in sched.slots.iter_mut() {
        // SAFETY: the context and its stack are pinned inside the table for
        // as long as the kernel stays configured.
        unsafe {
            port::context_install_entry(&mut slot.ctx, slot.tid);
        }
    }

    let main_ctx = match sched.main_ctx_ptr() {
        Some(ctx) => ctx,
        None => return Err(OsError::NotInit),
    };
    let base = sched.slots.as_mut_ptr();
    let count = sched.slots.len();

    let cpu = CPU_STATE.get(&cs);
    cpu.slot_base = base;
    cpu.slot_count = count;

    // Same provenance as the pointers the handler derives from `slot_base`.
    let first = unsafe { &raw mut (*base).ctx };

    KERNEL.set_current(0);
    KERNEL.set_running(true);
    port::arm_preempt_timer();
    crate::info!("scheduler starting, {} threads registered", count);

    // SAFETY: both contexts are captured and pinned; slot 0 carries a fresh
    // entry installed just above.
    if unsafe { port::context_switch(main_ctx, first) }.is_err() {
        KERNEL.set_running(false);
        port::disarm_timers();
        crate::error!("initial context switch failed");
        return Err(OsError::Sys);
    }

    // A thread entry returned and control unwound into the main context.
    port::disarm_timers();
    KERNEL.set_running(false);
    crate::info!("a thread entry returned, scheduler stopped");
    Ok(())
}

/// Id of the thread currently scheduled, if the scheduler is running.
///
/// A snapshot: the scheduler may have moved on by the time the caller looks
/// at it. From inside a thread body it is always that thread's own id.
pub fn os_thread_current() -> Option<OsTid> {
    if KERNEL.is_running() {
        Some(KERNEL.current())
    } else {
        None
    }
}

/// Coarse lifecycle state of the kernel
#[inline]
pub fn os_kernel_state() -> OsKernelState {
    if KERNEL.is_running() {
        OsKernelState::Running
    } else if KERNEL.is_initialized() {
        OsKernelState::Configured
    } else {
        OsKernelState::Uninitialized
    }
}

// ============ Thread entry dispatch ============

/// First-activation entry invoked by the port trampoline.
pub(crate) fn thread_entry_dispatch(idx: usize) {
    let (entry, arg) = unsafe {
        let cpu = &*CPU_STATE.as_ptr();
        let slot = cpu.slot_base.add(idx);
        ((*slot).entry, (*slot).arg)
    };
    crate::debug!("thread {} first activation", idx);
    entry(arg);
}
