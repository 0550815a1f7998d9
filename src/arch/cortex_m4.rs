//! # Cortex-M4 Port Layer
//!
//! Hardware-specific code for the ARM Cortex-M4 (Thumb-2) processor:
//! the [`Platform`] implementation, SysTick configuration, and the
//! PendSV context switch.
//!
//! ## Context Switch Mechanism
//!
//! The Cortex-M4 uses a split-stack model:
//! - **MSP** (Main Stack Pointer): used by the kernel and interrupt handlers
//! - **PSP** (Process Stack Pointer): used by processes in Thread mode
//!
//! On exception entry, the hardware automatically stacks R0-R3, R12, LR,
//! PC and xPSR onto the process stack. The PendSV handler manually saves
//! and restores R4-R11, which completes the full context save/restore.
//! A [`SavedContext`] is the byte offset of the saved frame within the
//! process's inline stack, so the portable kernel never touches a raw
//! pointer.
//!
//! ## Interrupt Priorities
//!
//! PendSV and SysTick both run at priority 0xFF (lowest), so a context
//! switch never preempts an application-level ISR.

use core::arch::asm;

use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::register;

use super::{Platform, SavedContext};
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};
use crate::kernel::Kernel;

/// Registers in the initial frame: 8 software-saved (R4-R11) plus the
/// 8-word hardware exception frame.
const CONTEXT_WORDS: usize = 16;

// ---------------------------------------------------------------------------
// Kernel access from ISR context
// ---------------------------------------------------------------------------

/// Raw pointer to the running kernel. Set once by [`start`], read from
/// the PendSV and SysTick handlers which cannot easily use references.
static mut KERNEL_PTR: *mut Kernel<CortexM4> = core::ptr::null_mut();

// ---------------------------------------------------------------------------
// Platform implementation
// ---------------------------------------------------------------------------

/// The Cortex-M4 [`Platform`].
///
/// Board crates fill in the optional hooks: `read_keys` feeds the
/// task-manager key polling, `task_manager` is the routine to hand
/// control to when the reserved combination is held.
pub struct CortexM4 {
    /// Poll the board's input keys. `None` disables the task manager.
    pub read_keys: Option<fn() -> u8>,
    /// Task-manager entry routine.
    pub task_manager: Option<fn()>,
}

impl CortexM4 {
    pub const fn new() -> Self {
        Self {
            read_keys: None,
            task_manager: None,
        }
    }
}

impl Platform for CortexM4 {
    /// Lay down the initial register image at the top of `stack` so the
    /// first resume lands in [`dispatcher`].
    ///
    /// ```text
    /// [Hardware stacked frame]   <- PSP on exception entry
    ///   xPSR  (Thumb bit set)
    ///   PC    (dispatcher)
    ///   LR    (process_exit)
    ///   R12, R3..R0  (0)
    /// [Software saved context]
    ///   R11..R4      (0)       <- saved frame, = SavedContext offset
    /// ```
    fn init_context(&mut self, stack: &mut [u8]) -> SavedContext {
        let base = stack.as_ptr() as usize;
        // AAPCS wants the stack 8-byte aligned.
        let aligned_top = (base + stack.len()) & !0x07;
        let frame = aligned_top - CONTEXT_WORDS * 4;

        unsafe {
            let p = frame as *mut u32;
            // R4-R11, then R0-R3 and R12 of the hardware frame.
            for i in 0..13 {
                p.add(i).write(0);
            }
            p.add(13).write(process_exit as usize as u32); // LR
            p.add(14).write(dispatcher as usize as u32); // PC
            p.add(15).write(0x0100_0000); // xPSR, Thumb bit
        }

        SavedContext(frame - base)
    }

    fn suspend_interrupts(&mut self) -> bool {
        let enabled = register::primask::read().is_active();
        cortex_m::interrupt::disable();
        enabled
    }

    fn restore_interrupts(&mut self, enabled: bool) {
        if enabled {
            unsafe { cortex_m::interrupt::enable() };
        }
    }

    /// Gate the scheduler tick by masking the SysTick interrupt. The
    /// counter keeps running; only TICKINT is switched.
    fn set_tick_enabled(&mut self, enabled: bool) {
        // SysTick CSR: 0xE000_E010, TICKINT = bit 1
        const SYST_CSR: *mut u32 = 0xE000_E010 as *mut u32;
        unsafe {
            let val = core::ptr::read_volatile(SYST_CSR);
            let val = if enabled { val | (1 << 1) } else { val & !(1 << 1) };
            core::ptr::write_volatile(SYST_CSR, val);
        }
    }

    fn input_mask(&mut self) -> u8 {
        match self.read_keys {
            Some(read) => read(),
            None => 0,
        }
    }

    fn enter_task_manager(&mut self) {
        if let Some(run) = self.task_manager {
            run();
        }
    }

    fn wait_for_tick(&mut self) {
        cortex_m::asm::wfi();
    }

    fn report_fatal(&mut self, _msg: &str) -> ! {
        cortex_m::interrupt::disable();
        loop {
            cortex_m::asm::wfi();
        }
    }
}

// ---------------------------------------------------------------------------
// Process trampoline
// ---------------------------------------------------------------------------

/// First-resume entry of every process: run the slot's program, then
/// kill the slot when it returns.
extern "C" fn dispatcher() -> ! {
    let kernel = unsafe { &mut *KERNEL_PTR };
    let pid = kernel.scheduler.current_process();
    if let Some(program) = kernel.scheduler.process_slot(pid).program {
        program();
    }
    // Self-kill parks until the tick buries this stack.
    kernel.kill(pid, &mut []);
    loop {
        cortex_m::asm::wfi();
    }
}

/// Landing pad should the frame's LR ever be taken.
extern "C" fn process_exit() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure the SysTick timer to fire the scheduler tick at `TICK_HZ`
/// using the processor clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set PendSV and SysTick to the lowest interrupt priority so context
/// switches never preempt application ISRs.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [23:16] = PendSV priority, [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        let val = val | (0xFF << 16) | (0xFF << 24);
        core::ptr::write_volatile(shpr3, val);
    }
}

/// Trigger a PendSV exception to perform a deferred context switch.
#[inline]
pub fn trigger_pendsv() {
    // ICSR address: 0xE000_ED04, PENDSVSET = bit 28
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

// ---------------------------------------------------------------------------
// Boot
// ---------------------------------------------------------------------------

/// Launch the scheduler. **Does not return.**
///
/// Publishes the kernel for ISR access, configures SysTick, dispatches
/// the idle process and enters Thread mode on its stack.
///
/// # Safety
/// - `kernel` must outlive all scheduling activity (in practice a
///   `static`).
/// - [`Kernel::init`] must already have installed the idle program.
/// - Must be called once, from the main thread.
pub unsafe fn start(kernel: *mut Kernel<CortexM4>, core: &mut cortex_m::Peripherals) -> ! {
    KERNEL_PTR = kernel;
    let kernel = &mut *kernel;

    configure_systick(&mut core.SYST);
    set_interrupt_priorities();

    let ctx = kernel.start();
    let idle = kernel.scheduler.current_process();
    let base = kernel.scheduler.process_slot(idle).stack.as_ptr() as usize;
    start_first_process((base + ctx.0) as *const u32)
}

/// Switch to PSP and branch into the first process via a hand-unwound
/// exception frame.
///
/// # Safety
/// Must only be called once, with a pointer to a frame built by
/// [`Platform::init_context`].
unsafe fn start_first_process(psp: *const u32) -> ! {
    asm!(
        // Skip the 8 software-saved registers (8 x 4 = 32 bytes)
        "adds r0, #32",
        "msr psp, r0",
        // Thread mode on PSP (CONTROL.SPSEL = 1)
        "movs r0, #2",
        "msr control, r0",
        "isb",
        // Pop the hardware frame manually; we are not really returning
        // from an exception
        "pop {{r0-r3, r12}}",
        "pop {{r4}}", // LR (discarded, dispatcher never returns)
        "pop {{r5}}", // PC (dispatcher)
        "pop {{r6}}", // xPSR (discarded, set by the processor)
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Exception handlers
// ---------------------------------------------------------------------------

/// SysTick exception handler: request a context switch. The switch
/// itself is deferred to PendSV so it runs with no other ISR active.
#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    if !KERNEL_PTR.is_null() {
        trigger_pendsv();
    }
}

/// PendSV exception handler, the actual context switch.
///
/// ## Sequence
/// 1. Save R4-R11 onto the current process's stack (PSP)
/// 2. Run the scheduling protocol via [`switch_context`]
/// 3. Restore R4-R11 from the chosen process's stack
/// 4. Return from exception (hardware restores R0-R3, R12, LR, PC, xPSR)
///
/// # Safety
/// Naked function invoked by the NVIC; must follow the exact Cortex-M4
/// exception entry/exit convention.
#[no_mangle]
#[naked]
pub unsafe extern "C" fn PendSV() {
    asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        // switch_context(psp) -> next psp
        "bl {switch}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        // Return to Thread mode on PSP
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        switch = sym switch_context,
        options(noreturn)
    );
}

/// Translate the suspended PSP into a context offset, run the portable
/// dispatch protocol, and translate the chosen context back to a PSP.
///
/// # Safety
/// Called from PendSV with the scheduler quiescent.
#[no_mangle]
unsafe extern "C" fn switch_context(psp: *mut u32) -> *mut u32 {
    let kernel = &mut *KERNEL_PTR;

    let current = kernel.scheduler.current_process();
    let base = kernel.scheduler.process_slot(current).stack.as_ptr() as usize;
    let suspended = SavedContext(psp as usize - base);

    let resumed = kernel.tick(suspended);

    let next = kernel.scheduler.current_process();
    let next_base = kernel.scheduler.process_slot(next).stack.as_ptr() as usize;
    (next_base + resumed.0) as *mut u32
}
