//! # Architecture Abstraction Layer
//!
//! Boundary between the portable kernel and the hardware. The scheduler's
//! algorithmic logic (state transitions, strategy selection, checksum
//! policy) never inspects a machine context; it only moves opaque
//! [`SavedContext`] values between process slots and the [`Platform`]
//! capability that knows how to build and resume them.
//!
//! The Cortex-M4 port lives in [`cortex_m4`] and is compiled only for
//! bare-metal ARM targets. Host tests use a mock platform instead.

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

#[cfg(test)]
pub(crate) mod mock;

/// Opaque handle to a suspended machine context.
///
/// The value is the offset of the saved stack pointer within the owning
/// process's inline stack (stacks grow downward from `STACK_SIZE`).
/// Only the arch port gives it meaning; the scheduler treats it as a
/// token to capture on suspend and hand back on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedContext(pub usize);

impl SavedContext {
    /// Context of a slot that has never been dispatched.
    pub const NONE: SavedContext = SavedContext(0);
}

/// Hardware capability consumed by the kernel.
///
/// One implementation exists per supported target. All methods are
/// invoked with the scheduler's invariants already established; none may
/// call back into the kernel.
pub trait Platform {
    /// Build the initial register image for a fresh process on `stack`
    /// so that the first resume lands in the port's dispatcher, which
    /// invokes the slot's program and kills the process when it returns.
    ///
    /// # Returns
    /// The context token to store in the process slot.
    fn init_context(&mut self, stack: &mut [u8]) -> SavedContext;

    /// Atomically save and clear the global interrupt-enable state.
    ///
    /// # Returns
    /// `true` if interrupts were enabled before the call.
    fn suspend_interrupts(&mut self) -> bool;

    /// Restore the interrupt-enable state captured by
    /// [`suspend_interrupts`](Platform::suspend_interrupts).
    fn restore_interrupts(&mut self, enabled: bool);

    /// Gate the periodic scheduler tick on or off. This is the lever the
    /// critical-section guard pulls; it must not touch other interrupt
    /// sources.
    fn set_tick_enabled(&mut self, enabled: bool);

    /// Bitmask of currently pressed input keys, polled once per tick.
    fn input_mask(&mut self) -> u8 {
        0
    }

    /// Hand control to the external task-manager collaborator. Invoked
    /// from the tick when the reserved key combination is held.
    fn enter_task_manager(&mut self) {}

    /// Park the CPU until the next interrupt. Used by the self-kill spin
    /// while waiting for the reschedule that buries the caller.
    fn wait_for_tick(&mut self) {}

    /// Report an unrecoverable condition (stack corruption, guard
    /// over/underflow). Implementations halt; they never return.
    fn report_fatal(&mut self, msg: &str) -> !;
}
