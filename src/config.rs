//! # nibos Configuration
//!
//! Compile-time constants governing the kernel. All limits are fixed at
//! compile time — the kernel never allocates.

/// Maximum number of processes the table can hold, including the idle
/// process in slot 0. Owner ids are stored in a 4-bit map nibble, so
/// this must stay below 15.
pub const MAX_PROCESSES: usize = 8;

/// Per-process stack size in bytes. Must be large enough for the deepest
/// call chain plus the initial register image built by the arch port.
pub const STACK_SIZE: usize = 256;

/// Number of bytes at the top of each process stack covered by the
/// integrity checksum. The initial register image lives here, so
/// corruption of a suspended context is caught before resume.
pub const CHECKSUM_SPAN: usize = 36;

/// Seed value the stack checksum starts from before folding in bytes.
pub const CHECKSUM_SEED: u8 = 11;

/// Maximum nesting depth of critical sections. Exceeding this is a
/// fatal condition, not a recoverable error.
pub const MAX_CRITICAL_DEPTH: u8 = u8::MAX;

/// Priority assigned to processes started without an explicit one,
/// and to the idle process.
pub const DEFAULT_PRIORITY: u8 = 0;

/// Pressed-key bitmask (Enter + Esc) reserved to hand control to the
/// external task manager during the scheduler tick.
pub const TASKMAN_KEYS: u8 = 0b0000_1001;

/// SysTick frequency in Hz. Determines scheduler tick granularity.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
