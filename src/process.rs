//! # Process Model
//!
//! Defines one slot of the fixed process table: lifecycle state, advisory
//! priority, the saved machine context, the program to run, and an
//! integrity checksum over the slot's private stack.
//!
//! ## Lifecycle
//!
//! ```text
//!   ┌──────────┐      exec()       ┌─────────┐    dispatch()   ┌─────────┐
//!   │  Unused  │ ────────────────► │  Ready  │ ──────────────► │ Running │
//!   └──────────┘                   └─────────┘                 └─────────┘
//!        ▲                              ▲        preempt            │
//!        │            kill()            └──────────────────────────┘
//!        └──────────────────────────────────────────────────────────┘
//! ```

use crate::arch::SavedContext;
use crate::config::{CHECKSUM_SEED, CHECKSUM_SPAN, STACK_SIZE};

/// Index into the process table. Slot 0 is permanently reserved for the
/// idle process.
pub type ProcessId = u8;

/// Advisory scheduling priority: 0 least favourable, 255 most
/// favourable. Some strategies ignore it.
pub type Priority = u8;

/// A process body. Returning from it is a request for self-termination:
/// the arch port's dispatcher calls `kill` on return.
pub type Program = fn();

/// XOR digest over a suspended process's stack, recomputed every context
/// switch to detect stack corruption.
pub type StackChecksum = u8;

// ---------------------------------------------------------------------------
// Process state machine
// ---------------------------------------------------------------------------

/// Lifecycle tag of a process table slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Slot is free; `exec` may claim it.
    Unused,
    /// Process is runnable and waiting for the CPU.
    Ready,
    /// Process is currently executing.
    Running,
}

// ---------------------------------------------------------------------------
// Process slot
// ---------------------------------------------------------------------------

/// One entry of the process table.
///
/// The stack is inline, so a slot is self-contained: claiming it for a
/// new process only requires rebuilding the register image and resetting
/// the bookkeeping, never allocating.
pub struct Process {
    /// Lifecycle state.
    pub state: ProcessState,

    /// Advisory priority used by priority-aware scheduling strategies.
    pub priority: Priority,

    /// Saved machine context while not running. Opaque to the kernel;
    /// only the arch port interprets it.
    pub context: SavedContext,

    /// Checksum of the stack top recorded when the process was last
    /// suspended. A mismatch at resume time is fatal.
    pub checksum: StackChecksum,

    /// The program this slot runs. `None` while the slot is unused.
    pub program: Option<Program>,

    /// Private stack, growing downward from `STACK_SIZE`. The initial
    /// register image is laid down at the top by the arch port.
    pub stack: [u8; STACK_SIZE],
}

impl Process {
    /// An unused slot. Used to initialize the process table.
    pub const EMPTY: Process = Process {
        state: ProcessState::Unused,
        priority: 0,
        context: SavedContext::NONE,
        checksum: 0,
        program: None,
        stack: [0; STACK_SIZE],
    };

    /// Compute the integrity digest over the top [`CHECKSUM_SPAN`] bytes
    /// of this slot's stack — the region holding the saved register
    /// image of a suspended process.
    pub fn stack_checksum(&self) -> StackChecksum {
        let mut sum = CHECKSUM_SEED;
        for &byte in &self.stack[STACK_SIZE - CHECKSUM_SPAN..] {
            sum ^= byte;
        }
        sum
    }

    /// Whether this slot may be handed the CPU.
    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ProcessState::Ready
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
