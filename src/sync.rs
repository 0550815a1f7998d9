//! # Critical-Section Guard
//!
//! The kernel's sole mutual-exclusion mechanism: a nestable counter that
//! suppresses the periodic scheduler tick while any section is open.
//! Every code path that mutates the process table or a heap map must run
//! inside it.
//!
//! `enter`/`leave` bracket the counter update with a save/clear/restore
//! of the global interrupt-enable state, so the update itself cannot be
//! torn by the tick firing mid-way. The tick gate is only reopened when
//! the outermost section leaves.

use crate::arch::Platform;
use crate::config::MAX_CRITICAL_DEPTH;

/// Nestable critical-section state. Owned by the scheduler; one per
/// kernel instance.
pub struct CriticalSection {
    depth: u8,
}

impl CriticalSection {
    pub const fn new() -> Self {
        Self { depth: 0 }
    }

    /// Current nesting depth. Zero means the tick is running.
    #[inline]
    pub fn depth(&self) -> u8 {
        self.depth
    }

    /// Open a (possibly nested) critical section, disabling the
    /// scheduler tick.
    ///
    /// Overflow of the nesting counter is a fatal condition routed to
    /// [`Platform::report_fatal`].
    pub fn enter(&mut self, platform: &mut dyn Platform) {
        if self.depth == MAX_CRITICAL_DEPTH {
            platform.report_fatal("critical section overflow");
        }
        let enabled = platform.suspend_interrupts();
        self.depth += 1;
        platform.set_tick_enabled(false);
        platform.restore_interrupts(enabled);
    }

    /// Close the innermost critical section, re-enabling the scheduler
    /// tick once the outermost one is gone.
    ///
    /// Underflow (leaving a section that was never entered) is fatal.
    pub fn leave(&mut self, platform: &mut dyn Platform) {
        if self.depth == 0 {
            platform.report_fatal("critical section underflow");
        }
        let enabled = platform.suspend_interrupts();
        self.depth -= 1;
        if self.depth == 0 {
            platform.set_tick_enabled(true);
        }
        platform.restore_interrupts(enabled);
    }

    /// Collapse the nesting depth to a single open section.
    ///
    /// A process that kills itself may die holding nested sections; the
    /// kill path resets the depth to one so its final `leave` brings the
    /// tick back.
    pub(crate) fn collapse_to_one(&mut self) {
        self.depth = 1;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
