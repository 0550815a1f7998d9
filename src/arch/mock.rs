//! Host-side platform stand-in for unit tests.
//!
//! Records tick-gate and interrupt transitions so guard and scheduler
//! tests can assert on them, and turns fatal reports into panics so
//! `#[should_panic]` tests can observe integrity failures.

use super::{Platform, SavedContext};
use crate::config::STACK_SIZE;

pub struct MockPlatform {
    /// Current state of the scheduler tick gate.
    pub tick_enabled: bool,
    /// Simulated global interrupt-enable flag.
    pub interrupts_enabled: bool,
    /// How often the tick gate was switched (either direction).
    pub tick_toggles: u32,
    /// Key bitmask returned by `input_mask`.
    pub input: u8,
    /// Number of times the task-manager hook fired.
    pub taskman_entries: u32,
    /// Number of times `wait_for_tick` parked the CPU.
    pub parks: u32,
    /// When set, the test aborts after this many parks. There is no
    /// tick source on the host, so an unbounded park loop would hang
    /// the test instead of failing it.
    pub park_limit: Option<u32>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            tick_enabled: true,
            interrupts_enabled: true,
            tick_toggles: 0,
            input: 0,
            taskman_entries: 0,
            parks: 0,
            park_limit: None,
        }
    }
}

impl Platform for MockPlatform {
    fn init_context(&mut self, stack: &mut [u8]) -> SavedContext {
        // Pretend the full register image was laid down at the stack top.
        debug_assert_eq!(stack.len(), STACK_SIZE);
        SavedContext(stack.len())
    }

    fn suspend_interrupts(&mut self) -> bool {
        let prior = self.interrupts_enabled;
        self.interrupts_enabled = false;
        prior
    }

    fn restore_interrupts(&mut self, enabled: bool) {
        self.interrupts_enabled = enabled;
    }

    fn set_tick_enabled(&mut self, enabled: bool) {
        if self.tick_enabled != enabled {
            self.tick_toggles += 1;
        }
        self.tick_enabled = enabled;
    }

    fn input_mask(&mut self) -> u8 {
        self.input
    }

    fn enter_task_manager(&mut self) {
        self.taskman_entries += 1;
    }

    fn wait_for_tick(&mut self) {
        self.parks += 1;
        if Some(self.parks) == self.park_limit {
            panic!("parked {} times without a reschedule", self.parks);
        }
    }

    fn report_fatal(&mut self, msg: &str) -> ! {
        panic!("fatal: {}", msg);
    }
}
