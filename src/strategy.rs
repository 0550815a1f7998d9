//! # Scheduling Strategies
//!
//! Five interchangeable next-process-selection algorithms consulted by
//! the dispatcher at every tick. Each gets the full process table and
//! the previously-current id; id 0 (idle) is only returned when no other
//! slot is ready.
//!
//! | Strategy          | Per-strategy state        |
//! |-------------------|---------------------------|
//! | Even              | none                      |
//! | Random            | xorshift generator        |
//! | RoundRobin        | shared time-slice counter |
//! | InactiveAging     | per-process age array     |
//! | RunToCompletion   | none                      |
//!
//! The stateful strategies keep their state in [`SchedulingInfo`], which
//! is reset whenever the strategy is switched or a slot is reused.

use crate::config::MAX_PROCESSES;
use crate::process::{Process, ProcessId};

// ---------------------------------------------------------------------------
// Strategy set
// ---------------------------------------------------------------------------

/// Selection algorithm in use. Adding a strategy means adding a variant
/// and its `select` arm; the dispatcher's control flow never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// Strict slot-order rotation among ready processes.
    Even,
    /// Uniform draw among ready processes.
    Random,
    /// Priority-sized time slices, falling back to Even on expiry.
    RoundRobin,
    /// Age accumulation proportional to priority; oldest wins.
    InactiveAging,
    /// Keep the current process until it stops being ready.
    RunToCompletion,
}

impl SchedulingStrategy {
    /// Pick the next process to run.
    pub fn select(
        self,
        processes: &[Process; MAX_PROCESSES],
        info: &mut SchedulingInfo,
        current: ProcessId,
    ) -> ProcessId {
        match self {
            SchedulingStrategy::Even => select_even(processes, current),
            SchedulingStrategy::Random => select_random(processes, info),
            SchedulingStrategy::RoundRobin => select_round_robin(processes, info, current),
            SchedulingStrategy::InactiveAging => select_inactive_aging(processes, info, current),
            SchedulingStrategy::RunToCompletion => {
                select_run_to_completion(processes, current)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Per-strategy state
// ---------------------------------------------------------------------------

/// Auxiliary state for the stateful strategies, lifecycle tied to the
/// active strategy.
pub struct SchedulingInfo {
    /// Accumulated age per slot (InactiveAging). Ages are sums of
    /// priorities, so they need more than 8 bits.
    pub ages: [u16; MAX_PROCESSES],
    /// Remaining reselections of the current process (RoundRobin).
    pub time_slice: u8,
    /// Pseudo-random source for the Random strategy.
    rng: XorShift16,
}

impl SchedulingInfo {
    pub const fn new() -> Self {
        Self {
            ages: [0; MAX_PROCESSES],
            time_slice: 0,
            rng: XorShift16::new(0xACE1),
        }
    }

    /// Reset the state the given strategy relies on. Called when the
    /// scheduler switches strategies.
    pub fn reset_for(
        &mut self,
        strategy: SchedulingStrategy,
        processes: &[Process; MAX_PROCESSES],
        current: ProcessId,
    ) {
        match strategy {
            SchedulingStrategy::RoundRobin => {
                self.time_slice = processes[current as usize].priority;
            }
            SchedulingStrategy::InactiveAging => {
                self.ages = [0; MAX_PROCESSES];
            }
            _ => {}
        }
    }

    /// Clear leftover state of a slot that is being reused by a new
    /// process.
    pub fn reset_process(&mut self, id: ProcessId) {
        self.ages[id as usize] = 0;
    }
}

// ---------------------------------------------------------------------------
// Even
// ---------------------------------------------------------------------------

/// Rotate strictly in slot order starting just after `current`, skipping
/// non-ready slots and idle. Returns 0 when nothing is ready.
fn select_even(processes: &[Process; MAX_PROCESSES], current: ProcessId) -> ProcessId {
    if !processes[1..].iter().any(Process::is_ready) {
        return 0;
    }
    let mut id = current as usize;
    loop {
        id = if id >= MAX_PROCESSES - 1 { 1 } else { id + 1 };
        if processes[id].is_ready() {
            return id as ProcessId;
        }
    }
}

// ---------------------------------------------------------------------------
// Random
// ---------------------------------------------------------------------------

/// Draw a uniform index among the ready non-idle slots.
fn select_random(processes: &[Process; MAX_PROCESSES], info: &mut SchedulingInfo) -> ProcessId {
    let ready = processes[1..].iter().filter(|p| p.is_ready()).count() as u16;
    if ready == 0 {
        return 0;
    }
    let mut draw = info.rng.next() % ready;
    for (id, p) in processes.iter().enumerate().skip(1) {
        if p.is_ready() {
            if draw == 0 {
                return id as ProcessId;
            }
            draw -= 1;
        }
    }
    // Unreachable: the count above guarantees a hit.
    0
}

// ---------------------------------------------------------------------------
// RoundRobin
// ---------------------------------------------------------------------------

/// Keep reselecting the current process while its time slice lasts; on
/// expiry (or when it is no longer ready) fall back to Even and load the
/// slice with the newly selected process's priority.
///
/// A process of priority `k` is therefore reselected exactly `k`
/// consecutive times before Even is consulted again.
fn select_round_robin(
    processes: &[Process; MAX_PROCESSES],
    info: &mut SchedulingInfo,
    current: ProcessId,
) -> ProcessId {
    if info.time_slice > 0 && processes[current as usize].is_ready() {
        info.time_slice -= 1;
        return current;
    }
    let next = select_even(processes, current);
    info.time_slice = processes[next as usize].priority;
    next
}

// ---------------------------------------------------------------------------
// InactiveAging
// ---------------------------------------------------------------------------

/// Zero the current process's age, grow every ready process's age by its
/// priority, then pick the oldest. Ties go to the higher priority, then
/// to the lower id. The winner's age is zeroed after the increments,
/// before returning.
fn select_inactive_aging(
    processes: &[Process; MAX_PROCESSES],
    info: &mut SchedulingInfo,
    current: ProcessId,
) -> ProcessId {
    info.ages[current as usize] = 0;
    for (id, p) in processes.iter().enumerate().skip(1) {
        if p.is_ready() {
            info.ages[id] = info.ages[id].saturating_add(p.priority as u16);
        }
    }

    let mut next: usize = 0;
    for (id, p) in processes.iter().enumerate().skip(1) {
        if !p.is_ready() {
            continue;
        }
        if next == 0
            || info.ages[id] > info.ages[next]
            || (info.ages[id] == info.ages[next] && p.priority > processes[next].priority)
        {
            next = id;
        }
    }

    info.ages[next] = 0;
    next as ProcessId
}

// ---------------------------------------------------------------------------
// RunToCompletion
// ---------------------------------------------------------------------------

/// Return the current process unchanged while it remains ready; fall
/// back to Even otherwise. Idle gets no such stickiness: the dispatcher
/// marks it ready like any interrupted slot, so holding onto a current
/// id of 0 would starve every other ready process. Only real processes
/// run to completion.
fn select_run_to_completion(
    processes: &[Process; MAX_PROCESSES],
    current: ProcessId,
) -> ProcessId {
    if current != 0 && processes[current as usize].is_ready() {
        current
    } else {
        select_even(processes, current)
    }
}

// ---------------------------------------------------------------------------
// Pseudo-random source
// ---------------------------------------------------------------------------

/// 16-bit xorshift generator. Deterministic under test, cheap on a
/// microcontroller, and good enough for picking a ready slot.
struct XorShift16 {
    state: u16,
}

impl XorShift16 {
    const fn new(seed: u16) -> Self {
        // The all-zero state is absorbing; nudge it.
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    fn next(&mut self) -> u16 {
        let mut x = self.state;
        x ^= x << 7;
        x ^= x >> 9;
        x ^= x << 8;
        self.state = x;
        x
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
