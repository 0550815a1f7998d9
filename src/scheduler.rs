//! # Process Scheduler
//!
//! Owns the fixed process table, the currently running id, the nestable
//! critical-section guard and the active scheduling strategy. The
//! periodic timer event is the sole preemption point: the arch port
//! forwards it to [`Scheduler::dispatch`], which runs the full
//! context-switch protocol.
//!
//! ## Context-switch protocol
//!
//! 1. Persist the interrupted process's context and record its stack
//!    checksum
//! 2. Poll the input collaborator; the reserved key combination hands
//!    control to the external task manager before scheduling continues
//! 3. Demote the interrupted process from Running to Ready (unless its
//!    slot was freed meanwhile)
//! 4. Ask the active strategy for the next process id
//! 5. Verify the chosen process's stack checksum — a mismatch is fatal
//! 6. Mark the choice Running and hand its context back for resume
//!
//! Boot is the one exception: [`Scheduler::start`] dispatches the idle
//! process directly without going through the tick path.

use crate::arch::{Platform, SavedContext};
use crate::config::{DEFAULT_PRIORITY, MAX_PROCESSES, STACK_SIZE, TASKMAN_KEYS};
use crate::process::{Priority, Process, ProcessId, ProcessState, Program};
use crate::strategy::{SchedulingInfo, SchedulingStrategy};
use crate::sync::CriticalSection;

/// Recoverable failures of [`Scheduler::exec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// Every non-idle slot of the process table is occupied.
    NoFreeSlot,
    /// No program was supplied.
    NullProgram,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The central scheduler state: process table, current id, strategy and
/// guard. One instance per kernel; no ambient globals in the core.
pub struct Scheduler {
    /// Fixed process table. Slot 0 is reserved for the idle process.
    processes: [Process; MAX_PROCESSES],

    /// Id of the currently executing process.
    current: ProcessId,

    /// Active next-process-selection algorithm.
    strategy: SchedulingStrategy,

    /// Auxiliary state of the stateful strategies.
    pub(crate) info: SchedulingInfo,

    /// Nestable critical-section guard gating the scheduler tick.
    pub(crate) critical: CriticalSection,

    /// Monotonic count of completed context switches. The self-kill
    /// path polls it to observe that a reschedule has actually
    /// happened.
    switch_epoch: u32,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            processes: [Process::EMPTY; MAX_PROCESSES],
            current: 0,
            strategy: SchedulingStrategy::Even,
            info: SchedulingInfo::new(),
            critical: CriticalSection::new(),
            switch_epoch: 0,
        }
    }

    /// Install the idle process in slot 0. Must run before the first
    /// `exec`; the idle process never terminates and only occupies the
    /// CPU when nothing else is ready.
    pub fn init(&mut self, platform: &mut dyn Platform, idle: Program) {
        let slot = &mut self.processes[0];
        *slot = Process::EMPTY;
        slot.program = Some(idle);
        slot.priority = DEFAULT_PRIORITY;
        slot.state = ProcessState::Ready;
        slot.context = platform.init_context(&mut slot.stack);
        slot.checksum = slot.stack_checksum();
    }

    // -- accessors ----------------------------------------------------------

    /// Id of the currently executing process.
    #[inline]
    pub fn current_process(&self) -> ProcessId {
        self.current
    }

    /// Read/write handle to a process table slot.
    pub fn process_slot(&mut self, pid: ProcessId) -> &mut Process {
        &mut self.processes[pid as usize]
    }

    /// The active scheduling strategy.
    pub fn strategy(&self) -> SchedulingStrategy {
        self.strategy
    }

    /// Switch the scheduling strategy, resetting its per-strategy
    /// state.
    pub fn set_strategy(&mut self, strategy: SchedulingStrategy) {
        self.strategy = strategy;
        self.info.reset_for(strategy, &self.processes, self.current);
    }

    /// Number of completed context switches so far.
    #[inline]
    pub fn switch_epoch(&self) -> u32 {
        self.switch_epoch
    }

    /// Volatile read of the switch counter, for spin loops that wait on
    /// a reschedule performed by the tick interrupt.
    pub fn switch_epoch_volatile(&self) -> u32 {
        // The counter changes from interrupt context; keep the load in
        // the loop.
        unsafe { core::ptr::read_volatile(&self.switch_epoch) }
    }

    /// Open a critical section (see [`CriticalSection::enter`]).
    pub fn enter_critical(&mut self, platform: &mut dyn Platform) {
        self.critical.enter(platform);
    }

    /// Close a critical section (see [`CriticalSection::leave`]).
    pub fn leave_critical(&mut self, platform: &mut dyn Platform) {
        self.critical.leave(platform);
    }

    // -- exec ---------------------------------------------------------------

    /// Start `program` in the first unused slot with the given
    /// priority.
    ///
    /// The slot gets a fresh stack image so that the first dispatch
    /// lands in the port's trampoline, which invokes the program and
    /// kills the process when it returns. Slot 0 is never considered;
    /// it belongs to idle.
    ///
    /// # Returns
    /// - `Ok(pid)` — the claimed slot
    /// - `Err(NoFreeSlot)` — the table is full
    /// - `Err(NullProgram)` — no program was supplied
    pub fn exec(
        &mut self,
        platform: &mut dyn Platform,
        program: Option<Program>,
        priority: Priority,
    ) -> Result<ProcessId, ExecError> {
        self.critical.enter(platform);
        let result = self.exec_locked(platform, program, priority);
        self.critical.leave(platform);
        result
    }

    fn exec_locked(
        &mut self,
        platform: &mut dyn Platform,
        program: Option<Program>,
        priority: Priority,
    ) -> Result<ProcessId, ExecError> {
        let program = program.ok_or(ExecError::NullProgram)?;
        let pid = (1..MAX_PROCESSES)
            .find(|&id| self.processes[id].state == ProcessState::Unused)
            .ok_or(ExecError::NoFreeSlot)? as ProcessId;

        let slot = &mut self.processes[pid as usize];
        slot.program = Some(program);
        slot.priority = priority;
        slot.state = ProcessState::Ready;
        slot.stack = [0; STACK_SIZE];
        slot.context = platform.init_context(&mut slot.stack);
        slot.checksum = slot.stack_checksum();

        self.info.reset_process(pid);
        Ok(pid)
    }

    // -- kill ---------------------------------------------------------------

    /// Destroy the process in slot `pid`, marking it unused.
    ///
    /// Fails for out-of-range ids and for the idle slot. When a process
    /// kills itself it may die holding nested critical sections, so the
    /// nesting depth is collapsed before the final leave brings the
    /// tick back. The caller (kernel facade) is responsible for, on
    /// self-kill, blocking until the next reschedule buries the caller.
    ///
    /// # Returns
    /// `true` when the slot was released.
    pub fn kill(&mut self, platform: &mut dyn Platform, pid: ProcessId) -> bool {
        self.kill_with(platform, pid, |_| {})
    }

    /// Like [`kill`](Scheduler::kill) but runs `reclaim` on the victim
    /// id inside the same critical window as the slot teardown, before
    /// any nesting collapse. The kernel facade uses this to garbage
    /// collect the victim's heap allocations while the tick cannot
    /// deschedule the slot mid-teardown.
    pub fn kill_with(
        &mut self,
        platform: &mut dyn Platform,
        pid: ProcessId,
        reclaim: impl FnOnce(ProcessId),
    ) -> bool {
        if pid == 0 || pid as usize >= MAX_PROCESSES {
            return false;
        }
        self.critical.enter(platform);
        self.processes[pid as usize].state = ProcessState::Unused;
        self.processes[pid as usize].program = None;
        reclaim(pid);
        if pid == self.current {
            self.critical.collapse_to_one();
        }
        self.critical.leave(platform);
        true
    }

    // -- context switch -----------------------------------------------------

    /// Boot entry: dispatch the idle process directly, without the tick
    /// path.
    ///
    /// # Returns
    /// Idle's context, for the arch port to install.
    pub fn start(&mut self) -> SavedContext {
        self.current = 0;
        self.processes[0].state = ProcessState::Running;
        self.switch_epoch = self.switch_epoch.wrapping_add(1);
        self.processes[0].context
    }

    /// The context-switch protocol, invoked by the periodic timer
    /// event.
    ///
    /// # Parameters
    /// - `suspended`: the interrupted process's captured context
    ///
    /// # Returns
    /// The context of the process to resume.
    pub fn dispatch(
        &mut self,
        platform: &mut dyn Platform,
        suspended: SavedContext,
    ) -> SavedContext {
        // 1. Persist the interrupted context and its integrity digest.
        let cur = self.current as usize;
        self.processes[cur].context = suspended;
        self.processes[cur].checksum = self.processes[cur].stack_checksum();

        // 2. Reserved key combination suspends normal scheduling.
        if platform.input_mask() == TASKMAN_KEYS {
            platform.enter_task_manager();
        }

        // 3. The interrupted process goes back to the ready set.
        if self.processes[cur].state != ProcessState::Unused {
            self.processes[cur].state = ProcessState::Ready;
        }

        // 4. Strategy decides who runs next.
        let next = self
            .strategy
            .select(&self.processes, &mut self.info, self.current);

        // 5. A suspended stack that no longer matches its digest was
        //    corrupted; resuming it would be undefined behaviour.
        let slot = &self.processes[next as usize];
        if slot.checksum != slot.stack_checksum() {
            platform.report_fatal("stack checksum mismatch");
        }

        // 6. Hand over the CPU.
        self.processes[next as usize].state = ProcessState::Running;
        self.current = next;
        self.switch_epoch = self.switch_epoch.wrapping_add(1);
        self.processes[next as usize].context
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
