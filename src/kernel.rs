//! # Kernel Facade
//!
//! Couples a [`Scheduler`] with the concrete [`Platform`] and presents
//! the system-call surface programs use: spawning and killing
//! processes, allocating and releasing heap memory, and the tick entry
//! the arch port forwards the timer interrupt to.
//!
//! The facade is where the two halves of the system meet. The scheduler
//! knows nothing about heaps; the heaps know nothing about which
//! process is running. The kernel supplies the calling process's id to
//! every memory operation and runs heap garbage collection as part of
//! process teardown, all under the scheduler's critical-section guard.

use crate::arch::{Platform, SavedContext};
use crate::heap::{Heap, MemAddr, MemValue};
use crate::process::{Priority, ProcessId, Program};
use crate::scheduler::{ExecError, Scheduler};

/// The kernel: platform capability plus scheduler state.
///
/// Both fields are public so an arch port's interrupt glue can reach
/// the scheduler directly; programs should stick to the methods below.
pub struct Kernel<P: Platform> {
    pub platform: P,
    pub scheduler: Scheduler,
}

impl<P: Platform> Kernel<P> {
    pub const fn new(platform: P) -> Self {
        Self {
            platform,
            scheduler: Scheduler::new(),
        }
    }

    /// Install the idle program. Must run before [`start`](Kernel::start).
    pub fn init(&mut self, idle: Program) {
        self.scheduler.init(&mut self.platform, idle);
    }

    /// Boot: dispatch the idle process and return its context for the
    /// arch port to install as the first running context.
    pub fn start(&mut self) -> SavedContext {
        self.scheduler.start()
    }

    /// Timer-tick entry. The arch port calls this from the preemption
    /// interrupt with the interrupted context and installs the returned
    /// one.
    pub fn tick(&mut self, suspended: SavedContext) -> SavedContext {
        self.scheduler.dispatch(&mut self.platform, suspended)
    }

    // -- process management -------------------------------------------------

    /// Spawn `program` with the given priority.
    pub fn exec(
        &mut self,
        program: Option<Program>,
        priority: Priority,
    ) -> Result<ProcessId, ExecError> {
        self.scheduler.exec(&mut self.platform, program, priority)
    }

    /// Destroy the process `pid` and reclaim everything it owns on the
    /// given heaps.
    ///
    /// Slot teardown and garbage collection happen in one critical
    /// window, so the tick cannot deschedule a half-dismantled process.
    /// When a process kills itself the call never returns: once the
    /// guard drops, it parks until the tick buries it.
    ///
    /// # Returns
    /// `true` when the slot was released (unreachable on self-kill).
    pub fn kill(&mut self, pid: ProcessId, heaps: &mut [&mut Heap<'_>]) -> bool {
        let self_kill = pid == self.scheduler.current_process();
        let killed = self.scheduler.kill_with(&mut self.platform, pid, |victim| {
            for heap in heaps.iter_mut() {
                heap.free_process_memory(victim);
            }
        });
        if killed && self_kill {
            // The slot is gone; wait for the next reschedule, which
            // will never come back here.
            let epoch = self.scheduler.switch_epoch();
            while self.scheduler.switch_epoch_volatile() == epoch {
                self.platform.wait_for_tick();
            }
        }
        killed
    }

    // -- memory management --------------------------------------------------

    /// Allocate `size` bytes on `heap` for the calling process.
    ///
    /// # Returns
    /// Address of the first byte, or `0` on failure.
    pub fn malloc(&mut self, heap: &mut Heap<'_>, size: usize) -> MemAddr {
        self.scheduler.enter_critical(&mut self.platform);
        let addr = heap.malloc(self.scheduler.current_process(), size);
        self.scheduler.leave_critical(&mut self.platform);
        addr
    }

    /// Release the chunk containing `addr`, provided the calling
    /// process owns it. Foreign or unmapped addresses are ignored.
    pub fn free(&mut self, heap: &mut Heap<'_>, addr: MemAddr) {
        self.scheduler.enter_critical(&mut self.platform);
        heap.free_as_owner(addr, self.scheduler.current_process());
        self.scheduler.leave_critical(&mut self.platform);
    }

    /// Resize the calling process's chunk at `addr` to `new_size`
    /// bytes, preserving its payload.
    ///
    /// # Returns
    /// Address of the (possibly moved) chunk, or `0` on failure.
    pub fn realloc(&mut self, heap: &mut Heap<'_>, addr: MemAddr, new_size: usize) -> MemAddr {
        self.scheduler.enter_critical(&mut self.platform);
        let moved = heap.realloc(addr, new_size, self.scheduler.current_process());
        self.scheduler.leave_critical(&mut self.platform);
        moved
    }

    /// Read one byte of heap memory.
    pub fn read(&mut self, heap: &mut Heap<'_>, addr: MemAddr) -> MemValue {
        self.scheduler.enter_critical(&mut self.platform);
        let value = heap.read_byte(addr);
        self.scheduler.leave_critical(&mut self.platform);
        value
    }

    /// Write one byte of heap memory.
    pub fn write(&mut self, heap: &mut Heap<'_>, addr: MemAddr, value: MemValue) {
        self.scheduler.enter_critical(&mut self.platform);
        heap.write_byte(addr, value);
        self.scheduler.leave_critical(&mut self.platform);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::mock::MockPlatform;
    use crate::storage::{SliceStorage, StorageDriver};

    fn noop() {}

    fn booted() -> Kernel<MockPlatform> {
        let mut kernel = Kernel::new(MockPlatform::new());
        kernel.init(noop);
        kernel.start();
        kernel
    }

    /// Run `body` with a booted kernel and a fresh 96-byte heap
    /// (32 map units, 64 usable bytes).
    fn with_kernel(body: impl FnOnce(&mut Kernel<MockPlatform>, &mut Heap<'_>)) {
        let mut mem = [0u8; 96];
        let mut driver = SliceStorage::new(0, &mut mem);
        driver.init().unwrap();
        let mut heap = Heap::new(&mut driver, "intern");
        heap.init();
        let mut kernel = booted();
        body(&mut kernel, &mut heap);
    }

    fn run_as(kernel: &mut Kernel<MockPlatform>, pid: ProcessId) {
        // Dispatch until the wanted process holds the CPU.
        for _ in 0..crate::config::MAX_PROCESSES {
            if kernel.scheduler.current_process() == pid {
                return;
            }
            let ctx = SavedContext(0);
            kernel.tick(ctx);
        }
        assert_eq!(kernel.scheduler.current_process(), pid);
    }

    #[test]
    fn malloc_charges_the_calling_process() {
        with_kernel(|kernel, heap| {
            let pid = kernel.exec(Some(noop), 0).unwrap();
            run_as(kernel, pid);

            let addr = kernel.malloc(heap, 8);
            assert_ne!(addr, 0);
            assert_eq!(heap.owned_units(pid), 8);
            assert!(kernel.platform.tick_enabled);
        });
    }

    #[test]
    fn idle_cannot_allocate() {
        with_kernel(|kernel, heap| {
            assert_eq!(kernel.scheduler.current_process(), 0);
            assert_eq!(kernel.malloc(heap, 8), 0);
        });
    }

    #[test]
    fn free_ignores_foreign_chunks() {
        with_kernel(|kernel, heap| {
            let a = kernel.exec(Some(noop), 0).unwrap();
            let b = kernel.exec(Some(noop), 0).unwrap();

            run_as(kernel, a);
            let addr = kernel.malloc(heap, 8);
            assert_ne!(addr, 0);

            run_as(kernel, b);
            kernel.free(heap, addr);
            assert_eq!(heap.owned_units(a), 8, "b must not free a's chunk");

            run_as(kernel, a);
            kernel.free(heap, addr);
            assert_eq!(heap.owned_units(a), 0);
        });
    }

    #[test]
    fn realloc_acts_for_the_calling_process() {
        with_kernel(|kernel, heap| {
            let pid = kernel.exec(Some(noop), 0).unwrap();
            run_as(kernel, pid);

            let addr = kernel.malloc(heap, 4);
            kernel.write(heap, addr, 0x5A);
            let moved = kernel.realloc(heap, addr, 12);
            assert_ne!(moved, 0);
            assert_eq!(heap.owned_units(pid), 12);
            assert_eq!(kernel.read(heap, moved), 0x5A);
        });
    }

    #[test]
    fn kill_reclaims_memory_on_every_heap() {
        let mut mem_a = [0u8; 96];
        let mut mem_b = [0u8; 96];
        let mut drv_a = SliceStorage::new(0, &mut mem_a);
        let mut drv_b = SliceStorage::new(0x100, &mut mem_b);
        drv_a.init().unwrap();
        drv_b.init().unwrap();
        let mut heap_a = Heap::new(&mut drv_a, "intern");
        let mut heap_b = Heap::new(&mut drv_b, "extern");
        heap_a.init();
        heap_b.init();

        let mut kernel = booted();
        let pid = kernel.exec(Some(noop), 0).unwrap();
        run_as(&mut kernel, pid);
        assert_ne!(kernel.malloc(&mut heap_a, 10), 0);
        assert_ne!(kernel.malloc(&mut heap_b, 6), 0);

        // Kill from idle so the call returns.
        run_as(&mut kernel, 0);
        assert!(kernel.kill(pid, &mut [&mut heap_a, &mut heap_b]));
        assert_eq!(heap_a.owned_units(pid), 0);
        assert_eq!(heap_b.owned_units(pid), 0);
        assert!(kernel.platform.tick_enabled);
    }

    #[test]
    #[should_panic(expected = "without a reschedule")]
    fn self_kill_parks_until_a_reschedule_completes() {
        let mut kernel = booted();
        let pid = kernel.exec(Some(noop), 0).unwrap();
        run_as(&mut kernel, pid);

        // The slot is torn down, then the caller must park on the
        // switch epoch. Nothing advances the epoch here, so the loop
        // has to keep spinning (the mock bounds it) rather than let
        // the killed process run past its own kill.
        kernel.platform.park_limit = Some(3);
        kernel.kill(pid, &mut []);
        unreachable!("a self-killed process must not continue");
    }

    #[test]
    fn kill_of_invalid_id_leaves_heaps_alone() {
        with_kernel(|kernel, heap| {
            let pid = kernel.exec(Some(noop), 0).unwrap();
            run_as(kernel, pid);
            kernel.malloc(heap, 8);

            run_as(kernel, 0);
            assert!(!kernel.kill(0, &mut [&mut *heap]));
            assert_eq!(heap.owned_units(pid), 8);
        });
    }
}
