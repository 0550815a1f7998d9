//! # nibos — Nibble-map Operating System
//!
//! A small real-time kernel for single-core microcontrollers. nibos
//! multiplexes one CPU among a fixed table of processes and manages a
//! byte-addressable heap shared by those processes, with ownership
//! tracked at nibble granularity in a packed allocation map.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Application Processes                  │
//! ├────────────────────────────────────────────────────────┤
//! │               Kernel API (kernel.rs)                    │
//! │    init() · exec() · kill() · malloc() · free()        │
//! ├───────────────┬───────────────────┬────────────────────┤
//! │  Scheduler    │  Heap Allocator   │  Critical Section  │
//! │  scheduler.rs │  heap.rs          │  sync.rs           │
//! │  ─ dispatch() │  memory.rs        │  ─ enter()         │
//! │  ─ exec()     │  ─ malloc()       │  ─ leave()         │
//! │  ─ kill()     │  ─ realloc()      │                    │
//! ├───────────────┼───────────────────┼────────────────────┤
//! │  Scheduling   │  Fit Strategies   │  Storage Drivers   │
//! │  Strategies   │  fit.rs           │  storage.rs        │
//! │  strategy.rs  │  first/next/      │  direct / serial   │
//! │  even/random/ │  best/worst       │                    │
//! │  rr/aging/rtc │                   │                    │
//! ├───────────────┴───────────────────┴────────────────────┤
//! │              Process Model (process.rs)                 │
//! │    slot state machine · inline stack · checksum         │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch Port (arch/cortex_m4.rs)                │
//! │    PendSV · SysTick · Context Frames · Tick Gate        │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Allocation Map
//!
//! Each heap is split into a *map region* and a *use region* twice its
//! size. Every use-region byte has a 4-bit map entry, two packed per map
//! byte:
//!
//! | Nibble    | Meaning                                          |
//! |-----------|--------------------------------------------------|
//! | `0x0`     | free                                             |
//! | `1..=14`  | first byte of a chunk, owned by that process id  |
//! | `0xF`     | continuation of the chunk starting to its left   |
//!
//! The owner is stored once, at the chunk head, so freeing walks back to
//! the head and then forward over the continuation run.
//!
//! ## Memory Model
//!
//! - **No heap for the kernel itself**: all state is statically sized
//! - **Fixed process table**: `[Process; MAX_PROCESSES]`, slot 0 is idle
//! - **Per-process stack**: `[u8; STACK_SIZE]` inline in the slot
//! - **One lock**: a nestable critical section that gates the scheduler
//!   tick; every mutation of the process table or a heap map runs inside
//!   it
//!
//! ## Error Model
//!
//! Recoverable conditions are return values: `exec` yields
//! [`ExecError`](scheduler::ExecError), allocation failure is the `0`
//! address sentinel, a free by a non-owner is a silent no-op.
//! Unrecoverable conditions (stack checksum mismatch, critical-section
//! over/underflow) are routed once to
//! [`Platform::report_fatal`](arch::Platform::report_fatal) and the
//! system stops making progress.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod arch;
pub mod config;
pub mod fit;
pub mod heap;
pub mod kernel;
pub mod memory;
pub mod process;
pub mod scheduler;
pub mod storage;
pub mod strategy;
pub mod sync;
