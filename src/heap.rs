//! # Heap Descriptor
//!
//! One [`Heap`] per backing store. The driver's address range is split
//! into a *map region* holding one 4-bit entry per use-region byte, and
//! a *use region* twice the map's size holding the bytes processes
//! actually get.
//!
//! ```text
//! driver range:  [ map region | use region                ]
//!                  map_size     use_size == 2 * map_size
//! ```
//!
//! ## Map encoding
//!
//! Two entries pack into each map byte, the even unit in the high
//! nibble. `0x0` is free, `0xF` marks a continuation byte of some chunk,
//! and `1..=14` is the owning process id stored once at the chunk head.
//! This layout is persisted state in the backing store and must stay
//! bit-exact for external inspection tooling.
//!
//! Inside the crate the packed form is confined to [`Heap::tag_at`] and
//! [`Heap::set_tag`]; everything above them works on a logical sequence
//! of unit tags, keeping the coalescing and bounding-box logic free of
//! parity arithmetic.

use crate::config::MAX_PROCESSES;
use crate::fit::AllocStrategy;
use crate::process::ProcessId;
use crate::storage::StorageDriver;

/// A storage address.
pub type MemAddr = u16;

/// A storage byte.
pub type MemValue = u8;

/// Map nibble marking a non-head byte of a chunk.
const CONTINUATION: u8 = 0xF;

/// Sentinel unit index for an empty allocation frame.
const UNIT_NONE: u16 = u16::MAX;

// ---------------------------------------------------------------------------
// Logical map entries
// ---------------------------------------------------------------------------

/// Decoded state of one use-region byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapTag {
    /// The byte is unallocated.
    Free,
    /// The byte belongs to a chunk but is not its first byte.
    Continuation,
    /// The byte is the first byte of a chunk owned by this process.
    Owner(ProcessId),
}

impl MapTag {
    fn encode(self) -> u8 {
        match self {
            MapTag::Free => 0,
            MapTag::Continuation => CONTINUATION,
            MapTag::Owner(pid) => pid,
        }
    }

    fn decode(nibble: u8) -> MapTag {
        match nibble {
            0 => MapTag::Free,
            CONTINUATION => MapTag::Continuation,
            pid => MapTag::Owner(pid),
        }
    }
}

// ---------------------------------------------------------------------------
// Per-process allocation frame
// ---------------------------------------------------------------------------

/// Bounding box over the units a process's live chunks can occupy.
///
/// A conservative hint used to bound garbage-collection scans: every
/// live chunk owned by the process lies within `[first, last]`, though
/// the bound may be wider after frees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocFrame {
    pub first: u16,
    pub last: u16,
}

impl AllocFrame {
    pub const EMPTY: AllocFrame = AllocFrame {
        first: UNIT_NONE,
        last: 0,
    };

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.first == UNIT_NONE
    }

    /// Widen the frame to cover `[first, last]`.
    pub fn cover(&mut self, first: u16, last: u16) {
        if self.is_empty() {
            *self = AllocFrame { first, last };
        } else {
            self.first = self.first.min(first);
            self.last = self.last.max(last);
        }
    }
}

// ---------------------------------------------------------------------------
// Heap
// ---------------------------------------------------------------------------

/// A managed heap over one byte-storage driver. The heap borrows the
/// driver; it never owns the transport.
pub struct Heap<'d> {
    driver: &'d mut dyn StorageDriver,
    map_start: MemAddr,
    map_size: usize,
    use_start: MemAddr,
    use_size: usize,
    strategy: AllocStrategy,
    /// Last placement point, consulted by the next-fit strategy only.
    pub(crate) next_fit_cursor: usize,
    name: &'static str,
    frames: [AllocFrame; MAX_PROCESSES],
}

impl<'d> Heap<'d> {
    /// Lay a heap over the driver's whole address range: one third map,
    /// two thirds use region.
    pub fn new(driver: &'d mut dyn StorageDriver, name: &'static str) -> Heap<'d> {
        let map_start = driver.first_addr();
        let map_size = driver.size() / 3;
        Heap {
            map_start,
            map_size,
            use_start: map_start + map_size as MemAddr,
            use_size: 2 * map_size,
            strategy: AllocStrategy::FirstFit,
            next_fit_cursor: 0,
            name,
            frames: [AllocFrame::EMPTY; MAX_PROCESSES],
            driver,
        }
    }

    /// Zero the map region, marking the whole use region free, and reset
    /// the per-process bookkeeping.
    pub fn init(&mut self) {
        for i in 0..self.map_size {
            self.driver.write(self.map_start + i as MemAddr, 0x00);
        }
        self.frames = [AllocFrame::EMPTY; MAX_PROCESSES];
        self.next_fit_cursor = 0;
    }

    // -- query surface ------------------------------------------------------

    /// Diagnostic label.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// First address of the map region.
    pub fn map_start(&self) -> MemAddr {
        self.map_start
    }

    /// Size of the map region in bytes.
    pub fn map_size(&self) -> usize {
        self.map_size
    }

    /// First address of the use region.
    pub fn use_start(&self) -> MemAddr {
        self.use_start
    }

    /// Size of the use region in bytes.
    pub fn use_size(&self) -> usize {
        self.use_size
    }

    /// Raw packed map byte at `addr` (a map-region address).
    pub fn map_entry(&mut self, addr: MemAddr) -> MemValue {
        self.driver.read(addr)
    }

    /// Active fit strategy.
    pub fn strategy(&self) -> AllocStrategy {
        self.strategy
    }

    /// Switch the fit strategy at runtime.
    pub fn set_strategy(&mut self, strategy: AllocStrategy) {
        self.strategy = strategy;
    }

    /// Allocation frame recorded for `pid`.
    pub fn frame(&self, pid: ProcessId) -> AllocFrame {
        self.frames[pid as usize]
    }

    pub(crate) fn frame_mut(&mut self, pid: ProcessId) -> &mut AllocFrame {
        &mut self.frames[pid as usize]
    }

    // -- unit/address conversion --------------------------------------------

    /// Unit index of a use-region address.
    #[inline]
    pub(crate) fn unit_of(&self, addr: MemAddr) -> usize {
        debug_assert!(self.contains(addr));
        (addr - self.use_start) as usize
    }

    /// Use-region address of a unit index.
    #[inline]
    pub(crate) fn addr_of(&self, unit: usize) -> MemAddr {
        self.use_start + unit as MemAddr
    }

    /// Whether `addr` lies inside the use region.
    #[inline]
    pub(crate) fn contains(&self, addr: MemAddr) -> bool {
        addr >= self.use_start && ((addr - self.use_start) as usize) < self.use_size
    }

    // -- packed map access --------------------------------------------------

    /// Decode the map entry of one use-region unit.
    pub(crate) fn tag_at(&mut self, unit: usize) -> MapTag {
        debug_assert!(unit < self.use_size);
        let byte = self.driver.read(self.map_start + (unit / 2) as MemAddr);
        let nibble = if unit % 2 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        };
        MapTag::decode(nibble)
    }

    /// Encode one unit's map entry, preserving its packing sibling.
    pub(crate) fn set_tag(&mut self, unit: usize, tag: MapTag) {
        debug_assert!(unit < self.use_size);
        let addr = self.map_start + (unit / 2) as MemAddr;
        let byte = self.driver.read(addr);
        let byte = if unit % 2 == 0 {
            (byte & 0x0F) | (tag.encode() << 4)
        } else {
            (byte & 0xF0) | tag.encode()
        };
        self.driver.write(addr, byte);
    }

    // -- chunk geometry -----------------------------------------------------

    /// Head unit of the chunk containing `unit`: walk backward while the
    /// entries read as continuations. For a free unit this returns the
    /// unit itself.
    pub(crate) fn chunk_head(&mut self, mut unit: usize) -> usize {
        while unit > 0 && self.tag_at(unit) == MapTag::Continuation {
            unit -= 1;
        }
        unit
    }

    /// Length in units of the chunk whose head is `head`. Zero when the
    /// head unit is free.
    pub(crate) fn chunk_len(&mut self, head: usize) -> usize {
        if self.tag_at(head) == MapTag::Free {
            return 0;
        }
        let mut unit = head + 1;
        while unit < self.use_size && self.tag_at(unit) == MapTag::Continuation {
            unit += 1;
        }
        unit - head
    }

    /// Address of the first byte of the chunk containing `addr`.
    pub fn first_byte_of_chunk(&mut self, addr: MemAddr) -> MemAddr {
        let head = self.chunk_head(self.unit_of(addr));
        self.addr_of(head)
    }

    /// Size in bytes of the chunk containing `addr`; zero for a free
    /// address.
    pub fn chunk_size(&mut self, addr: MemAddr) -> usize {
        let head = self.chunk_head(self.unit_of(addr));
        self.chunk_len(head)
    }

    /// Length of the free run starting at `unit` (zero when `unit` is
    /// allocated).
    pub(crate) fn free_run_at(&mut self, unit: usize) -> usize {
        let mut end = unit;
        while end < self.use_size && self.tag_at(end) == MapTag::Free {
            end += 1;
        }
        end - unit
    }

    // -- data movement ------------------------------------------------------

    /// Copy `len` use-region bytes from unit `src` to unit `dst`.
    /// Forward copy, so overlapping moves to lower units are safe.
    pub(crate) fn copy_units(&mut self, src: usize, dst: usize, len: usize) {
        debug_assert!(dst <= src);
        for i in 0..len {
            let value = self.driver.read(self.addr_of(src + i));
            self.driver.write(self.addr_of(dst + i), value);
        }
    }

    /// Read a use-region byte (process payload, not map metadata).
    pub fn read_byte(&mut self, addr: MemAddr) -> MemValue {
        debug_assert!(self.contains(addr));
        self.driver.read(addr)
    }

    /// Write a use-region byte (process payload, not map metadata).
    pub fn write_byte(&mut self, addr: MemAddr, value: MemValue) {
        debug_assert!(self.contains(addr));
        self.driver.write(addr, value);
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
