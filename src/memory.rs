//! # Heap Allocator Operations
//!
//! `malloc` / `free` / `realloc` / per-process garbage collection on top
//! of the [`Heap`] descriptor. Placement is delegated to the heap's
//! active [fit strategy](crate::fit::AllocStrategy); this module owns
//! the map tagging, ownership checks, chunk coalescing and the
//! allocation-frame bookkeeping.
//!
//! All operations here assume they run inside a critical section; the
//! kernel facade wraps every call. Failure is never a panic: `malloc`
//! and `realloc` answer with the `0` address sentinel (no process may
//! legitimately own address 0), and a free or realloc by a non-owner is
//! a silent no-op by policy.

use crate::heap::{AllocFrame, Heap, MapTag, MemAddr};
use crate::process::ProcessId;

/// Largest process id a map nibble can carry (`0xF` is the continuation
/// marker).
const MAX_OWNER: ProcessId = 14;

impl Heap<'_> {
    // -----------------------------------------------------------------------
    // malloc
    // -----------------------------------------------------------------------

    /// Allocate `size` contiguous bytes owned by `owner`.
    ///
    /// The head unit is tagged with the owner id, the remainder with the
    /// continuation marker, and the owner's allocation frame widens to
    /// cover the chunk.
    ///
    /// # Returns
    /// The first use-region address of the chunk, or `0` when no run of
    /// `size` free units exists, `size` is zero or exceeds the use
    /// region, or `owner` cannot be encoded in a map nibble (the idle
    /// process may not own heap memory).
    pub fn malloc(&mut self, owner: ProcessId, size: usize) -> MemAddr {
        if owner == 0 || owner > MAX_OWNER || size == 0 || size > self.use_size() {
            return 0;
        }
        let head = match self.strategy().place(self, size) {
            Some(unit) => unit,
            None => return 0,
        };

        self.set_tag(head, MapTag::Owner(owner));
        for unit in head + 1..head + size {
            self.set_tag(unit, MapTag::Continuation);
        }
        let last = (head + size - 1) as u16;
        self.frame_mut(owner).cover(head as u16, last);

        self.addr_of(head)
    }

    // -----------------------------------------------------------------------
    // free
    // -----------------------------------------------------------------------

    /// Free the chunk containing `addr` on behalf of `owner`.
    ///
    /// Resolves `addr` to its chunk head; when the recorded owner does
    /// not match (or the address is free already), nothing happens.
    /// Otherwise the head and its continuation run are cleared and the
    /// owner's allocation frame is narrowed if the chunk sat at either
    /// extreme.
    pub fn free_as_owner(&mut self, addr: MemAddr, owner: ProcessId) {
        if !self.contains(addr) {
            debug_assert!(false, "free outside the use region");
            return;
        }
        let head = self.chunk_head(self.unit_of(addr));
        match self.tag_at(head) {
            MapTag::Owner(pid) if pid == owner => {}
            // Not ours (or not allocated): silent no-op by policy.
            _ => return,
        }

        let len = self.chunk_len(head);
        for unit in head..head + len {
            self.set_tag(unit, MapTag::Free);
        }

        let frame = self.frame(owner);
        if !frame.is_empty()
            && (head as u16 <= frame.first || (head + len - 1) as u16 >= frame.last)
        {
            self.recompute_frame(owner);
        }
    }

    // -----------------------------------------------------------------------
    // realloc
    // -----------------------------------------------------------------------

    /// Resize the chunk containing `addr` to `new_size` bytes on behalf
    /// of `owner`.
    ///
    /// Tries, in order: no-op for an unchanged size, in-place
    /// truncation, in-place growth into the following free run,
    /// relocation into the free run ending exactly at the chunk, and
    /// finally a fresh allocation plus copy plus free.
    ///
    /// # Returns
    /// The (possibly moved) chunk address, or `0` when the caller is not
    /// the owner or no placement exists anywhere.
    pub fn realloc(&mut self, addr: MemAddr, new_size: usize, owner: ProcessId) -> MemAddr {
        if !self.contains(addr) || new_size == 0 || new_size > self.use_size() {
            return 0;
        }
        let head = self.chunk_head(self.unit_of(addr));
        match self.tag_at(head) {
            MapTag::Owner(pid) if pid == owner => {}
            _ => return 0,
        }
        let cur = self.chunk_len(head);

        if new_size == cur {
            return self.addr_of(head);
        }

        // Shrink: truncate in place by freeing the trailing units.
        if new_size < cur {
            for unit in head + new_size..head + cur {
                self.set_tag(unit, MapTag::Free);
            }
            self.recompute_frame(owner);
            return self.addr_of(head);
        }

        // Grow in place into the immediately following free run.
        let after = if head + cur < self.use_size() {
            self.free_run_at(head + cur)
        } else {
            0
        };
        if cur + after >= new_size {
            for unit in head + cur..head + new_size {
                self.set_tag(unit, MapTag::Continuation);
            }
            self.frame_mut(owner).cover(head as u16, (head + new_size - 1) as u16);
            return self.addr_of(head);
        }

        // Slide left into the free run ending exactly at the chunk.
        let before = self.free_run_before(head);
        if before + cur + after >= new_size {
            let new_head = head - before;
            self.copy_units(head, new_head, cur);
            self.set_tag(new_head, MapTag::Owner(owner));
            for unit in new_head + 1..new_head + new_size {
                self.set_tag(unit, MapTag::Continuation);
            }
            for unit in new_head + new_size..head + cur {
                self.set_tag(unit, MapTag::Free);
            }
            self.frame_mut(owner)
                .cover(new_head as u16, (new_head + new_size - 1) as u16);
            self.recompute_frame(owner);
            return self.addr_of(new_head);
        }

        // Fall back to a fresh chunk elsewhere.
        let fresh = self.malloc(owner, new_size);
        if fresh == 0 {
            return 0;
        }
        let fresh_head = self.unit_of(fresh);
        for i in 0..cur {
            let value = self.read_byte(self.addr_of(head + i));
            self.write_byte(self.addr_of(fresh_head + i), value);
        }
        self.free_as_owner(self.addr_of(head), owner);
        fresh
    }

    /// Length of the free run ending exactly at `head` (scanning
    /// backward).
    fn free_run_before(&mut self, head: usize) -> usize {
        let mut first = head;
        while first > 0 && self.tag_at(first - 1) == MapTag::Free {
            first -= 1;
        }
        head - first
    }

    // -----------------------------------------------------------------------
    // Garbage collection
    // -----------------------------------------------------------------------

    /// Release every chunk owned by `pid`. Invoked when a process is
    /// killed; safe to call when the process owns nothing.
    ///
    /// The scan is bounded by the process's recorded allocation frame.
    /// The frame is maintained exactly (it is rescanned whenever a free
    /// narrows it), but it is treated as a hint only: tests verify the
    /// result against [`owned_units`](Heap::owned_units), which walks
    /// the whole map.
    pub fn free_process_memory(&mut self, pid: ProcessId) {
        let frame = self.frame(pid);
        if frame.is_empty() {
            return;
        }
        let mut unit = frame.first as usize;
        let end = (frame.last as usize).min(self.use_size() - 1);
        while unit <= end {
            if self.tag_at(unit) == MapTag::Owner(pid) {
                let len = self.chunk_len(unit);
                for u in unit..unit + len {
                    self.set_tag(u, MapTag::Free);
                }
                unit += len;
            } else {
                unit += 1;
            }
        }
        *self.frame_mut(pid) = AllocFrame::EMPTY;
    }

    /// Recompute `pid`'s allocation frame by rescanning its current
    /// bounds for surviving chunks. Resets the frame to the empty
    /// sentinel when the last chunk is gone.
    fn recompute_frame(&mut self, pid: ProcessId) {
        let frame = self.frame(pid);
        if frame.is_empty() {
            return;
        }
        let end = (frame.last as usize).min(self.use_size() - 1);
        let mut new_frame = AllocFrame::EMPTY;
        let mut unit = frame.first as usize;
        while unit <= end {
            if self.tag_at(unit) == MapTag::Owner(pid) {
                let len = self.chunk_len(unit);
                new_frame.cover(unit as u16, (unit + len - 1) as u16);
                unit += len;
            } else {
                unit += 1;
            }
        }
        *self.frame_mut(pid) = new_frame;
    }

    /// Number of use-region units owned by `pid`, found by walking the
    /// entire map (head nibbles plus their continuation runs). This is
    /// the full-heap fallback the allocation frame is checked against.
    pub fn owned_units(&mut self, pid: ProcessId) -> usize {
        let mut total = 0;
        let mut unit = 0;
        while unit < self.use_size() {
            if self.tag_at(unit) == MapTag::Owner(pid) {
                let len = self.chunk_len(unit);
                total += len;
                unit += len;
            } else {
                unit += 1;
            }
        }
        total
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SliceStorage;

    const PID: ProcessId = 1;
    const OTHER: ProcessId = 2;

    fn with_heap<R>(f: impl FnOnce(&mut Heap<'_>) -> R) -> R {
        let mut mem = [0u8; 96]; // 32-byte map, 64-unit use region
        let mut drv = SliceStorage::new(0, &mut mem);
        let mut heap = Heap::new(&mut drv, "test");
        heap.init();
        f(&mut heap)
    }

    fn map_is_clean(heap: &mut Heap<'_>) -> bool {
        (0..heap.map_size()).all(|i| heap.map_entry(heap.map_start() + i as MemAddr) == 0)
    }

    #[test]
    fn paired_mallocs_and_frees_leave_a_clean_map() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 7);
            let b = heap.malloc(OTHER, 3);
            let c = heap.malloc(PID, 12);
            assert!(a != 0 && b != 0 && c != 0);

            heap.free_as_owner(b, OTHER);
            heap.free_as_owner(a, PID);
            heap.free_as_owner(c, PID);
            assert!(map_is_clean(heap));
            assert!(heap.frame(PID).is_empty());
            assert!(heap.frame(OTHER).is_empty());
        });
    }

    #[test]
    fn chunks_never_overlap_and_map_back_to_their_head() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 5);
            let b = heap.malloc(OTHER, 9);
            let c = heap.malloc(PID, 1);
            assert_eq!(heap.chunk_size(a), 5);
            assert_eq!(heap.chunk_size(b), 9);
            assert_eq!(heap.chunk_size(c), 1);

            // Every allocated byte resolves to exactly one chunk head.
            for offset in 0..9 {
                assert_eq!(heap.first_byte_of_chunk(b + offset), b);
            }
            assert_eq!(heap.owned_units(PID), 6);
            assert_eq!(heap.owned_units(OTHER), 9);
        });
    }

    #[test]
    fn overallocation_fails_for_every_strategy() {
        use crate::fit::AllocStrategy::*;
        with_heap(|heap| {
            let over = heap.use_size() + 1;
            for strategy in [FirstFit, NextFit, BestFit, WorstFit] {
                heap.set_strategy(strategy);
                assert_eq!(heap.malloc(PID, over), 0);
                assert_eq!(heap.malloc(PID, 0), 0);
            }
            assert!(map_is_clean(heap));
        });
    }

    #[test]
    fn idle_process_may_not_own_memory() {
        with_heap(|heap| {
            assert_eq!(heap.malloc(0, 4), 0);
            assert_eq!(heap.malloc(15, 4), 0);
            assert!(map_is_clean(heap));
        });
    }

    #[test]
    fn free_by_non_owner_is_a_silent_no_op() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 6);
            heap.free_as_owner(a, OTHER);
            assert_eq!(heap.chunk_size(a), 6, "chunk must survive");
            heap.free_as_owner(a + 3, OTHER);
            assert_eq!(heap.chunk_size(a), 6);

            // Freeing an already-free address changes nothing either.
            heap.free_as_owner(a + 20, PID);
            assert_eq!(heap.owned_units(PID), 6);
        });
    }

    #[test]
    fn free_resolves_interior_addresses_to_the_head() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 8);
            heap.free_as_owner(a + 5, PID);
            assert!(map_is_clean(heap));
        });
    }

    #[test]
    fn freeing_coalesces_with_neighbouring_holes() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 4);
            let b = heap.malloc(PID, 4);
            let c = heap.malloc(PID, 4);
            heap.free_as_owner(a, PID);
            heap.free_as_owner(c, PID);
            heap.free_as_owner(b, PID);

            // One merged run: a 12-unit request fits at the start again.
            heap.set_strategy(crate::fit::AllocStrategy::BestFit);
            assert_eq!(heap.malloc(PID, 12), a);
        });
    }

    #[test]
    fn frame_narrows_when_extreme_chunks_are_freed() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 4); // units 0..4
            let b = heap.malloc(PID, 4); // units 4..8
            let c = heap.malloc(PID, 4); // units 8..12
            assert_eq!(heap.frame(PID), AllocFrame { first: 0, last: 11 });

            heap.free_as_owner(a, PID);
            assert_eq!(heap.frame(PID), AllocFrame { first: 4, last: 11 });
            heap.free_as_owner(c, PID);
            assert_eq!(heap.frame(PID), AllocFrame { first: 4, last: 7 });
            heap.free_as_owner(b, PID);
            assert!(heap.frame(PID).is_empty());
        });
    }

    #[test]
    fn realloc_same_size_is_a_no_op() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 6);
            assert_eq!(heap.realloc(a, 6, PID), a);
            assert_eq!(heap.chunk_size(a), 6);
        });
    }

    #[test]
    fn realloc_shrinks_in_place() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 10);
            assert_eq!(heap.realloc(a, 4, PID), a);
            assert_eq!(heap.chunk_size(a), 4);
            assert_eq!(heap.frame(PID), AllocFrame { first: 0, last: 3 });
        });
    }

    #[test]
    fn realloc_grows_into_the_following_hole() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 4);
            assert_eq!(heap.realloc(a, 16, PID), a);
            assert_eq!(heap.chunk_size(a), 16);
        });
    }

    #[test]
    fn realloc_slides_left_into_the_preceding_hole() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 6);
            let b = heap.malloc(PID, 4);
            let fence = heap.malloc(OTHER, 54); // trailing space is gone
            assert_ne!(fence, 0);

            for i in 0..4 {
                heap.write_byte(b + i, 0x30 + i as u8);
            }
            heap.free_as_owner(a, PID);

            // b cannot grow forward; the 6-unit hole before it makes
            // room for 10 at the old chunk-a address.
            let moved = heap.realloc(b, 10, PID);
            assert_eq!(moved, a);
            assert_eq!(heap.chunk_size(moved), 10);
            for i in 0..4 {
                assert_eq!(heap.read_byte(moved + i), 0x30 + i as u8);
            }
        });
    }

    #[test]
    fn realloc_falls_back_to_relocation() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 4);
            let fence = heap.malloc(OTHER, 2); // pins a in place
            assert_ne!(fence, 0);
            for i in 0..4 {
                heap.write_byte(a + i, 0xA0 + i as u8);
            }

            let moved = heap.realloc(a, 12, PID);
            assert_ne!(moved, 0);
            assert_ne!(moved, a);
            assert_eq!(heap.chunk_size(moved), 12);
            for i in 0..4 {
                assert_eq!(heap.read_byte(moved + i), 0xA0 + i as u8);
            }
            // The original chunk is gone.
            assert_eq!(heap.owned_units(PID), 12);
        });
    }

    #[test]
    fn realloc_by_non_owner_fails_without_side_effects() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 6);
            assert_eq!(heap.realloc(a, 12, OTHER), 0);
            assert_eq!(heap.chunk_size(a), 6);
        });
    }

    #[test]
    fn realloc_returns_zero_when_nothing_fits() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 30);
            let b = heap.malloc(PID, 30);
            assert!(a != 0 && b != 0);
            assert_eq!(heap.realloc(a, 40, PID), 0);
            assert_eq!(heap.chunk_size(a), 30, "failed realloc must not move data");
        });
    }

    #[test]
    fn gc_reclaims_everything_a_process_owns() {
        with_heap(|heap| {
            let a = heap.malloc(PID, 5);
            let survivor = heap.malloc(OTHER, 4);
            let b = heap.malloc(PID, 9);
            assert!(a != 0 && b != 0 && survivor != 0);

            heap.free_process_memory(PID);
            assert_eq!(heap.owned_units(PID), 0);
            assert_eq!(heap.owned_units(OTHER), 4, "other owners untouched");
            assert!(heap.frame(PID).is_empty());

            // Idempotent, and safe for a process that owns nothing.
            heap.free_process_memory(PID);
            heap.free_process_memory(7);
        });
    }
}
