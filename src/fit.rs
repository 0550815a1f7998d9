//! # Allocation Fit Strategies
//!
//! Four interchangeable placement algorithms consumed by the allocator.
//! Each takes a requested size in units and answers with the head unit
//! of a suitable free run, reading (and for next-fit, updating the
//! cursor of) the heap it is placing into.
//!
//! | Strategy | Scan                                               |
//! |----------|----------------------------------------------------|
//! | FirstFit | from unit 0, first run that fits                   |
//! | NextFit  | from the cached cursor, wrapping once to unit 0    |
//! | BestFit  | whole region, smallest run that still fits         |
//! | WorstFit | whole region, largest run that fits                |
//!
//! Ties in best/worst fit resolve to the first occurrence scanned.

use crate::heap::Heap;

/// Placement algorithm in use by a heap. Mutable at runtime via
/// [`Heap::set_strategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocStrategy {
    FirstFit,
    NextFit,
    BestFit,
    WorstFit,
}

impl AllocStrategy {
    /// Find a run of `size` contiguous free units.
    ///
    /// # Returns
    /// The head unit of the placement, or `None` when no run fits.
    pub(crate) fn place(self, heap: &mut Heap<'_>, size: usize) -> Option<usize> {
        match self {
            AllocStrategy::FirstFit => first_fit(heap, size, 0),
            AllocStrategy::NextFit => next_fit(heap, size),
            AllocStrategy::BestFit => best_fit(heap, size),
            AllocStrategy::WorstFit => worst_fit(heap, size),
        }
    }
}

/// Scan upward from `from`, returning the first free run of at least
/// `size` units.
fn first_fit(heap: &mut Heap<'_>, size: usize, from: usize) -> Option<usize> {
    if size == 0 || size > heap.use_size() {
        return None;
    }
    let mut unit = from;
    while unit < heap.use_size() {
        let run = heap.free_run_at(unit);
        if run >= size {
            return Some(unit);
        }
        // Skip the too-small run, or the allocated unit blocking us.
        unit += run.max(1);
    }
    None
}

/// First-fit scan starting at the heap's cached cursor, wrapping to unit
/// 0 when nothing fits before the end. A successful placement becomes
/// the new cursor.
fn next_fit(heap: &mut Heap<'_>, size: usize) -> Option<usize> {
    if size == 0 || size > heap.use_size() {
        return None;
    }
    let cursor = heap.next_fit_cursor.min(heap.use_size());
    let found = first_fit(heap, size, cursor).or_else(|| first_fit(heap, size, 0))?;
    heap.next_fit_cursor = found;
    Some(found)
}

/// Track every maximal free run; return the start of the smallest one
/// that still fits.
fn best_fit(heap: &mut Heap<'_>, size: usize) -> Option<usize> {
    if size == 0 || size > heap.use_size() {
        return None;
    }
    let mut best: Option<(usize, usize)> = None; // (start, len)
    scan_runs(heap, |start, len| {
        if len >= size && best.map_or(true, |(_, blen)| len < blen) {
            best = Some((start, len));
        }
    });
    best.map(|(start, _)| start)
}

/// Track every maximal free run; return the start of the largest one
/// that fits. Explicitly rejects empty and region-exceeding requests.
fn worst_fit(heap: &mut Heap<'_>, size: usize) -> Option<usize> {
    if size == 0 || size > heap.use_size() {
        return None;
    }
    let mut worst: Option<(usize, usize)> = None;
    scan_runs(heap, |start, len| {
        if len >= size && worst.map_or(true, |(_, wlen)| len > wlen) {
            worst = Some((start, len));
        }
    });
    worst.map(|(start, _)| start)
}

/// Visit every maximal free run in ascending unit order.
fn scan_runs(heap: &mut Heap<'_>, mut visit: impl FnMut(usize, usize)) {
    let mut unit = 0;
    while unit < heap.use_size() {
        let run = heap.free_run_at(unit);
        if run > 0 {
            visit(unit, run);
            unit += run;
        } else {
            unit += 1;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
