//! Evacuating garbage collector
//!
//! A collection runs in two phases:
//!
//! 1. **Mark**: tri-color marking from the roots (plus the whole old
//!    generation for a young collection) using a gray worklist.
//! 2. **Evacuate**: survivors are copied, in address order, to a fresh slot
//!    vector. Full collections trim each survivor first; young collections
//!    promote survivors to the old generation. A forwarding table then
//!    rewrites every reference held by survivors and roots.

use std::collections::VecDeque;
use std::time::Instant;

use crate::heap::{Heap, HeapSlot, Space, align_size};
use crate::object::{CellAddr, GcCell, Trace, Tracer};

/// Kind of collection to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    /// Collect the young generation only; survivors are promoted
    Young,
    /// Collect everything and trim survivors
    Full,
}

/// GC statistics
#[derive(Debug, Default, Clone)]
pub struct GcStats {
    /// Number of collections of either kind
    pub collections: u64,
    /// Number of young collections
    pub young_collections: u64,
    /// Total time spent in GC (nanoseconds)
    pub total_time_ns: u64,
    /// Total allocations
    pub allocations: u64,
    /// Bytes reclaimed in last collection (including trimmed bytes)
    pub last_reclaimed: usize,
    /// Objects marked in last collection
    pub last_marked: usize,
    /// Bytes given back by trimming in last collection
    pub last_trimmed: usize,
    /// Cells promoted to the old generation, over all collections
    pub promoted: u64,
}

/// Marking visitor: grays white cells and queues them
struct MarkTracer<'a> {
    base: u64,
    marked: &'a mut [bool],
    worklist: &'a mut VecDeque<usize>,
}

impl Tracer for MarkTracer<'_> {
    fn visit(&mut self, addr: &mut CellAddr) {
        let index = addr
            .raw()
            .checked_sub(self.base)
            .and_then(|i| usize::try_from(i).ok())
            .filter(|&i| i < self.marked.len());
        debug_assert!(index.is_some(), "dangling reference {addr:?} during marking");
        if let Some(index) = index
            && !self.marked[index]
        {
            self.marked[index] = true;
            self.worklist.push_back(index);
        }
    }
}

/// Rewrites references through the forwarding table
struct ForwardTracer<'a> {
    base: u64,
    forwarding: &'a [Option<CellAddr>],
}

impl Tracer for ForwardTracer<'_> {
    fn visit(&mut self, addr: &mut CellAddr) {
        let forwarded = addr
            .raw()
            .checked_sub(self.base)
            .and_then(|i| usize::try_from(i).ok())
            .and_then(|i| self.forwarding.get(i).copied().flatten());
        debug_assert!(forwarded.is_some(), "reference {addr:?} to a dead cell");
        if let Some(new_addr) = forwarded {
            *addr = new_addr;
        }
    }
}

impl<C: GcCell> Heap<C> {
    /// Run a full GC cycle.
    ///
    /// Every cell reachable from `roots` survives at a new address and
    /// `roots` is rewritten accordingly. Returns the bytes reclaimed.
    pub fn collect(&mut self, roots: &mut dyn Trace) -> usize {
        self.run(roots, CollectionKind::Full)
    }

    /// Run a young generation collection (minor GC)
    ///
    /// The whole old generation is treated as live and scanned for references
    /// into the young generation.
    pub fn collect_young(&mut self, roots: &mut dyn Trace) -> usize {
        self.run(roots, CollectionKind::Young)
    }

    /// Run a collection of the given kind
    pub fn run(&mut self, roots: &mut dyn Trace, kind: CollectionKind) -> usize {
        let start = Instant::now();

        let marked = self.mark(roots, kind);
        let reclaimed = self.evacuate(roots, &marked, kind);

        self.stats.collections += 1;
        if kind == CollectionKind::Young {
            self.stats.young_collections += 1;
        }
        self.stats.total_time_ns += start.elapsed().as_nanos() as u64;
        self.stats.last_reclaimed = reclaimed;

        #[cfg(feature = "gc_logging")]
        tracing::debug!(
            ?kind,
            marked = self.stats.last_marked,
            reclaimed,
            trimmed = self.stats.last_trimmed,
            live_bytes = self.allocated,
            "gc cycle finished"
        );

        reclaimed
    }

    /// Mark phase - trace from roots
    fn mark(&mut self, roots: &mut dyn Trace, kind: CollectionKind) -> Vec<bool> {
        let mut marked = vec![false; self.slots.len()];
        let mut worklist = VecDeque::new();

        if kind == CollectionKind::Young {
            for (index, slot) in self.slots.iter().enumerate() {
                if slot.space == Space::Old {
                    marked[index] = true;
                    worklist.push_back(index);
                }
            }
        }

        let mut tracer = MarkTracer {
            base: self.base,
            marked: &mut marked,
            worklist: &mut worklist,
        };
        roots.trace(&mut tracer);

        let mut count = 0;
        while let Some(index) = tracer.worklist.pop_front() {
            self.slots[index].cell.trace(&mut tracer);
            count += 1;
        }

        self.stats.last_marked = count;
        marked
    }

    /// Evacuate phase - copy survivors, drop the rest, rewrite references
    fn evacuate(&mut self, roots: &mut dyn Trace, marked: &[bool], kind: CollectionKind) -> usize {
        let old_base = self.base;
        let new_base = old_base + self.slots.len() as u64;
        let old_slots = std::mem::take(&mut self.slots);

        let mut forwarding = vec![None; old_slots.len()];
        let mut survivors: Vec<HeapSlot<C>> = Vec::with_capacity(self.stats.last_marked);
        let mut reclaimed = 0;
        let mut trimmed = 0;

        for (index, mut slot) in old_slots.into_iter().enumerate() {
            if !marked[index] {
                reclaimed += slot.size;
                continue;
            }

            match kind {
                CollectionKind::Full => {
                    let size = align_size(slot.cell.trim());
                    if size < slot.size {
                        trimmed += slot.size - size;
                        slot.size = size;
                    }
                }
                CollectionKind::Young => {
                    if slot.space == Space::Young {
                        slot.space = Space::Old;
                        self.stats.promoted += 1;
                    }
                }
            }

            forwarding[index] = Some(CellAddr::from_raw(new_base + survivors.len() as u64));
            survivors.push(slot);
        }

        let mut tracer = ForwardTracer {
            base: old_base,
            forwarding: &forwarding,
        };
        for slot in &mut survivors {
            slot.cell.trace(&mut tracer);
        }
        roots.trace(&mut tracer);

        self.slots = survivors;
        self.base = new_base;
        self.allocated -= reclaimed + trimmed;
        self.young_allocated = 0;
        self.stats.last_trimmed = trimmed;

        reclaimed + trimmed
    }
}
