//! GC Heap management

use crate::collector::{CollectionKind, GcStats};
use crate::error::GcError;
use crate::object::{CellAddr, GcCell};

/// Allocation granularity in bytes
pub const HEAP_ALIGN: usize = 8;

/// Largest single allocation the heap accepts, in bytes
pub const MAX_ALLOCATION_SIZE: usize = (u32::MAX as usize) & !(HEAP_ALIGN - 1);

/// Round `size` up to the heap alignment
#[inline]
pub(crate) const fn align_size(size: usize) -> usize {
    (size + HEAP_ALIGN - 1) & !(HEAP_ALIGN - 1)
}

/// GC configuration
#[derive(Debug, Clone)]
pub struct GcConfig {
    /// Upper bound on live heap bytes (default: 256MB)
    pub heap_limit: usize,
    /// Young bytes allocated between young collections (default: 1MB)
    pub young_threshold: usize,
    /// Collect before every allocation. Makes every allocation site move
    /// every live cell, which flushes out unrooted references in tests.
    pub stress: bool,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            heap_limit: 256 * 1024 * 1024, // 256MB
            young_threshold: 1024 * 1024,  // 1MB
            stress: false,
        }
    }
}

impl GcConfig {
    /// Default configuration with stress collection enabled
    pub fn stress() -> Self {
        Self {
            stress: true,
            ..Self::default()
        }
    }
}

/// Generation a cell lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Space {
    /// Ordinary allocations
    Young,
    /// Long-lived allocations and promoted survivors
    Old,
}

/// A cell together with its bookkeeping
pub(crate) struct HeapSlot<C> {
    pub(crate) cell: C,
    pub(crate) space: Space,
    /// Aligned bytes charged to the heap for this cell
    pub(crate) size: usize,
}

/// Heap of cells of type `C`.
///
/// Cells live in `slots`; the cell at `slots[i]` has address `base + i`.
/// Collections evacuate survivors into a fresh slot vector whose base is past
/// every address handed out so far.
pub struct Heap<C> {
    pub(crate) config: GcConfig,
    pub(crate) slots: Vec<HeapSlot<C>>,
    pub(crate) base: u64,
    /// Total bytes charged to live cells
    pub(crate) allocated: usize,
    /// Young bytes allocated since the last collection
    pub(crate) young_allocated: usize,
    pub(crate) stats: GcStats,
}

impl<C: GcCell> Heap<C> {
    /// Create new heap with default config
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create new heap with custom config
    pub fn with_config(config: GcConfig) -> Self {
        Self {
            config,
            slots: Vec::new(),
            base: 0,
            allocated: 0,
            young_allocated: 0,
            stats: GcStats::default(),
        }
    }

    /// Get config
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Get current allocated bytes
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Number of cells in the heap, live or not yet collected
    pub fn cell_count(&self) -> usize {
        self.slots.len()
    }

    /// Get statistics
    pub fn stats(&self) -> &GcStats {
        &self.stats
    }

    /// Decide whether an allocation of `size` bytes should be preceded by a
    /// collection, and which kind.
    pub fn collection_needed(&self, size: usize) -> Option<CollectionKind> {
        let size = align_size(size);
        if self.config.stress || self.allocated + size > self.config.heap_limit {
            Some(CollectionKind::Full)
        } else if self.young_allocated + size > self.config.young_threshold {
            Some(CollectionKind::Young)
        } else {
            None
        }
    }

    /// Allocate `cell` in `space`.
    ///
    /// Never collects; callers run [`Heap::collect`] first when
    /// [`Heap::collection_needed`] says so.
    pub fn allocate(&mut self, cell: C, space: Space) -> Result<CellAddr, GcError> {
        let size = self.check_allocation(cell.allocation_size())?;

        let addr = CellAddr::from_raw(self.base + self.slots.len() as u64);
        self.slots.push(HeapSlot { cell, space, size });
        self.allocated += size;
        if space == Space::Young {
            self.young_allocated += size;
        }
        self.stats.allocations += 1;
        Ok(addr)
    }

    /// Check that `requested` bytes could be allocated right now.
    ///
    /// Returns the aligned size. Lets callers reject a request before
    /// building a large cell.
    pub fn check_allocation(&self, requested: usize) -> Result<usize, GcError> {
        if requested > MAX_ALLOCATION_SIZE {
            return Err(GcError::AllocationTooLarge {
                requested,
                max: MAX_ALLOCATION_SIZE,
            });
        }

        let size = align_size(requested);
        if self.allocated + size > self.config.heap_limit {
            return Err(GcError::OutOfMemory {
                requested: size,
                allocated: self.allocated,
                limit: self.config.heap_limit,
            });
        }
        Ok(size)
    }

    #[inline]
    fn index_of(&self, addr: CellAddr) -> Option<usize> {
        let index = addr.raw().checked_sub(self.base)?;
        let index = usize::try_from(index).ok()?;
        (index < self.slots.len()).then_some(index)
    }

    /// Whether `addr` names a cell currently in the heap
    pub fn contains(&self, addr: CellAddr) -> bool {
        self.index_of(addr).is_some()
    }

    /// Get the cell at `addr`, or `None` if the address is stale
    pub fn get(&self, addr: CellAddr) -> Option<&C> {
        self.index_of(addr).map(|i| &self.slots[i].cell)
    }

    /// Get the cell at `addr` mutably
    pub fn get_mut(&mut self, addr: CellAddr) -> Option<&mut C> {
        self.index_of(addr).map(|i| &mut self.slots[i].cell)
    }

    /// Borrow two distinct cells mutably at once
    pub fn get_pair_mut(&mut self, a: CellAddr, b: CellAddr) -> Option<(&mut C, &mut C)> {
        let ia = self.index_of(a)?;
        let ib = self.index_of(b)?;
        if ia == ib {
            return None;
        }
        if ia < ib {
            let (low, high) = self.slots.split_at_mut(ib);
            Some((&mut low[ia].cell, &mut high[0].cell))
        } else {
            let (low, high) = self.slots.split_at_mut(ia);
            Some((&mut high[0].cell, &mut low[ib].cell))
        }
    }

    /// Generation of the cell at `addr`
    pub fn space_of(&self, addr: CellAddr) -> Option<Space> {
        self.index_of(addr).map(|i| self.slots[i].space)
    }
}

impl<C: GcCell> Default for Heap<C> {
    fn default() -> Self {
        Self::new()
    }
}
