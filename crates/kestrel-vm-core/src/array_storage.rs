//! Resizable storage for JS values
//!
//! An `ArrayStorage` is a heap cell holding `capacity` value slots, of which
//! the first `size` are live. The capacity is fixed when the cell is
//! allocated; growing past it allocates a larger cell, copies, and rebinds
//! the caller's mutable handle. The only in-place capacity change is the
//! collector's trim, which shrinks a surviving cell to its size.
//!
//! Operations that may allocate take the storage as a
//! [`MutableHandle`] because the cell they started on can move or be
//! replaced before they return.

use std::mem::size_of;

use kestrel_vm_gc::{MAX_ALLOCATION_SIZE, Space, Trace, Tracer};
use tracing::{debug, trace};

use crate::error::{VmError, VmResult};
use crate::gc::GcRef;
use crate::handle::{Handle, MutableHandle};
use crate::runtime::Runtime;
use crate::value::Value;

/// Index and length type of array storage
pub type SizeType = u32;

/// A rooted, rebindable reference to an [`ArrayStorage`]
pub type StorageHandle<'s> = MutableHandle<'s, GcRef<ArrayStorage>>;

/// Bytes charged for the cell itself, excluding slots
const HEADER_SIZE: usize = 16;

/// Variable-length storage of values
pub struct ArrayStorage {
    size: SizeType,
    slots: Box<[Value]>,
}

impl ArrayStorage {
    /// Heap bytes of a storage cell with `capacity` slots
    pub const fn allocation_size(capacity: SizeType) -> usize {
        HEADER_SIZE + capacity as usize * size_of::<Value>()
    }

    /// Largest capacity a single cell can have
    pub const fn max_elements() -> SizeType {
        let max = (MAX_ALLOCATION_SIZE - Self::allocation_size(0)) / size_of::<Value>();
        if max > SizeType::MAX as usize {
            SizeType::MAX
        } else {
            max as SizeType
        }
    }

    fn with_capacity(capacity: SizeType) -> Self {
        Self {
            size: 0,
            slots: vec![Value::empty(); capacity as usize].into_boxed_slice(),
        }
    }

    /// Allocate an empty storage with room for `capacity` elements
    pub fn create(rt: &Runtime, capacity: SizeType) -> VmResult<GcRef<ArrayStorage>> {
        Self::create_in(rt, capacity, Space::Young)
    }

    /// Like [`ArrayStorage::create`], but allocated directly in the old
    /// generation for storage expected to live long
    pub fn create_long_lived(rt: &Runtime, capacity: SizeType) -> VmResult<GcRef<ArrayStorage>> {
        Self::create_in(rt, capacity, Space::Old)
    }

    /// Allocate a storage of `capacity` with its first `size` elements empty
    pub fn create_with_size(
        rt: &Runtime,
        capacity: SizeType,
        size: SizeType,
    ) -> VmResult<GcRef<ArrayStorage>> {
        debug_assert!(size <= capacity, "size must be <= capacity");
        let storage = rt.pseudo_handle(Self::create(rt, capacity)?);
        rt.get_mut(storage.get()).resize_within_capacity(size);
        Ok(storage.into_inner())
    }

    fn create_in(
        rt: &Runtime,
        capacity: SizeType,
        space: Space,
    ) -> VmResult<GcRef<ArrayStorage>> {
        if capacity > Self::max_elements() {
            return Err(Self::excessive_capacity_error(capacity));
        }
        rt.alloc_sized(Self::allocation_size(capacity), space, || {
            Self::with_capacity(capacity)
        })
    }

    fn excessive_capacity_error(capacity: SizeType) -> VmError {
        debug!(
            requested = capacity,
            max = Self::max_elements(),
            "array storage capacity exceeded"
        );
        VmError::range_error(format!(
            "Requested an array size larger than the max allowable: \
             Requested elements = {capacity}, max elements = {}",
            Self::max_elements()
        ))
    }

    /// Number of live elements
    #[inline]
    pub fn size(&self) -> SizeType {
        self.size
    }

    /// Number of slots the cell has room for
    #[inline]
    pub fn capacity(&self) -> SizeType {
        self.slots.len() as SizeType
    }

    /// Whether there are no live elements
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Element at `index`, which must be below the size
    #[inline]
    pub fn at(&self, index: SizeType) -> Value {
        debug_assert!(index < self.size, "index out of range");
        self.slots[index as usize]
    }

    /// Mutable element at `index`, which must be below the size
    #[inline]
    pub fn at_mut(&mut self, index: SizeType) -> &mut Value {
        debug_assert!(index < self.size, "index out of range");
        &mut self.slots[index as usize]
    }

    /// Store `value` at `index`, which must be below the size
    #[inline]
    pub fn set(&mut self, index: SizeType, value: Value) {
        *self.at_mut(index) = value;
    }

    /// Live elements
    #[inline]
    pub fn as_slice(&self) -> &[Value] {
        &self.slots[..self.size as usize]
    }

    /// Iterate over live elements
    pub fn iter(&self) -> impl Iterator<Item = Value> + '_ {
        self.as_slice().iter().copied()
    }

    /// Remove and return the last element. The storage must not be empty.
    pub fn pop_back(&mut self) -> Value {
        debug_assert!(self.size > 0, "can't pop from empty ArrayStorage");
        self.size -= 1;
        self.slots[self.size as usize]
    }

    /// Set the size to `new_size <= capacity`, filling any new elements
    /// with empty. Never reallocates.
    pub fn resize_within_capacity(&mut self, new_size: SizeType) {
        debug_assert!(
            new_size <= self.capacity(),
            "new_size must be <= capacity in resize_within_capacity()"
        );
        if new_size > self.size {
            self.slots[self.size as usize..new_size as usize].fill(Value::empty());
        }
        self.size = new_size;
    }

    /// Append `value`, reallocating when the capacity is exhausted
    pub fn push_back(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        value: Handle<'_, Value>,
    ) -> VmResult<()> {
        {
            let mut cell = rt.get_mut(storage.get());
            if cell.size < cell.capacity() {
                let index = cell.size as usize;
                cell.slots[index] = value.get();
                cell.size += 1;
                return Ok(());
            }
        }
        Self::push_back_slow_path(storage, rt, value)
    }

    fn push_back_slow_path(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        value: Handle<'_, Value>,
    ) -> VmResult<()> {
        let size = rt.get(storage.get()).size;
        Self::resize(storage, rt, size + 1)?;
        // The cell may have moved; only the handles are current.
        rt.get_mut(storage.get()).set(size, value.get());
        Ok(())
    }

    /// Make sure the capacity is at least `capacity`
    pub fn ensure_capacity(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        capacity: SizeType,
    ) -> VmResult<()> {
        let (size, current) = {
            let cell = rt.get(storage.get());
            (cell.size, cell.capacity())
        };
        if capacity <= current {
            return Ok(());
        }
        let new_capacity = Self::grown_capacity(current, capacity)?;
        Self::reallocate_to_larger(storage, rt, new_capacity, 0, 0, size)
    }

    /// Change the size to `new_size`, adding empty elements or dropping
    /// elements at the end
    pub fn resize(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        new_size: SizeType,
    ) -> VmResult<()> {
        Self::shift(storage, rt, 0, 0, new_size)
    }

    /// Change the size to `new_size`, adding empty elements or dropping
    /// elements at the front
    pub fn resize_left(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        new_size: SizeType,
    ) -> VmResult<()> {
        let size = rt.get(storage.get()).size;
        if new_size >= size {
            Self::shift(storage, rt, 0, new_size - size, new_size)
        } else {
            Self::shift(storage, rt, size - new_size, 0, new_size)
        }
    }

    /// Resize to `to_last` elements, moving the elements starting at
    /// `from_first` to `to_first` and emptying everything else.
    ///
    /// The number of elements moved is
    /// `min(size - from_first, to_last - to_first)`.
    pub fn shift(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        from_first: SizeType,
        to_first: SizeType,
        to_last: SizeType,
    ) -> VmResult<()> {
        debug_assert!(to_first <= to_last, "to_first must be <= to_last");
        let capacity = {
            let mut cell = rt.get_mut(storage.get());
            let capacity = cell.capacity();
            if to_last <= capacity {
                cell.shift_within_capacity(from_first, to_first, to_last);
                return Ok(());
            }
            capacity
        };
        let new_capacity = Self::grown_capacity(capacity, to_last)?;
        Self::reallocate_to_larger(storage, rt, new_capacity, from_first, to_first, to_last)
    }

    fn shift_within_capacity(
        &mut self,
        from_first: SizeType,
        to_first: SizeType,
        to_last: SizeType,
    ) {
        let (from, to, last) = (from_first as usize, to_first as usize, to_last as usize);
        let len = (self.size as usize).saturating_sub(from).min(last - to);
        self.slots.copy_within(from..from + len, to);
        self.slots[..to].fill(Value::empty());
        self.slots[to + len..last].fill(Value::empty());
        self.size = to_last;
    }

    /// Capacity to grow to when `requested` slots don't fit in `capacity`
    fn grown_capacity(capacity: SizeType, requested: SizeType) -> VmResult<SizeType> {
        let max = Self::max_elements();
        if requested > max {
            return Err(Self::excessive_capacity_error(requested));
        }
        Ok(if capacity < max / 2 {
            requested.max(capacity * 2)
        } else {
            max
        })
    }

    /// Move into a new cell of `capacity`, copying as [`ArrayStorage::shift`]
    /// describes, and rebind `storage` to it
    fn reallocate_to_larger(
        storage: &mut StorageHandle<'_>,
        rt: &Runtime,
        capacity: SizeType,
        from_first: SizeType,
        to_first: SizeType,
        to_last: SizeType,
    ) -> VmResult<()> {
        debug_assert!(to_last <= capacity, "to_last must fit in the new capacity");

        let fresh = Self::create(rt, capacity)?;
        let old = storage.get();
        let old_capacity = {
            let (src, mut dst) = rt.get_pair_mut(old, fresh);
            let (from, to) = (from_first as usize, to_first as usize);
            let len = (src.size as usize)
                .saturating_sub(from)
                .min(to_last as usize - to);
            dst.slots[to..to + len].copy_from_slice(&src.slots[from..from + len]);
            dst.size = to_last;
            src.capacity()
        };
        trace!(
            old_capacity,
            new_capacity = capacity,
            size = to_last,
            "array storage reallocated"
        );
        storage.set(fresh);
        Ok(())
    }

    /// Shrink the capacity to the size. Returns the new allocation size.
    pub(crate) fn trim_to_size(&mut self) -> usize {
        if self.capacity() != self.size {
            self.slots = self.slots[..self.size as usize].into();
        }
        self.heap_size()
    }

    /// Bytes this cell occupies in the heap
    pub(crate) fn heap_size(&self) -> usize {
        Self::allocation_size(self.capacity())
    }
}

impl Trace for ArrayStorage {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        let size = self.size as usize;
        self.slots[..size].trace(tracer);
    }
}

impl std::fmt::Debug for ArrayStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayStorage")
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .field("elements", &self.as_slice())
            .finish()
    }
}
