//! VM runtime
//!
//! The runtime owns the garbage-collected heap and the handle stack. All
//! allocation goes through it: before a cell is allocated the heap is asked
//! whether a collection is due, and if so the runtime collects with the
//! handle stack (plus the pending thrown value) as the root set. Any
//! unregistered `GcRef` or `Value` held across such a call goes stale.

use std::cell::{Cell, Ref, RefCell, RefMut};

use kestrel_vm_gc::{
    CollectionKind, GcCell, GcConfig, GcError, GcStats, Heap, Space, Trace, Tracer,
};
use tracing::debug;

use crate::error::{VmError, VmResult};
use crate::gc::{CellKind, CellType, GcRef, HeapCell};
use crate::handle::{HandleStack, PseudoHandle, Rootable};
use crate::string::JsString;
use crate::value::Value;

/// Everything the collector must treat as live
struct RuntimeRoots<'a> {
    handles: &'a mut HandleStack,
    thrown: &'a Cell<Value>,
}

impl Trace for RuntimeRoots<'_> {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.handles.trace(tracer);
        let mut thrown = self.thrown.get();
        thrown.trace(tracer);
        self.thrown.set(thrown);
    }
}

/// The VM runtime.
///
/// Single-threaded: the heap and handle stack use interior mutability, so a
/// `&Runtime` is all native code needs.
pub struct Runtime {
    heap: RefCell<Heap<HeapCell>>,
    handles: RefCell<HandleStack>,
    thrown: Cell<Value>,
}

impl Runtime {
    /// Create a runtime with the default GC configuration
    pub fn new() -> Self {
        Self::with_config(GcConfig::default())
    }

    /// Create a runtime with a custom GC configuration
    pub fn with_config(config: GcConfig) -> Self {
        debug!(
            heap_limit = config.heap_limit,
            young_threshold = config.young_threshold,
            stress = config.stress,
            "runtime created"
        );
        Self {
            heap: RefCell::new(Heap::with_config(config)),
            handles: RefCell::new(HandleStack::new()),
            thrown: Cell::new(Value::empty()),
        }
    }

    /// Allocate `cell` in the young generation. May collect.
    pub fn alloc<T: CellType>(&self, cell: T) -> VmResult<GcRef<T>> {
        self.allocate_in(cell, Space::Young)
    }

    /// Allocate `cell` directly in the old generation. May collect.
    pub fn alloc_long_lived<T: CellType>(&self, cell: T) -> VmResult<GcRef<T>> {
        self.allocate_in(cell, Space::Old)
    }

    fn allocate_in<T: CellType>(&self, cell: T, space: Space) -> VmResult<GcRef<T>> {
        let cell = cell.into_cell();
        self.allocate_cell::<T>(cell.allocation_size(), space, || cell)
    }

    /// Allocate a cell of `size` bytes, built by `init` only once the heap
    /// has room for it. May collect.
    pub(crate) fn alloc_sized<T: CellType>(
        &self,
        size: usize,
        space: Space,
        init: impl FnOnce() -> T,
    ) -> VmResult<GcRef<T>> {
        self.allocate_cell::<T>(size, space, || init().into_cell())
    }

    fn allocate_cell<T: CellType>(
        &self,
        size: usize,
        space: Space,
        init: impl FnOnce() -> HeapCell,
    ) -> VmResult<GcRef<T>> {
        let needed = self.heap.borrow().collection_needed(size);
        if let Some(kind) = needed {
            self.run_collection(kind);
        }

        let failed = |err: GcError| {
            debug!(%err, kind = ?T::KIND, "allocation failed");
            VmError::from(err)
        };
        self.heap.borrow().check_allocation(size).map_err(failed)?;
        let cell = init();
        let addr = self
            .heap
            .borrow_mut()
            .allocate(cell, space)
            .map_err(failed)?;
        Ok(GcRef::from_addr(addr))
    }

    /// Run a full collection. Returns the bytes reclaimed.
    pub fn collect_garbage(&self) -> usize {
        self.run_collection(CollectionKind::Full)
    }

    /// Run a young collection. Returns the bytes reclaimed.
    pub fn collect_young_garbage(&self) -> usize {
        self.run_collection(CollectionKind::Young)
    }

    fn run_collection(&self, kind: CollectionKind) -> usize {
        let mut heap = self.heap.borrow_mut();
        let mut handles = self.handles.borrow_mut();
        let mut roots = RuntimeRoots {
            handles: &mut *handles,
            thrown: &self.thrown,
        };
        let reclaimed = heap.run(&mut roots, kind);
        debug!(
            ?kind,
            reclaimed,
            live_cells = heap.cell_count(),
            live_bytes = heap.allocated(),
            handles = handles.len(),
            "collection finished"
        );
        reclaimed
    }

    /// Snapshot of the collector statistics
    pub fn gc_stats(&self) -> GcStats {
        self.heap.borrow().stats().clone()
    }

    /// Number of collections run so far.
    ///
    /// Every unregistered reference obtained before the epoch last changed is
    /// stale.
    pub fn gc_epoch(&self) -> u64 {
        self.heap.borrow().stats().collections
    }

    /// Bytes currently charged to live cells
    pub fn heap_allocated(&self) -> usize {
        self.heap.borrow().allocated()
    }

    /// Whether `r` still names a cell in the heap
    pub fn is_live<T>(&self, r: GcRef<T>) -> bool {
        self.heap.borrow().contains(r.addr())
    }

    /// Generation the referenced cell lives in
    pub fn space_of<T>(&self, r: GcRef<T>) -> Option<Space> {
        self.heap.borrow().space_of(r.addr())
    }

    /// Borrow a cell.
    ///
    /// # Panics
    ///
    /// Panics if `r` is stale or names a cell of another kind; both mean a
    /// reference escaped the handle protocol.
    pub fn get<T: CellType>(&self, r: GcRef<T>) -> Ref<'_, T> {
        Ref::map(self.heap.borrow(), |heap| {
            match heap.get(r.addr()).and_then(T::from_cell) {
                Some(cell) => cell,
                None => panic!("stale or mistyped {:?} reference {:?}", T::KIND, r.addr()),
            }
        })
    }

    /// Borrow a cell mutably.
    ///
    /// # Panics
    ///
    /// Same conditions as [`Runtime::get`].
    pub fn get_mut<T: CellType>(&self, r: GcRef<T>) -> RefMut<'_, T> {
        RefMut::map(self.heap.borrow_mut(), |heap| {
            match heap.get_mut(r.addr()).and_then(T::from_cell_mut) {
                Some(cell) => cell,
                None => panic!("stale or mistyped {:?} reference {:?}", T::KIND, r.addr()),
            }
        })
    }

    /// Borrow two distinct cells mutably at once
    pub(crate) fn get_pair_mut<A: CellType, B: CellType>(
        &self,
        a: GcRef<A>,
        b: GcRef<B>,
    ) -> (RefMut<'_, A>, RefMut<'_, B>) {
        RefMut::map_split(self.heap.borrow_mut(), |heap| {
            let Some((x, y)) = heap.get_pair_mut(a.addr(), b.addr()) else {
                panic!("invalid cell pair {:?} / {:?}", a.addr(), b.addr());
            };
            match (A::from_cell_mut(x), B::from_cell_mut(y)) {
                (Some(x), Some(y)) => (x, y),
                _ => panic!("mistyped cell pair {:?} / {:?}", a.addr(), b.addr()),
            }
        })
    }

    /// Kind of the cell `value` refers to, if any
    pub fn cell_kind(&self, value: Value) -> Option<CellKind> {
        let addr = value.as_cell_addr()?;
        self.heap.borrow().get(addr).map(HeapCell::kind)
    }

    /// Typed reference to the cell `value` refers to, if it is a `T`
    pub fn downcast<T: CellType>(&self, value: Value) -> Option<GcRef<T>> {
        let addr = value.as_cell_addr()?;
        let heap = self.heap.borrow();
        heap.get(addr)
            .and_then(T::from_cell)
            .map(|_| GcRef::from_addr(addr))
    }

    /// Allocate a string value
    pub fn new_string(&self, s: &str) -> VmResult<Value> {
        JsString::create(self, s).map(Value::string)
    }

    /// Wrap `value` in an unregistered pseudo-handle
    pub fn pseudo_handle<T: Rootable>(&self, value: T) -> PseudoHandle<'_, T> {
        PseudoHandle::new(self, value)
    }

    /// Number of registered handles across all scopes
    pub fn handle_count(&self) -> usize {
        self.handles.borrow().len()
    }

    /// Most handles that were ever registered at once
    pub fn handle_high_water(&self) -> usize {
        self.handles.borrow().high_water()
    }

    pub(crate) fn handle_stack(&self) -> &RefCell<HandleStack> {
        &self.handles
    }

    /// Record `value` as thrown and return the error that carries it out.
    ///
    /// The value stays rooted until [`Runtime::take_thrown_value`].
    pub fn throw_value(&self, value: Value) -> VmError {
        self.thrown.set(value);
        VmError::Exception
    }

    /// Take the pending thrown value.
    ///
    /// The result is unrooted: register it in a handle before allocating.
    pub fn take_thrown_value(&self) -> Option<Value> {
        let value = self.thrown.replace(Value::empty());
        (!value.is_empty()).then_some(value)
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let heap = self.heap.borrow();
        f.debug_struct("Runtime")
            .field("cells", &heap.cell_count())
            .field("allocated", &heap.allocated())
            .field("handles", &self.handles.borrow().len())
            .finish()
    }
}
