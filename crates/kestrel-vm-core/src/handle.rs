//! Root scopes and handles
//!
//! Native code that keeps a heap reference across anything that may allocate
//! must keep it in a *handle*: a slot registered in the runtime's handle
//! stack, which the collector scans and rewrites when cells move.
//!
//! - [`GcScope`] opens a region of the handle stack for one native frame and
//!   releases every slot registered in it when dropped.
//! - [`Handle`] is a fixed slot, [`MutableHandle`] a slot that can be rebound.
//! - [`Marker`] / [`GcScope::flush_to_marker`] release the slots created after
//!   a point, so loops can create handles per iteration in O(1) space.
//! - [`PseudoHandle`] registers nothing and is only valid until the next
//!   allocation. Debug builds check that no collection happened in between.
//!
//! ```text
//! handle stack:  [ outer scope slots | inner scope slots ... ]
//!                                    ^ start        ^ marker
//! ```

use std::fmt;
use std::marker::PhantomData;

use kestrel_vm_gc::{Trace, Tracer};
use smallvec::SmallVec;

use crate::gc::{CellType, GcRef};
use crate::runtime::Runtime;
use crate::value::Value;

/// Types that can live in a handle slot
pub trait Rootable: Copy {
    /// Encode into the slot representation
    fn into_value(self) -> Value;

    /// Decode from the slot representation
    fn from_value(value: Value) -> Self;
}

impl Rootable for Value {
    #[inline]
    fn into_value(self) -> Value {
        self
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        value
    }
}

impl<T: CellType> Rootable for GcRef<T> {
    #[inline]
    fn into_value(self) -> Value {
        Value::from_cell(self)
    }

    #[inline]
    fn from_value(value: Value) -> Self {
        match value.as_cell_addr() {
            Some(addr) => GcRef::from_addr(addr),
            None => unreachable!("typed handle slot holds {value:?}"),
        }
    }
}

/// Registered root slots, owned by the runtime
pub(crate) struct HandleStack {
    slots: Vec<Value>,
    /// Serial number of the handle occupying each slot
    serials: Vec<u64>,
    /// Start of each open scope
    scopes: SmallVec<[usize; 16]>,
    next_serial: u64,
    high_water: usize,
}

impl HandleStack {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            serials: Vec::new(),
            scopes: SmallVec::new(),
            next_serial: 0,
            high_water: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn high_water(&self) -> usize {
        self.high_water
    }

    fn push_scope(&mut self) -> (usize, usize) {
        let start = self.slots.len();
        self.scopes.push(start);
        (self.scopes.len(), start)
    }

    fn pop_scope(&mut self, depth: usize) {
        debug_assert_eq!(self.scopes.len(), depth, "GcScope dropped out of order");
        if let Some(start) = self.scopes.pop() {
            self.truncate(start);
        }
    }

    fn push(&mut self, depth: usize, value: Value) -> (usize, u64) {
        debug_assert_eq!(
            self.scopes.len(),
            depth,
            "handles may only be created in the innermost GcScope"
        );
        let index = self.slots.len();
        let serial = self.next_serial;
        self.next_serial += 1;
        self.slots.push(value);
        self.serials.push(serial);
        self.high_water = self.high_water.max(self.slots.len());
        (index, serial)
    }

    #[inline]
    fn read(&self, index: usize, serial: u64) -> Value {
        debug_assert_eq!(
            self.serials.get(index),
            Some(&serial),
            "handle used after its slot was released"
        );
        self.slots[index]
    }

    #[inline]
    fn write(&mut self, index: usize, serial: u64, value: Value) {
        debug_assert_eq!(
            self.serials.get(index),
            Some(&serial),
            "handle used after its slot was released"
        );
        self.slots[index] = value;
    }

    fn truncate(&mut self, len: usize) {
        self.slots.truncate(len);
        self.serials.truncate(len);
    }
}

impl Trace for HandleStack {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.slots.trace(tracer);
    }
}

/// A region of the handle stack bound to one native frame.
///
/// Scopes nest strictly: only the innermost open scope may register handles,
/// and scopes must be dropped in reverse order of creation.
pub struct GcScope<'rt> {
    rt: &'rt Runtime,
    depth: usize,
    start: usize,
}

impl<'rt> GcScope<'rt> {
    /// Open a new scope on `rt`
    pub fn new(rt: &'rt Runtime) -> Self {
        let (depth, start) = rt.handle_stack().borrow_mut().push_scope();
        Self { rt, depth, start }
    }

    /// The runtime this scope belongs to
    pub fn runtime(&self) -> &'rt Runtime {
        self.rt
    }

    fn register(&self, value: Value) -> (usize, u64) {
        self.rt.handle_stack().borrow_mut().push(self.depth, value)
    }

    /// Register an immutable handle holding `value`
    pub fn handle<T: Rootable>(&self, value: T) -> Handle<'_, T> {
        let (index, serial) = self.register(value.into_value());
        Handle {
            rt: self.rt,
            index,
            serial,
            _marker: PhantomData,
        }
    }

    /// Register a mutable handle holding `value`
    pub fn mutable_handle<T: Rootable>(&self, value: T) -> MutableHandle<'_, T> {
        let (index, serial) = self.register(value.into_value());
        MutableHandle {
            rt: self.rt,
            index,
            serial,
            _marker: PhantomData,
        }
    }

    /// Remember the current position in this scope
    pub fn create_marker(&self) -> Marker {
        Marker {
            len: self.rt.handle_stack().borrow().len(),
            depth: self.depth,
        }
    }

    /// Release every handle created in this scope after `marker`
    pub fn flush_to_marker(&self, marker: Marker) {
        debug_assert_eq!(marker.depth, self.depth, "marker belongs to another scope");
        debug_assert!(marker.len >= self.start, "marker precedes its scope");
        let mut stack = self.rt.handle_stack().borrow_mut();
        debug_assert_eq!(
            stack.scopes.len(),
            self.depth,
            "flushing a scope that is not the innermost"
        );
        stack.truncate(marker.len);
    }

    /// Take a marker now and flush back to it when the guard drops
    pub fn marker_guard(&self) -> MarkerGuard<'_, 'rt> {
        let marker = self.create_marker();
        MarkerGuard {
            scope: self,
            marker,
        }
    }

    /// Flush back to an existing `marker` when the guard drops
    pub fn marker_guard_at(&self, marker: Marker) -> MarkerGuard<'_, 'rt> {
        MarkerGuard {
            scope: self,
            marker,
        }
    }

    /// Number of handles currently registered in this scope
    pub fn handle_count(&self) -> usize {
        self.rt.handle_stack().borrow().len() - self.start
    }
}

impl Drop for GcScope<'_> {
    fn drop(&mut self) {
        self.rt.handle_stack().borrow_mut().pop_scope(self.depth);
    }
}

impl fmt::Debug for GcScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GcScope")
            .field("depth", &self.depth)
            .field("start", &self.start)
            .finish()
    }
}

/// A saved position in a [`GcScope`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    len: usize,
    depth: usize,
}

/// Flushes its scope back to a marker on drop
pub struct MarkerGuard<'s, 'rt> {
    scope: &'s GcScope<'rt>,
    marker: Marker,
}

impl MarkerGuard<'_, '_> {
    /// The marker this guard flushes to
    pub fn marker(&self) -> Marker {
        self.marker
    }
}

impl Drop for MarkerGuard<'_, '_> {
    fn drop(&mut self) {
        self.scope.flush_to_marker(self.marker);
    }
}

/// An immutable registered handle
pub struct Handle<'s, T: Rootable = Value> {
    rt: &'s Runtime,
    index: usize,
    serial: u64,
    _marker: PhantomData<T>,
}

impl<T: Rootable> Clone for Handle<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Rootable> Copy for Handle<'_, T> {}

impl<'s, T: Rootable> Handle<'s, T> {
    /// Read the current (possibly relocated) value
    #[inline]
    pub fn get(&self) -> T {
        T::from_value(self.rt.handle_stack().borrow().read(self.index, self.serial))
    }

    /// View the same slot as an untyped value handle
    #[inline]
    pub fn as_value(&self) -> Handle<'s, Value> {
        Handle {
            rt: self.rt,
            index: self.index,
            serial: self.serial,
            _marker: PhantomData,
        }
    }
}

impl<T: Rootable + fmt::Debug> fmt::Debug for Handle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.get()).finish()
    }
}

/// A registered handle that can be rebound without a new registration
pub struct MutableHandle<'s, T: Rootable = Value> {
    rt: &'s Runtime,
    index: usize,
    serial: u64,
    _marker: PhantomData<T>,
}

impl<'s, T: Rootable> MutableHandle<'s, T> {
    /// Read the current (possibly relocated) value
    #[inline]
    pub fn get(&self) -> T {
        T::from_value(self.rt.handle_stack().borrow().read(self.index, self.serial))
    }

    /// Rebind the handle
    #[inline]
    pub fn set(&mut self, value: T) {
        self.rt
            .handle_stack()
            .borrow_mut()
            .write(self.index, self.serial, value.into_value());
    }

    /// Read-only view of the same slot
    #[inline]
    pub fn as_handle(&self) -> Handle<'s, T> {
        Handle {
            rt: self.rt,
            index: self.index,
            serial: self.serial,
            _marker: PhantomData,
        }
    }
}

impl<T: Rootable + fmt::Debug> fmt::Debug for MutableHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MutableHandle").field(&self.get()).finish()
    }
}

/// An unregistered reference, valid only while nothing allocates.
///
/// Costs nothing to create. Holding one across a call that may allocate is a
/// bug; debug builds catch it when the value is read after a collection.
#[must_use]
pub struct PseudoHandle<'rt, T: Rootable = Value> {
    value: T,
    rt: &'rt Runtime,
    epoch: u64,
}

impl<'rt, T: Rootable> PseudoHandle<'rt, T> {
    /// Wrap `value` without registering it
    #[inline]
    pub fn new(rt: &'rt Runtime, value: T) -> Self {
        Self {
            value,
            rt,
            epoch: rt.gc_epoch(),
        }
    }

    /// Read the value
    #[inline]
    pub fn get(&self) -> T {
        debug_assert_eq!(
            self.rt.gc_epoch(),
            self.epoch,
            "pseudo-handle used across a collection"
        );
        self.value
    }

    /// Consume the pseudo-handle, returning the value
    #[inline]
    pub fn into_inner(self) -> T {
        self.get()
    }
}

impl<T: Rootable + fmt::Debug> fmt::Debug for PseudoHandle<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PseudoHandle").field(&self.value).finish()
    }
}
