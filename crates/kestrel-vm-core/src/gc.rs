//! Garbage collection support
//!
//! This module defines the cell types the VM stores in the
//! `kestrel-vm-gc` heap and typed references to them.

use std::fmt;
use std::marker::PhantomData;

// Re-export GC types from kestrel-vm-gc
pub use kestrel_vm_gc::{
    CellAddr, CollectionKind, GcCell, GcConfig, GcError, GcStats, Heap, Space, Trace, Tracer,
};

use crate::array_storage::ArrayStorage;
use crate::object::JsObject;
use crate::string::JsString;

/// Typed reference to a heap cell.
///
/// A `GcRef` is a raw address: it is only valid until the next allocation
/// unless it is kept in a handle (see [`crate::handle`]).
pub struct GcRef<T> {
    addr: CellAddr,
    _marker: PhantomData<fn() -> T>,
}

impl<T> GcRef<T> {
    /// Wrap a raw cell address
    #[inline]
    pub const fn from_addr(addr: CellAddr) -> Self {
        Self {
            addr,
            _marker: PhantomData,
        }
    }

    /// Get the raw cell address
    #[inline]
    pub const fn addr(self) -> CellAddr {
        self.addr
    }
}

impl<T> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for GcRef<T> {}

impl<T> PartialEq for GcRef<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr == other.addr
    }
}

impl<T> Eq for GcRef<T> {}

impl<T> fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GcRef({:?})", self.addr)
    }
}

/// Kind tag of a heap cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// [`ArrayStorage`]
    ArrayStorage,
    /// [`JsString`]
    String,
    /// [`JsObject`]
    Object,
}

/// Every cell the VM allocates
pub enum HeapCell {
    /// Resizable value storage
    ArrayStorage(ArrayStorage),
    /// Immutable string
    String(JsString),
    /// Plain object with indexed properties
    Object(JsObject),
}

impl HeapCell {
    /// Kind tag of this cell
    pub fn kind(&self) -> CellKind {
        match self {
            HeapCell::ArrayStorage(_) => CellKind::ArrayStorage,
            HeapCell::String(_) => CellKind::String,
            HeapCell::Object(_) => CellKind::Object,
        }
    }
}

impl Trace for HeapCell {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        match self {
            HeapCell::ArrayStorage(storage) => storage.trace(tracer),
            HeapCell::String(_) => {}
            HeapCell::Object(object) => object.trace(tracer),
        }
    }
}

impl GcCell for HeapCell {
    fn allocation_size(&self) -> usize {
        match self {
            HeapCell::ArrayStorage(storage) => storage.heap_size(),
            HeapCell::String(string) => string.heap_size(),
            HeapCell::Object(object) => object.heap_size(),
        }
    }

    fn trim(&mut self) -> usize {
        match self {
            HeapCell::ArrayStorage(storage) => storage.trim_to_size(),
            _ => self.allocation_size(),
        }
    }
}

/// A concrete cell type that can be stored in a [`HeapCell`]
pub trait CellType: Sized + 'static {
    /// Kind tag for this type
    const KIND: CellKind;
    /// Whether values referring to this cell carry the string tag
    const IS_STRING: bool = false;

    /// Wrap into the heap enum
    fn into_cell(self) -> HeapCell;

    /// Downcast a heap cell
    fn from_cell(cell: &HeapCell) -> Option<&Self>;

    /// Downcast a heap cell mutably
    fn from_cell_mut(cell: &mut HeapCell) -> Option<&mut Self>;
}

macro_rules! impl_cell_type {
    ($ty:ty, $variant:ident $(, $is_string:expr)?) => {
        impl CellType for $ty {
            const KIND: CellKind = CellKind::$variant;
            $(const IS_STRING: bool = $is_string;)?

            fn into_cell(self) -> HeapCell {
                HeapCell::$variant(self)
            }

            fn from_cell(cell: &HeapCell) -> Option<&Self> {
                match cell {
                    HeapCell::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn from_cell_mut(cell: &mut HeapCell) -> Option<&mut Self> {
                match cell {
                    HeapCell::$variant(inner) => Some(inner),
                    _ => None,
                }
            }
        }
    };
}

impl_cell_type!(ArrayStorage, ArrayStorage);
impl_cell_type!(JsString, String, true);
impl_cell_type!(JsObject, Object);
