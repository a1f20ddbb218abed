//! GC object model: cell addresses and the trace/trim capabilities

use std::fmt;

/// Address of a cell in the heap.
///
/// Addresses are handed out in increasing order and never reused: when a
/// collection evacuates a cell it receives a new address and the old one
/// becomes permanently invalid.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellAddr(u64);

impl CellAddr {
    /// Build an address from its raw representation
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw representation of the address
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for CellAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:#x}", self.0)
    }
}

/// Visitor invoked for every reference slot during tracing.
///
/// The slot is passed mutably: after evacuation the collector rewrites it
/// with the referent's new address.
pub trait Tracer {
    /// Visit a single reference slot
    fn visit(&mut self, addr: &mut CellAddr);
}

/// Types that hold references into the heap
pub trait Trace {
    /// Pass every reference slot held by `self` to `tracer`
    fn trace(&mut self, tracer: &mut dyn Tracer);
}

/// Trait for heap-managed cells
pub trait GcCell: Trace {
    /// Bytes this cell occupies in the heap
    fn allocation_size(&self) -> usize;

    /// Give back unused capacity during a full collection.
    ///
    /// Returns the allocation size after trimming. Cells without a notion of
    /// spare capacity keep the default, which changes nothing.
    fn trim(&mut self) -> usize {
        self.allocation_size()
    }
}

impl Trace for CellAddr {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        tracer.visit(self);
    }
}

impl<T: Trace> Trace for Option<T> {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        if let Some(inner) = self {
            inner.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for [T] {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        for item in self {
            item.trace(tracer);
        }
    }
}

impl<T: Trace> Trace for Vec<T> {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        self.as_mut_slice().trace(tracer);
    }
}
