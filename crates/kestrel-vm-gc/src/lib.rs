//! # Kestrel VM Garbage Collector
//!
//! Moving, generational heap of cells.
//!
//! ## Design
//!
//! - **Cells**: every heap object implements [`GcCell`]; its [`Trace`] impl is
//!   the descriptor the collector uses to find and rewrite outgoing references
//! - **Young generation**: ordinary allocations; a young collection promotes
//!   survivors into the old generation
//! - **Old generation**: long-lived allocations and promoted survivors
//! - **Evacuation**: every collection copies survivors to fresh addresses.
//!   Addresses are never reused, so a reference that was not visible to the
//!   collector goes stale instead of silently aliasing another cell
//! - **Trim**: full collections let each cell give back unused tail capacity

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod collector;
pub mod error;
pub mod heap;
pub mod object;

pub use collector::{CollectionKind, GcStats};
pub use error::GcError;
pub use heap::{GcConfig, HEAP_ALIGN, Heap, MAX_ALLOCATION_SIZE, Space};
pub use object::{CellAddr, GcCell, Trace, Tracer};
