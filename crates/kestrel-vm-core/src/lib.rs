//! # Kestrel VM Core
//!
//! Object storage and rooting core of the Kestrel JavaScript VM.
//!
//! ## Design Principles
//!
//! - **Moving heap**: every allocation may relocate every live cell, so
//!   native code keeps references in handles registered with a [`GcScope`]
//! - **NaN-boxing**: Efficient 64-bit value representation
//! - **Growable storage**: [`ArrayStorage`] grows by reallocate-and-copy and
//!   is trimmed by the collector
//! - **Model sort**: [`quick_sort`] orders anything exposed through a
//!   [`SortModel`], with JS array semantics provided by the models in
//!   [`sort_model`]

#![warn(clippy::all)]
#![warn(missing_docs)]

pub mod array_storage;
pub mod convert;
pub mod error;
pub mod gc;
pub mod handle;
pub mod object;
pub mod runtime;
pub mod sort;
pub mod sort_model;
pub mod string;
pub mod value;

pub use array_storage::{ArrayStorage, SizeType, StorageHandle};
pub use error::{VmError, VmResult};
pub use gc::{CellKind, GcRef};
pub use handle::{GcScope, Handle, Marker, MarkerGuard, MutableHandle, PseudoHandle, Rootable};
pub use object::{JsObject, Property};
pub use runtime::Runtime;
pub use sort::{SortModel, quick_sort};
pub use sort_model::{Comparator, StandardSortModel, StorageSortModel, sort_object, sort_storage};
pub use string::JsString;
pub use value::Value;
