//! Heap-allocated JavaScript strings
//!
//! Strings are immutable once allocated and hold no references, so the
//! collector copies them without tracing.

use std::cmp::Ordering;

use crate::error::VmResult;
use crate::gc::GcRef;
use crate::runtime::Runtime;

/// Fixed per-string overhead charged to the heap
const STRING_HEADER_SIZE: usize = 16;

/// An immutable string cell
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsString {
    data: Box<str>,
}

impl JsString {
    /// Build an unallocated string cell
    pub fn new(s: &str) -> Self {
        Self { data: s.into() }
    }

    /// Allocate a string in the runtime's heap
    pub fn create(rt: &Runtime, s: &str) -> VmResult<GcRef<JsString>> {
        rt.alloc(Self::new(s))
    }

    /// Get the string contents
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// Length in UTF-16 code units
    pub fn len_utf16(&self) -> usize {
        self.data.encode_utf16().count()
    }

    /// Bytes this string occupies in the heap
    pub fn heap_size(&self) -> usize {
        STRING_HEADER_SIZE + self.data.len()
    }
}

/// Compare two strings by UTF-16 code units, the order JS relational
/// comparison uses.
pub fn compare_utf16(a: &str, b: &str) -> Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}
