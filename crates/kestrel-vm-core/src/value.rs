//! JavaScript values with NaN-boxing
//!
//! NaN-boxing encodes JS values in 64 bits using the IEEE 754 NaN space.
//! This allows storing heap references, integers, and special values without
//! additional allocation.
//!
//! ## Encoding Scheme
//!
//! ```text
//! 64 bits: SEEEEEEE EEEEMMMM MMMMMMMM ... MMMMMMMM
//!          S = sign bit
//!          E = exponent (11 bits)
//!          M = mantissa (52 bits)
//!
//! Regular doubles: When exponent != 0x7FF (NaN)
//! NaN-boxed values: When exponent == 0x7FF and mantissa != 0 (quiet NaN)
//!
//! Encoding:
//! - Double:     stored directly (except NaN)
//! - NaN:        0x7FFA_0000_0000_0000 (canonical NaN, distinct from undefined)
//! - Integer:    0x7FF8_0001_XXXX_XXXX (32-bit signed in lower bits)
//! - Object:     0x7FFC_XXXX_XXXX_XXXX (48-bit cell address)
//! - String:     0x7FFD_XXXX_XXXX_XXXX (48-bit cell address)
//! - Undefined:  0x7FF8_0000_0000_0000
//! - Null:       0x7FF8_0000_0000_0001
//! - True:       0x7FF8_0000_0000_0002
//! - False:      0x7FF8_0000_0000_0003
//! - Empty:      0x7FF8_0000_0000_0004 (unoccupied slot, never user visible)
//! ```
//!
//! Values are `Copy`. A value holding a cell address is only meaningful while
//! it sits somewhere the collector can see it (a handle, a cell slot);
//! elsewhere it goes stale at the next allocation.

use std::fmt;

use kestrel_vm_gc::{CellAddr, Trace, Tracer};

use crate::gc::{CellType, GcRef};
use crate::string::JsString;

const BOX_MASK: u64 = 0xFFF8_0000_0000_0000;
const QUIET_NAN: u64 = 0x7FF8_0000_0000_0000;
const TAG_MASK: u64 = 0xFFFF_0000_0000_0000;
const PAYLOAD_MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

const TAG_UNDEFINED: u64 = 0x7FF8_0000_0000_0000;
const TAG_NULL: u64 = 0x7FF8_0000_0000_0001;
const TAG_TRUE: u64 = 0x7FF8_0000_0000_0002;
const TAG_FALSE: u64 = 0x7FF8_0000_0000_0003;
const TAG_EMPTY: u64 = 0x7FF8_0000_0000_0004;
const TAG_NAN: u64 = 0x7FFA_0000_0000_0000;
const TAG_INT32: u64 = 0x7FF8_0001_0000_0000;
const TAG_OBJECT: u64 = 0x7FFC_0000_0000_0000;
const TAG_STRING: u64 = 0x7FFD_0000_0000_0000;

/// A JavaScript value using NaN-boxing for efficient storage
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value {
    bits: u64,
}

impl Value {
    /// Create the empty sentinel that marks an unoccupied slot
    #[inline]
    pub const fn empty() -> Self {
        Self { bits: TAG_EMPTY }
    }

    /// Create undefined value
    #[inline]
    pub const fn undefined() -> Self {
        Self {
            bits: TAG_UNDEFINED,
        }
    }

    /// Create null value
    #[inline]
    pub const fn null() -> Self {
        Self { bits: TAG_NULL }
    }

    /// Create boolean value
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        Self {
            bits: if b { TAG_TRUE } else { TAG_FALSE },
        }
    }

    /// Create 32-bit integer value
    #[inline]
    pub const fn int32(n: i32) -> Self {
        Self {
            bits: TAG_INT32 | (n as u32 as u64),
        }
    }

    /// Create number (f64) value
    #[inline]
    pub fn number(n: f64) -> Self {
        // Handle NaN specially to avoid collision with the boxed tags
        if n.is_nan() {
            return Self { bits: TAG_NAN };
        }

        // Integers that fit in i32 are stored as int32, but -0.0 stays a double
        if n.fract() == 0.0
            && n >= i32::MIN as f64
            && n <= i32::MAX as f64
            && (n != 0.0 || n.is_sign_positive())
        {
            return Self::int32(n as i32);
        }

        Self { bits: n.to_bits() }
    }

    /// Create string value
    #[inline]
    pub fn string(s: GcRef<JsString>) -> Self {
        Self::encode_addr(TAG_STRING, s.addr())
    }

    /// Create a value referring to any heap cell.
    ///
    /// Strings get the string tag; every other cell kind is an object.
    #[inline]
    pub fn from_cell<T: CellType>(r: GcRef<T>) -> Self {
        if T::IS_STRING {
            Self::encode_addr(TAG_STRING, r.addr())
        } else {
            Self::encode_addr(TAG_OBJECT, r.addr())
        }
    }

    #[inline]
    fn encode_addr(tag: u64, addr: CellAddr) -> Self {
        debug_assert!(
            addr.raw() <= PAYLOAD_MASK,
            "cell address {addr:?} does not fit in a boxed value"
        );
        Self {
            bits: tag | (addr.raw() & PAYLOAD_MASK),
        }
    }

    #[inline]
    fn is_nan_boxed(&self) -> bool {
        (self.bits & BOX_MASK) == QUIET_NAN
    }

    /// Check if value is the empty sentinel
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bits == TAG_EMPTY
    }

    /// Check if value is undefined
    #[inline]
    pub fn is_undefined(&self) -> bool {
        self.bits == TAG_UNDEFINED
    }

    /// Check if value is null
    #[inline]
    pub fn is_null(&self) -> bool {
        self.bits == TAG_NULL
    }

    /// Check if value is a boolean
    #[inline]
    pub fn is_boolean(&self) -> bool {
        self.bits == TAG_TRUE || self.bits == TAG_FALSE
    }

    /// Check if value is an integer
    #[inline]
    pub fn is_int32(&self) -> bool {
        (self.bits & 0xFFFF_FFFF_0000_0000) == TAG_INT32
    }

    /// Check if value is a number (including int32 and NaN)
    #[inline]
    pub fn is_number(&self) -> bool {
        self.is_int32() || self.bits == TAG_NAN || !self.is_nan_boxed()
    }

    /// Check if value is a string
    #[inline]
    pub fn is_string(&self) -> bool {
        (self.bits & TAG_MASK) == TAG_STRING
    }

    /// Check if value is an object
    #[inline]
    pub fn is_object(&self) -> bool {
        (self.bits & TAG_MASK) == TAG_OBJECT
    }

    /// Get as boolean
    #[inline]
    pub fn as_boolean(&self) -> Option<bool> {
        match self.bits {
            TAG_TRUE => Some(true),
            TAG_FALSE => Some(false),
            _ => None,
        }
    }

    /// Get as int32 if this is a boxed integer
    #[inline]
    pub fn as_int32(&self) -> Option<i32> {
        self.is_int32().then_some(self.bits as u32 as i32)
    }

    /// Get as number (any numeric encoding)
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        if let Some(i) = self.as_int32() {
            Some(i as f64)
        } else if self.bits == TAG_NAN {
            Some(f64::NAN)
        } else if !self.is_nan_boxed() {
            Some(f64::from_bits(self.bits))
        } else {
            None
        }
    }

    /// Get the string reference
    #[inline]
    pub fn as_string(&self) -> Option<GcRef<JsString>> {
        self.is_string()
            .then(|| GcRef::from_addr(CellAddr::from_raw(self.bits & PAYLOAD_MASK)))
    }

    /// Address of the referenced cell, for strings and objects
    #[inline]
    pub fn as_cell_addr(&self) -> Option<CellAddr> {
        (self.is_string() || self.is_object())
            .then(|| CellAddr::from_raw(self.bits & PAYLOAD_MASK))
    }

    /// Get type name for typeof operator
    pub fn type_of(&self) -> &'static str {
        if self.is_undefined() || self.is_empty() {
            "undefined"
        } else if self.is_null() || self.is_object() {
            "object"
        } else if self.is_boolean() {
            "boolean"
        } else if self.is_string() {
            "string"
        } else {
            "number"
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::undefined()
    }
}

impl Trace for Value {
    fn trace(&mut self, tracer: &mut dyn Tracer) {
        if let Some(mut addr) = self.as_cell_addr() {
            let tag = self.bits & TAG_MASK;
            tracer.visit(&mut addr);
            *self = Self::encode_addr(tag, addr);
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "<empty>")
        } else if self.is_undefined() {
            write!(f, "undefined")
        } else if self.is_null() {
            write!(f, "null")
        } else if let Some(b) = self.as_boolean() {
            write!(f, "{b}")
        } else if let Some(n) = self.as_number() {
            write!(f, "{n}")
        } else if let Some(s) = self.as_string() {
            write!(f, "String({:?})", s.addr())
        } else if let Some(addr) = self.as_cell_addr() {
            write!(f, "Object({addr:?})")
        } else {
            write!(f, "Value({:#018x})", self.bits)
        }
    }
}
