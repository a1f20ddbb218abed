//! VM error types

use kestrel_vm_gc::GcError;
use thiserror::Error;

/// VM execution errors
#[derive(Debug, Error)]
pub enum VmError {
    /// Type error (e.g., writing a read-only property)
    #[error("TypeError: {0}")]
    TypeError(String),

    /// Range error (e.g., requested capacity above the allocator's limit)
    #[error("RangeError: {0}")]
    RangeError(String),

    /// Internal error
    #[error("InternalError: {0}")]
    InternalError(String),

    /// Out of memory
    #[error("OutOfMemory")]
    OutOfMemory,

    /// A callback threw a value.
    ///
    /// The value itself is rooted in the runtime; retrieve it with
    /// [`crate::Runtime::take_thrown_value`].
    #[error("Uncaught exception")]
    Exception,
}

impl VmError {
    /// Create a type error
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a range error
    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }
}

impl From<GcError> for VmError {
    fn from(err: GcError) -> Self {
        match err {
            GcError::OutOfMemory { .. } => VmError::OutOfMemory,
            GcError::AllocationTooLarge { .. } => VmError::range_error(err.to_string()),
        }
    }
}

/// Result type for VM operations
pub type VmResult<T> = std::result::Result<T, VmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            VmError::range_error("too big").to_string(),
            "RangeError: too big"
        );
        assert_eq!(VmError::OutOfMemory.to_string(), "OutOfMemory");
    }

    #[test]
    fn test_from_gc_error() {
        let oom = GcError::OutOfMemory {
            requested: 8,
            allocated: 0,
            limit: 4,
        };
        assert!(matches!(VmError::from(oom), VmError::OutOfMemory));

        let large = GcError::AllocationTooLarge {
            requested: 10,
            max: 8,
        };
        assert!(matches!(VmError::from(large), VmError::RangeError(_)));
    }
}
