//! Collector error types

use thiserror::Error;

/// Allocation failures reported by the heap
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// The heap limit would be exceeded even after collecting
    #[error("out of memory: requested {requested} bytes with {allocated} of {limit} bytes in use")]
    OutOfMemory {
        /// Bytes requested by the failed allocation
        requested: usize,
        /// Bytes live in the heap at the time of the request
        allocated: usize,
        /// Configured heap limit
        limit: usize,
    },

    /// A single allocation above [`crate::MAX_ALLOCATION_SIZE`]
    #[error("allocation of {requested} bytes exceeds the maximum single allocation of {max} bytes")]
    AllocationTooLarge {
        /// Bytes requested
        requested: usize,
        /// Largest single allocation the heap supports
        max: usize,
    },
}
