//! Errors returned by the allocators.

use thiserror::Error;

/// Error type for allocator operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("zero-sized allocation")]
    ZeroSize,
    #[error("pool exhausted: requested {requested} bytes, largest free block is {largest} bytes")]
    Exhausted { requested: usize, largest: usize },
    #[error("pointer does not refer to a live allocation")]
    InvalidPointer,
    #[error("access of {len} bytes at offset {offset} exceeds allocation of {size} bytes")]
    OutOfBounds {
        offset: usize,
        len: usize,
        size: usize,
    },
    #[error("allocator state corrupted: {0}")]
    Corrupted(String),
    #[error("failed to allocate a pool of {0} bytes")]
    PoolAllocation(usize),
}

impl Error {
    /// Returns true if the failure is an expected shortage of memory that the caller may
    /// resolve (for example by defragmenting and retrying) rather than a misuse.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}
