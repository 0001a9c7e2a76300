//! Error types for buffer operations

use thiserror::Error;

/// Error type for buffer and codec operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("insufficient space: {needed} bytes needed, {available} free")]
    InsufficientSpace { needed: usize, available: usize },
    #[error("unexpected end of buffer: {needed} bytes needed, {available} available")]
    EndOfBuffer { needed: usize, available: usize },
    #[error("buffer is read-only")]
    ReadOnly,
    #[error("invalid position: {position} (limit {limit})")]
    InvalidPosition { position: usize, limit: usize },
    #[error("unable to grow buffer to {0} bytes")]
    AllocationFailed(usize),
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    #[error("length exceeded: {0} > {1}")]
    LengthExceeded(usize, usize), // found, max
    #[error("invalid bool: {0}")]
    InvalidBool(u8),
    #[error("invalid error category: {0}")]
    InvalidCategory(i32),
    #[error("invalid data in {0}: {1}")]
    InvalidData(&'static str, &'static str), // context, message
}

impl Error {
    /// Returns true if the error was caused by malformed (likely untrusted) input rather
    /// than by the capacity or state of the buffer.
    ///
    /// Peers that produce malformed input should be dropped; capacity errors may be
    /// retried once more data (or space) is available.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            Error::ExtraData(_)
                | Error::LengthExceeded(_, _)
                | Error::InvalidBool(_)
                | Error::InvalidCategory(_)
                | Error::InvalidData(_, _)
        )
    }
}
