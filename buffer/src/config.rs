//! Limits applied while decoding untrusted input.

use crate::Error;

/// Default maximum length (in bytes) of a decoded string.
pub const MAX_STRING_LEN: usize = 8192;

/// Default maximum number of elements in a decoded collection or array.
pub const MAX_ELEMENTS: usize = 65536;

/// Bounds enforced on length prefixes during decoding.
///
/// Length prefixes are attacker-controlled in networked settings, so every variable-length
/// type checks its prefix against these limits before allocating.
///
/// # Example
///
/// ```
/// use conduit_buffer::Limits;
///
/// let limits = Limits::default();
/// assert!(limits.check_string(8192).is_ok());
/// assert!(limits.check_string(8193).is_err());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Limits {
    /// Maximum byte length of a string.
    pub max_string_len: usize,
    /// Maximum element count of a sequence, map, set or fixed-size array.
    pub max_elements: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_string_len: MAX_STRING_LEN,
            max_elements: MAX_ELEMENTS,
        }
    }
}

impl Limits {
    /// Creates limits with the given bounds.
    pub const fn new(max_string_len: usize, max_elements: usize) -> Self {
        Self {
            max_string_len,
            max_elements,
        }
    }

    /// Returns an error if `len` exceeds the maximum string length.
    #[inline]
    pub fn check_string(&self, len: usize) -> Result<(), Error> {
        if len > self.max_string_len {
            return Err(Error::LengthExceeded(len, self.max_string_len));
        }
        Ok(())
    }

    /// Returns an error if `count` exceeds the maximum element count.
    #[inline]
    pub fn check_elements(&self, count: usize) -> Result<(), Error> {
        if count > self.max_elements {
            return Err(Error::LengthExceeded(count, self.max_elements));
        }
        Ok(())
    }
}
