//! Portable error codes.

use crate::{Buffer, EncodeSize, Error, FixedSize, Limits, Mode, Read, Write};
use std::fmt;

/// Domain an [ErrorCode] value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Category {
    /// Operating system errors (`errno` or `GetLastError` values).
    System,
    /// Platform-independent errors defined by the application.
    Generic,
    /// POSIX `errno` values.
    Posix,
}

impl Category {
    /// Returns the tag written on the wire.
    pub const fn tag(self) -> i32 {
        match self {
            Category::System => 0,
            Category::Generic => 1,
            Category::Posix => 2,
        }
    }
}

impl TryFrom<i32> for Category {
    type Error = Error;

    fn try_from(tag: i32) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(Category::System),
            1 => Ok(Category::Generic),
            2 => Ok(Category::Posix),
            other => Err(Error::InvalidCategory(other)),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::System => f.write_str("system"),
            Category::Generic => f.write_str("generic"),
            Category::Posix => f.write_str("posix"),
        }
    }
}

/// An error value tagged with its [Category], encoded as two `i32`s (value, then tag).
///
/// A value of zero means success in every category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    pub value: i32,
    pub category: Category,
}

impl ErrorCode {
    pub const fn new(value: i32, category: Category) -> Self {
        Self { value, category }
    }

    pub const fn system(value: i32) -> Self {
        Self::new(value, Category::System)
    }

    pub const fn generic(value: i32) -> Self {
        Self::new(value, Category::Generic)
    }

    pub const fn posix(value: i32) -> Self {
        Self::new(value, Category::Posix)
    }

    /// Returns true if the code signals success.
    pub const fn is_ok(&self) -> bool {
        self.value == 0
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        Self::system(0)
    }
}

impl From<&std::io::Error> for ErrorCode {
    /// Errors carrying an OS code map to [Category::System]; all others to a generic `-1`.
    fn from(err: &std::io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self::system(code),
            None => Self::generic(-1),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.value)
    }
}

impl Write for ErrorCode {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        self.value.write_to(buf)?;
        self.category.tag().write_to(buf)
    }
}

impl Read for ErrorCode {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let value = i32::read_cfg(buf, limits)?;
        let category = Category::try_from(i32::read_cfg(buf, limits)?)?;
        Ok(Self { value, category })
    }
}

impl EncodeSize for ErrorCode {
    #[inline]
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

impl FixedSize for ErrorCode {
    const SIZE: usize = 2 * i32::SIZE;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Decode, Encode};

    #[test]
    fn test_error_code() {
        for code in [
            ErrorCode::default(),
            ErrorCode::system(2),
            ErrorCode::generic(-7),
            ErrorCode::posix(104),
        ] {
            let encoded = code.encode();
            assert_eq!(encoded.len(), 8);
            assert_eq!(&encoded[4..], &code.category.tag().to_le_bytes());
            assert_eq!(ErrorCode::decode(&encoded).unwrap(), code);
        }
    }

    #[test]
    fn test_unknown_category() {
        let mut encoded = 5i32.encode().to_vec();
        encoded.extend_from_slice(&3i32.to_le_bytes());
        let err = ErrorCode::decode(&encoded).unwrap_err();
        assert_eq!(err, Error::InvalidCategory(3));
        assert!(err.is_malformed());
    }

    #[test]
    fn test_from_io() {
        let err = std::io::Error::from_raw_os_error(11);
        assert_eq!(ErrorCode::from(&err), ErrorCode::system(11));
        let err = std::io::Error::other("custom");
        assert_eq!(ErrorCode::from(&err), ErrorCode::generic(-1));
        assert_eq!(ErrorCode::posix(1).to_string(), "posix:1");
        assert!(ErrorCode::default().is_ok());
    }
}
