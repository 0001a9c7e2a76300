//! Codec implementation for fixed-size arrays.
//!
//! `[T; N]` is written as a `u32` prefix holding the in-memory byte length of the array
//! (`N * size_of::<T>()`), followed by the `N` encoded elements. For flat element types
//! such as `[u8; N]` or `[u32; N]` the payload is exactly the array's bytes (little-endian).

use crate::{
    codec::{read_len, write_len, LENGTH_PREFIX_SIZE},
    Buffer, EncodeSize, Error, FixedSize, Limits, Mode, Read, Write,
};
use std::mem::size_of;

/// Value of the length prefix written before a `[T; N]`.
#[inline]
const fn prefix<T, const N: usize>() -> usize {
    N * size_of::<T>()
}

impl<T: Write, const N: usize> Write for [T; N] {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_len(buf, prefix::<T, N>())?;
        for item in self {
            item.write_to(buf)?;
        }
        Ok(())
    }
}

impl<T: EncodeSize, const N: usize> EncodeSize for [T; N] {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.iter().map(EncodeSize::encode_size).sum::<usize>()
    }
}

impl<T: FixedSize, const N: usize> FixedSize for [T; N] {
    const SIZE: usize = LENGTH_PREFIX_SIZE + N * T::SIZE;
}

impl<T: Read, const N: usize> Read for [T; N] {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        limits.check_elements(N)?;
        let expected = prefix::<T, N>();
        if read_len(buf, expected)? != expected {
            return Err(Error::InvalidData("array", "length prefix mismatch"));
        }
        let mut items = Vec::with_capacity(N);
        for _ in 0..N {
            items.push(T::read_cfg(buf, limits)?);
        }
        items
            .try_into()
            .map_err(|_| Error::InvalidData("array", "element count mismatch"))
    }
}
