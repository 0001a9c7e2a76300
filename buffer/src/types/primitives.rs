//! Codec implementations for Rust primitive types.
//!
//! Integers and floats are written little-endian with no prefix, `size_of::<T>()` bytes
//! each. `bool` always occupies one byte (`0` or `1`).

use crate::{Buffer, EncodeSize, Error, FixedSize, Limits, Mode, Read, Write};

// Numeric types implementation
macro_rules! impl_numeric {
    ($type:ty) => {
        impl Write for $type {
            #[inline]
            fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
                buf.put_slice(&self.to_le_bytes())
            }
        }

        impl Read for $type {
            #[inline]
            fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, _: &Limits) -> Result<Self, Error> {
                Ok(<$type>::from_le_bytes(buf.get_array()?))
            }
        }

        impl EncodeSize for $type {
            #[inline]
            fn encode_size(&self) -> usize {
                Self::SIZE
            }
        }

        impl FixedSize for $type {
            const SIZE: usize = std::mem::size_of::<$type>();
        }
    };
}

impl_numeric!(u8);
impl_numeric!(u16);
impl_numeric!(u32);
impl_numeric!(u64);
impl_numeric!(u128);
impl_numeric!(i8);
impl_numeric!(i16);
impl_numeric!(i32);
impl_numeric!(i64);
impl_numeric!(i128);
impl_numeric!(f32);
impl_numeric!(f64);

// Bool implementation
impl Write for bool {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        u8::from(*self).write_to(buf)
    }
}

impl Read for bool {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        match u8::read_cfg(buf, limits)? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::InvalidBool(other)),
        }
    }
}

impl EncodeSize for bool {
    #[inline]
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

impl FixedSize for bool {
    const SIZE: usize = 1;
}

// Unit implementation
impl Write for () {
    #[inline]
    fn write_to<M: Mode>(&self, _: &mut Buffer<'_, M>) -> Result<(), Error> {
        Ok(())
    }
}

impl Read for () {
    #[inline]
    fn read_cfg<M: Mode>(_: &mut Buffer<'_, M>, _: &Limits) -> Result<Self, Error> {
        Ok(())
    }
}

impl EncodeSize for () {
    #[inline]
    fn encode_size(&self) -> usize {
        0
    }
}

impl FixedSize for () {
    const SIZE: usize = 0;
}

// Option implementation
impl<T: Write> Write for Option<T> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        self.is_some().write_to(buf)?;
        if let Some(inner) = self {
            inner.write_to(buf)?;
        }
        Ok(())
    }
}

impl<T: EncodeSize> EncodeSize for Option<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        match self {
            Some(inner) => 1 + inner.encode_size(),
            None => 1,
        }
    }
}

impl<T: Read> Read for Option<T> {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        if bool::read_cfg(buf, limits)? {
            Ok(Some(T::read_cfg(buf, limits)?))
        } else {
            Ok(None)
        }
    }
}

// References encode like the value they point to
impl<T: Write + ?Sized> Write for &T {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        (**self).write_to(buf)
    }
}

impl<T: EncodeSize + ?Sized> EncodeSize for &T {
    #[inline]
    fn encode_size(&self) -> usize {
        (**self).encode_size()
    }
}

impl<T: Write + ?Sized> Write for Box<T> {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        (**self).write_to(buf)
    }
}

impl<T: EncodeSize + ?Sized> EncodeSize for Box<T> {
    #[inline]
    fn encode_size(&self) -> usize {
        (**self).encode_size()
    }
}

impl<T: Read> Read for Box<T> {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        T::read_cfg(buf, limits).map(Box::new)
    }
}
