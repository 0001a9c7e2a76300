//! Core codec traits

use crate::{Buffer, Error, Limits, Mode};
use bytes::Bytes;

/// Trait for types that can be written (encoded) to a [Buffer].
pub trait Write {
    /// Encodes this value at the write cursor of `buf`.
    ///
    /// Implementations write exactly [EncodeSize::encode_size] bytes. [Buffer::write] reserves
    /// that many bytes before calling this method, so nested writes never trigger growth.
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error>;
}

/// Trait for types whose encoded length can be computed without encoding them.
pub trait EncodeSize {
    /// Returns the exact number of bytes [Write::write_to] produces for this value.
    fn encode_size(&self) -> usize;
}

/// Trait for types with a known, fixed encoded length.
pub trait FixedSize: EncodeSize {
    /// The length of every encoded value.
    const SIZE: usize;
}

/// Trait for types that can be read (decoded) from a [Buffer].
pub trait Read: Sized {
    /// Decodes a value at the read cursor of `buf`, consuming the bytes it occupies.
    ///
    /// Every length prefix is checked against `limits` before anything is allocated.
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error>;
}

/// Trait for types that can be both encoded and decoded.
pub trait Codec: Write + EncodeSize + Read {}

impl<T: Write + EncodeSize + Read> Codec for T {}

/// Extension trait for encoding a value into a freshly allocated, exactly sized buffer.
pub trait Encode: Write + EncodeSize {
    /// Encodes this value into [Bytes].
    fn encode(&self) -> Bytes {
        let mut buf = Buffer::new(self.encode_size());
        if let Err(err) = buf.write(self) {
            // The buffer is sized by encode_size(), so only a broken implementation fails here
            panic!("encode_size() is smaller than the bytes written: {err}");
        }
        Bytes::from(buf.into_vec())
    }
}

impl<T: Write + EncodeSize + ?Sized> Encode for T {}

/// Extension trait for decoding a value that occupies an entire byte slice.
pub trait Decode: Read {
    /// Decodes a value from `bytes` using `limits`, rejecting trailing bytes.
    fn decode_cfg(bytes: &[u8], limits: &Limits) -> Result<Self, Error> {
        let mut buf = Buffer::wrap_read_only(bytes).with_limits(*limits);
        let value = buf.read()?;
        let remaining = buf.data_size();
        if remaining > 0 {
            return Err(Error::ExtraData(remaining));
        }
        Ok(value)
    }

    /// Decodes a value from `bytes` using the default [Limits], rejecting trailing bytes.
    fn decode(bytes: &[u8]) -> Result<Self, Error> {
        Self::decode_cfg(bytes, &Limits::default())
    }
}

impl<T: Read> Decode for T {}

/// Returns the number of bytes `value` occupies once written.
#[inline]
pub fn encoded_size<T: EncodeSize + ?Sized>(value: &T) -> usize {
    value.encode_size()
}

/// Returns the number of bytes any value of type `T` occupies once written.
#[inline]
pub fn encoded_size_of<T: FixedSize>() -> usize {
    T::SIZE
}

/// Size of every length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Writes a `u32` length prefix.
#[inline]
pub fn write_len<M: Mode>(buf: &mut Buffer<'_, M>, len: usize) -> Result<(), Error> {
    let len = u32::try_from(len).map_err(|_| Error::LengthExceeded(len, u32::MAX as usize))?;
    buf.put_slice(&len.to_le_bytes())
}

/// Reads a `u32` length prefix and rejects values above `max`.
#[inline]
pub fn read_len<M: Mode>(buf: &mut Buffer<'_, M>, max: usize) -> Result<usize, Error> {
    let len = u32::from_le_bytes(buf.get_array()?) as usize;
    if len > max {
        return Err(Error::LengthExceeded(len, max));
    }
    Ok(len)
}

/// Implements [Write], [EncodeSize] and [Read] for a struct with named fields.
///
/// Fields are encoded in the order listed, each with its own codec. Every listed field must
/// implement [Codec] and every field of the struct must be listed.
///
/// # Example
///
/// ```
/// use conduit_buffer::{impl_codec, Buffer};
///
/// #[derive(Debug, PartialEq)]
/// struct Login {
///     user: String,
///     session: u64,
///     flags: Vec<bool>,
/// }
///
/// impl_codec!(Login { user, session, flags });
///
/// let login = Login { user: "ann".into(), session: 9, flags: vec![true] };
/// let mut buf = Buffer::new(Buffer::encoded_size(&login));
/// buf.write(&login).unwrap();
/// assert_eq!(buf.free_size(), 0);
/// assert_eq!(buf.read::<Login>().unwrap(), login);
/// ```
#[macro_export]
macro_rules! impl_codec {
    ($type:ident { $($field:ident),* $(,)? }) => {
        impl $crate::Write for $type {
            #[allow(unused_variables)]
            fn write_to<M: $crate::Mode>(
                &self,
                buf: &mut $crate::Buffer<'_, M>,
            ) -> ::core::result::Result<(), $crate::Error> {
                $( $crate::Write::write_to(&self.$field, buf)?; )*
                Ok(())
            }
        }

        impl $crate::EncodeSize for $type {
            fn encode_size(&self) -> usize {
                0 $( + $crate::EncodeSize::encode_size(&self.$field) )*
            }
        }

        impl $crate::Read for $type {
            #[allow(unused_variables)]
            fn read_cfg<M: $crate::Mode>(
                buf: &mut $crate::Buffer<'_, M>,
                limits: &$crate::Limits,
            ) -> ::core::result::Result<Self, $crate::Error> {
                Ok(Self {
                    $( $field: $crate::Read::read_cfg(buf, limits)?, )*
                })
            }
        }
    };
}
