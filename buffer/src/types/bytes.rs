//! Codec implementations for strings, byte strings and nested buffers.
//!
//! Each is written as a `u32` byte length followed by the raw bytes. Strings are bounded
//! by [Limits::max_string_len], everything else by [Limits::max_elements].

use crate::{
    codec::{read_len, write_len, LENGTH_PREFIX_SIZE},
    Buffer, EncodeSize, Error, Limits, Mode, Plain, Read, Write,
};
use bytes::Bytes;

/// Reads `len` bytes into a new vector, checking availability before allocating.
fn read_vec<M: Mode>(buf: &mut Buffer<'_, M>, len: usize) -> Result<Vec<u8>, Error> {
    let available = buf.data_size();
    if len > available {
        return Err(Error::EndOfBuffer {
            needed: len,
            available,
        });
    }
    let mut vec = vec![0; len];
    buf.get_slice(&mut vec)?;
    Ok(vec)
}

impl Write for str {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_len(buf, self.len())?;
        buf.put_slice(self.as_bytes())
    }
}

impl EncodeSize for str {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.len()
    }
}

impl Write for String {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        self.as_str().write_to(buf)
    }
}

impl EncodeSize for String {
    #[inline]
    fn encode_size(&self) -> usize {
        self.as_str().encode_size()
    }
}

impl Read for String {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let len = read_len(buf, limits.max_string_len)?;
        let vec = read_vec(buf, len)?;
        String::from_utf8(vec).map_err(|_| Error::InvalidData("String", "invalid UTF-8"))
    }
}

impl Write for Bytes {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        write_len(buf, self.len())?;
        buf.put_slice(self)
    }
}

impl EncodeSize for Bytes {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.len()
    }
}

impl Read for Bytes {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let len = read_len(buf, limits.max_elements)?;
        read_vec(buf, len).map(Bytes::from)
    }
}

// Nested buffers embed their unread data (without consuming it)
impl<N: Mode> Write for Buffer<'_, N> {
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        let ranges = self.data_ranges();
        write_len(buf, ranges.len())?;
        for span in ranges.iter() {
            buf.put_slice(span)?;
        }
        Ok(())
    }
}

impl<N: Mode> EncodeSize for Buffer<'_, N> {
    #[inline]
    fn encode_size(&self) -> usize {
        LENGTH_PREFIX_SIZE + self.data_size()
    }
}

// Decoded buffers are read-only views (shared with the source when it is backed by `Bytes`)
impl Read for Buffer<'static, Plain> {
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
        let len = read_len(buf, limits.max_elements)?;
        buf.slice(len)
    }
}

#[cfg(test)]
mod tests {
    use crate::{Buffer, Decode, Encode, EncodeSize, Error, Limits};
    use bytes::Bytes;

    #[test]
    fn test_string() {
        let long = "x".repeat(8192);
        for value in ["", "hello", "ünïcødé", long.as_str()] {
            let encoded = value.encode();
            assert_eq!(encoded.len(), 4 + value.len());
            assert_eq!(&encoded[..4], &(value.len() as u32).to_le_bytes());
            assert_eq!(String::decode(&encoded).unwrap(), value);
            assert_eq!(value.to_string().encode_size(), encoded.len());
        }
    }

    #[test]
    fn test_string_too_long() {
        let encoded = "x".repeat(8193).encode();
        let err = String::decode(&encoded).unwrap_err();
        assert_eq!(err, Error::LengthExceeded(8193, 8192));
        assert!(err.is_malformed());

        // Custom limits apply
        let limits = Limits::new(2, 16);
        assert_eq!(
            String::decode_cfg(&"abc".encode(), &limits),
            Err(Error::LengthExceeded(3, 2))
        );
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf = Buffer::new(6);
        buf.write(&2u32).unwrap();
        buf.put_slice(&[0xff, 0xfe]).unwrap();
        assert_eq!(
            buf.read::<String>(),
            Err(Error::InvalidData("String", "invalid UTF-8"))
        );
        // The cursor is restored on failure
        assert_eq!(buf.rpos(), 0);
    }

    #[test]
    fn test_truncated_string() {
        // A length prefix promising more bytes than exist is rejected before allocating
        let mut encoded = 5000u32.to_le_bytes().to_vec();
        encoded.extend_from_slice(b"abc");
        assert_eq!(
            String::decode(&encoded),
            Err(Error::EndOfBuffer {
                needed: 5000,
                available: 3
            })
        );
    }

    #[test]
    fn test_bytes() {
        let values = [
            Bytes::new(),
            Bytes::from_static(&[1, 2, 3]),
            Bytes::from(vec![0; 300]),
        ];
        for value in values {
            let encoded = value.encode();
            assert_eq!(encoded.len(), 4 + value.len());
            assert_eq!(Bytes::decode(&encoded).unwrap(), value);
        }
        assert_eq!(
            Bytes::decode_cfg(&Bytes::from(vec![0; 17]).encode(), &Limits::new(0, 16)),
            Err(Error::LengthExceeded(17, 16))
        );
    }

    #[test]
    fn test_nested_buffer() {
        let mut inner = Buffer::circular(6);
        inner.put_slice(&[1, 2, 3, 4]).unwrap();
        inner.rskip(3).unwrap();
        inner.put_slice(&[5, 6, 7]).unwrap();

        let mut outer = Buffer::new(Buffer::encoded_size(&inner) + 1);
        outer.write(&9u8).unwrap();
        outer.write(&inner).unwrap();
        assert_eq!(outer.free_size(), 0);
        assert_eq!(inner.data_size(), 4);

        let mut outer = Buffer::from_bytes(Bytes::from(outer.into_vec()));
        assert_eq!(outer.read::<u8>().unwrap(), 9);
        let nested = outer.read::<Buffer>().unwrap();
        assert!(nested.is_read_only());
        assert_eq!(nested.chunk(), &[4, 5, 6, 7]);
        assert!(outer.is_empty());
    }
}
