//! Codec implementation for [Uuid] (its 16 raw bytes, no prefix).

use crate::{Buffer, EncodeSize, Error, FixedSize, Limits, Mode, Read, Write};
use uuid::Uuid;

impl Write for Uuid {
    #[inline]
    fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
        buf.put_slice(self.as_bytes())
    }
}

impl Read for Uuid {
    #[inline]
    fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, _: &Limits) -> Result<Self, Error> {
        Ok(Uuid::from_bytes(buf.get_array()?))
    }
}

impl EncodeSize for Uuid {
    #[inline]
    fn encode_size(&self) -> usize {
        Self::SIZE
    }
}

impl FixedSize for Uuid {
    const SIZE: usize = 16;
}
