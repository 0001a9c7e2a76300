//! Codec implementations for tuples.
//!
//! Tuples are the concatenation of their elements, with no prefix.

use crate::{Buffer, EncodeSize, Error, FixedSize, Limits, Mode, Read, Write};
use paste::paste;

macro_rules! impl_codec_for_tuple {
    ($($index:literal),*) => {
        paste! {
            impl<$( [<T $index>]: EncodeSize ),*> EncodeSize for ( $( [<T $index>], )* ) {
                #[inline]
                fn encode_size(&self) -> usize {
                    0 $( + self.$index.encode_size() )*
                }
            }

            impl<$( [<T $index>]: FixedSize ),*> FixedSize for ( $( [<T $index>], )* ) {
                const SIZE: usize = 0 $( + [<T $index>]::SIZE )*;
            }

            impl<$( [<T $index>]: Write ),*> Write for ( $( [<T $index>], )* ) {
                #[inline]
                fn write_to<M: Mode>(&self, buf: &mut Buffer<'_, M>) -> Result<(), Error> {
                    $( self.$index.write_to(buf)?; )*
                    Ok(())
                }
            }

            impl<$( [<T $index>]: Read ),*> Read for ( $( [<T $index>], )* ) {
                #[inline]
                fn read_cfg<M: Mode>(buf: &mut Buffer<'_, M>, limits: &Limits) -> Result<Self, Error> {
                    Ok(( $( [<T $index>]::read_cfg(buf, limits)?, )* ))
                }
            }
        }
    };
}

// Generate implementations for tuple sizes 1 through 8
impl_codec_for_tuple!(0);
impl_codec_for_tuple!(0, 1);
impl_codec_for_tuple!(0, 1, 2);
impl_codec_for_tuple!(0, 1, 2, 3);
impl_codec_for_tuple!(0, 1, 2, 3, 4);
impl_codec_for_tuple!(0, 1, 2, 3, 4, 5);
impl_codec_for_tuple!(0, 1, 2, 3, 4, 5, 6);
impl_codec_for_tuple!(0, 1, 2, 3, 4, 5, 6, 7);
