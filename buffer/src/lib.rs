//! Read and write typed values to plain and circular byte buffers.
//!
//! # Overview
//!
//! A [Buffer] owns (or borrows) a byte region with independent read and write cursors. Values
//! are encoded at the write cursor with [Buffer::write] and decoded at the read cursor with
//! [Buffer::read]. The same API works in two addressing modes:
//!
//! - [Plain]: a linear region, compacted explicitly with [Buffer::crunch].
//! - [Circular] (see [CircularBuffer]): a ring that reuses consumed space automatically.
//!
//! Buffers either have a fixed size (writes that do not fit fail with
//! [Error::InsufficientSpace]) or grow on demand to the next power of two.
//!
//! # Wire Format
//!
//! All scalars and length prefixes are little-endian.
//!
//! | Type                                   | Encoding                                        |
//! |----------------------------------------|-------------------------------------------------|
//! | `u8`..`u128`, `i8`..`i128`, `f32`, `f64` | `size_of::<T>()` bytes                        |
//! | `bool`                                 | 1 byte, `0` or `1`                              |
//! | [uuid::Uuid]                           | 16 raw bytes                                    |
//! | `String`, `str`, [bytes::Bytes], [Buffer] | `u32` byte length, then the bytes            |
//! | `Vec`, `VecDeque`, `LinkedList`, sets  | `u32` element count, then each element          |
//! | `BTreeMap`, `HashMap`                  | `u32` entry count, then key and value per entry |
//! | `[T; N]`                               | `u32` of `N * size_of::<T>()`, then each element |
//! | `Option<T>`                            | `bool` tag, then the value if present           |
//! | tuples (up to 8)                       | each element in order                           |
//! | [ErrorCode]                            | `i32` value, then `i32` category tag (0, 1, 2)  |
//!
//! Decoding checks every length prefix against the buffer's [Limits] before allocating,
//! so untrusted input cannot trigger unbounded allocations. Errors caused by malformed input
//! are distinguished with [Error::is_malformed].
//!
//! # Example
//!
//! ```
//! use conduit_buffer::{impl_codec, Buffer, Error};
//!
//! #[derive(Debug, PartialEq)]
//! struct Move {
//!     entity: u64,
//!     position: (f32, f32, f32),
//!     tags: Vec<String>,
//! }
//!
//! impl_codec!(Move { entity, position, tags });
//!
//! let message = Move { entity: 7, position: (1.0, 2.0, 0.5), tags: vec!["run".into()] };
//!
//! // Size the buffer exactly
//! let mut buf = Buffer::new(Buffer::encoded_size(&message));
//! buf.write(&message)?;
//! assert_eq!(buf.free_size(), 0);
//!
//! // A truncated message leaves the read cursor untouched
//! let mut truncated = Buffer::wrap_read_only(&buf.chunk()[..10]);
//! assert!(matches!(truncated.read::<Move>(), Err(Error::EndOfBuffer { .. })));
//! assert_eq!(truncated.rpos(), 0);
//!
//! assert_eq!(buf.read::<Move>()?, message);
//! # Ok::<(), Error>(())
//! ```

mod buffer;
pub mod codec;
pub mod config;
pub mod error;
pub mod mode;
pub mod ring;
pub mod types;

pub use buffer::{Buffer, CircularBuffer, DataRanges};
pub use codec::{encoded_size, encoded_size_of, Codec, Decode, Encode, EncodeSize, FixedSize, Read, Write};
pub use config::Limits;
pub use error::Error;
pub use mode::{Circular, Mode, Plain};
pub use types::error_code::{Category, ErrorCode};
