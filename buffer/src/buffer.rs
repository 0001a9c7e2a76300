//! A byte region with independent read and write cursors.

use crate::{
    mode::{Circular, Mode, Plain},
    EncodeSize, Error, FixedSize, Limits, Read, Write,
};
use bytes::Bytes;
use conduit_utils::bits::next_power_of_two;
use std::{any::Any, fmt, io::IoSlice, marker::PhantomData};
use tracing::debug;

/// Backing bytes of a [Buffer].
enum Storage<'a> {
    /// Heap memory owned (and freed) by the buffer. The only storage that can grow.
    Owned(Vec<u8>),
    /// Caller-owned memory the buffer may write to.
    Borrowed(&'a mut [u8]),
    /// Caller-owned memory the buffer may only read from.
    ReadOnly(&'a [u8]),
    /// Reference-counted, immutable memory.
    Shared(Bytes),
}

impl Storage<'_> {
    #[inline]
    fn bytes(&self) -> &[u8] {
        match self {
            Storage::Owned(vec) => vec.as_slice(),
            Storage::Borrowed(slice) => &slice[..],
            Storage::ReadOnly(slice) => slice,
            Storage::Shared(bytes) => &bytes[..],
        }
    }

    #[inline]
    fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            Storage::Owned(vec) => Some(vec.as_mut_slice()),
            Storage::Borrowed(slice) => Some(&mut slice[..]),
            Storage::ReadOnly(_) | Storage::Shared(_) => None,
        }
    }

    #[inline]
    fn is_read_only(&self) -> bool {
        matches!(self, Storage::ReadOnly(_) | Storage::Shared(_))
    }
}

/// A reusable byte region for reading and writing typed values.
///
/// Bytes are written at the write cursor ([Buffer::wpos]) and read at the read cursor
/// ([Buffer::rpos]). The region between the two holds unread data. How cursors map onto the
/// backing bytes is selected by the mode parameter:
///
/// - [Plain]: cursors only move forward until [Buffer::clear] or [Buffer::crunch].
/// - [Circular]: cursors wrap around the end of the backing bytes (see [CircularBuffer]).
///
/// All fallible operations return an [Error] and leave the buffer unchanged when they fail.
///
/// # Example
///
/// ```
/// use conduit_buffer::Buffer;
///
/// let mut buf = Buffer::new(128);
/// buf.write(&1234i32).unwrap();
/// buf.write(&56.0f32).unwrap();
/// buf.write("hello").unwrap();
/// assert_eq!(buf.data_size(), 4 + 4 + 4 + 5);
///
/// assert_eq!(buf.read::<i32>().unwrap(), 1234);
/// assert_eq!(buf.read::<f32>().unwrap(), 56.0);
/// assert_eq!(buf.read::<String>().unwrap(), "hello");
/// assert!(buf.is_empty());
/// ```
pub struct Buffer<'a, M: Mode = Plain> {
    storage: Storage<'a>,
    read_pos: usize,
    write_pos: usize,
    read_mark: usize,
    write_mark: usize,
    on_demand: bool,
    limits: Limits,
    context: Option<Box<dyn Any + Send + Sync>>,
    _mode: PhantomData<M>,
}

/// A [Buffer] with ring addressing.
///
/// One byte of the backing storage is reserved so that equal cursors always mean "empty".
/// A circular buffer created with capacity `N` therefore holds exactly `N` bytes of data.
///
/// # Example
///
/// ```
/// use conduit_buffer::Buffer;
///
/// let mut ring = Buffer::circular(12);
/// for value in [1i32, 2, 3] {
///     ring.write(&value).unwrap();
/// }
/// assert_eq!(ring.free_size(), 0);
/// ring.read::<i32>().unwrap();
/// ring.write(&4i32).unwrap(); // wraps around the end
/// assert_eq!(ring.read::<(i32, i32, i32)>().unwrap(), (2, 3, 4));
/// ```
pub type CircularBuffer<'a> = Buffer<'a, Circular>;

impl Buffer<'static, Plain> {
    /// Creates an owned, fixed-size buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self::from_storage(Storage::Owned(vec![0; size]), 0, false)
    }

    /// Creates an owned buffer of `size` bytes that grows (to the next power of two) instead
    /// of failing when a write would overflow.
    pub fn on_demand(size: usize) -> Self {
        Self::from_storage(Storage::Owned(vec![0; size]), 0, true)
    }

    /// Creates a fixed-size buffer that owns `vec` and treats all of it as unread data.
    pub fn from_vec(vec: Vec<u8>) -> Self {
        let len = vec.len();
        Self::from_storage(Storage::Owned(vec), len, false)
    }

    /// Creates a read-only buffer over shared `bytes`, all of which is unread data.
    ///
    /// [Buffer::slice] on such a buffer does not copy.
    pub fn from_bytes(bytes: Bytes) -> Self {
        let len = bytes.len();
        Self::from_storage(Storage::Shared(bytes), len, false)
    }

    /// Returns the number of bytes [Buffer::write] consumes for `value`.
    #[inline]
    pub fn encoded_size<T: EncodeSize + ?Sized>(value: &T) -> usize {
        value.encode_size()
    }

    /// Returns the number of bytes [Buffer::write] consumes for any value of type `T`.
    #[inline]
    pub fn encoded_size_of<T: FixedSize>() -> usize {
        T::SIZE
    }
}

impl<'a> Buffer<'a, Plain> {
    /// Creates an empty buffer that writes into caller-owned memory.
    pub fn wrap(data: &'a mut [u8]) -> Self {
        Self::from_storage(Storage::Borrowed(data), 0, false)
    }

    /// Creates a read-only buffer over caller-owned memory, all of which is unread data.
    ///
    /// Any attempt to write returns [Error::ReadOnly].
    pub fn wrap_read_only(data: &'a [u8]) -> Self {
        let len = data.len();
        Self::from_storage(Storage::ReadOnly(data), len, false)
    }

    /// Returns the unread data as one contiguous slice.
    pub fn chunk(&self) -> &[u8] {
        &self.storage.bytes()[self.read_pos..self.write_pos]
    }
}

impl Buffer<'static, Circular> {
    /// Creates an owned, fixed-capacity ring that holds `capacity` bytes.
    pub fn circular(capacity: usize) -> Self {
        Self::from_storage(Storage::Owned(vec![0; capacity + 1]), 0, false)
    }

    /// Creates an owned ring that grows instead of failing when a write would overflow.
    pub fn circular_on_demand(capacity: usize) -> Self {
        Self::from_storage(Storage::Owned(vec![0; capacity + 1]), 0, true)
    }
}

impl<'a> Buffer<'a, Circular> {
    /// Creates an empty ring over caller-owned memory.
    ///
    /// The ring holds `data.len() - 1` bytes.
    pub fn wrap_circular(data: &'a mut [u8]) -> Self {
        Self::from_storage(Storage::Borrowed(data), 0, false)
    }
}

impl<'a, M: Mode> Buffer<'a, M> {
    fn from_storage(storage: Storage<'a>, write_pos: usize, on_demand: bool) -> Self {
        Self {
            storage,
            read_pos: 0,
            write_pos,
            read_mark: 0,
            write_mark: 0,
            on_demand,
            limits: Limits::default(),
            context: None,
            _mode: PhantomData,
        }
    }

    /// Replaces the [Limits] enforced when decoding from this buffer.
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Returns the [Limits] enforced when decoding from this buffer.
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Total size of the backing storage (including the reserved byte of a ring).
    #[inline]
    pub fn allocated_size(&self) -> usize {
        self.storage.bytes().len()
    }

    /// Number of bytes the buffer can hold (without growing).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.allocated_size().saturating_sub(M::RESERVED)
    }

    /// Number of unread bytes.
    #[inline]
    pub fn data_size(&self) -> usize {
        if M::CIRCULAR && self.write_pos < self.read_pos {
            self.allocated_size() - self.read_pos + self.write_pos
        } else {
            self.write_pos - self.read_pos
        }
    }

    /// Number of bytes that can be written (without growing).
    #[inline]
    pub fn free_size(&self) -> usize {
        if M::CIRCULAR {
            self.capacity() - self.data_size()
        } else {
            self.allocated_size() - self.write_pos
        }
    }

    /// Returns true if there is no unread data.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.read_pos == self.write_pos
    }

    /// Returns true if writes are rejected.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.storage.is_read_only()
    }

    /// Returns true if the buffer grows instead of failing when full.
    #[inline]
    pub fn is_on_demand(&self) -> bool {
        self.on_demand
    }

    #[inline]
    fn forward(&self, pos: usize, n: usize) -> usize {
        if M::CIRCULAR {
            let allocated = self.allocated_size();
            if allocated == 0 {
                return 0;
            }
            (pos + n) % allocated
        } else {
            pos + n
        }
    }

    #[inline]
    fn backward(&self, pos: usize, n: usize) -> usize {
        if M::CIRCULAR {
            let allocated = self.allocated_size();
            if allocated == 0 {
                return 0;
            }
            (pos + allocated - n) % allocated
        } else {
            pos - n
        }
    }

    /// Position of the read cursor.
    #[inline]
    pub fn rpos(&self) -> usize {
        self.read_pos
    }

    /// Position of the write cursor.
    #[inline]
    pub fn wpos(&self) -> usize {
        self.write_pos
    }

    /// Moves the read cursor to an absolute position.
    ///
    /// In plain mode the read cursor can never pass the write cursor.
    pub fn set_rpos(&mut self, pos: usize) -> Result<(), Error> {
        let limit = if M::CIRCULAR {
            self.allocated_size().saturating_sub(1)
        } else {
            self.write_pos
        };
        if pos > limit {
            return Err(Error::InvalidPosition {
                position: pos,
                limit,
            });
        }
        self.read_pos = pos;
        Ok(())
    }

    /// Moves the write cursor to an absolute position.
    ///
    /// In plain mode the write cursor must stay between the read cursor and the end of
    /// the backing storage.
    pub fn set_wpos(&mut self, pos: usize) -> Result<(), Error> {
        if M::CIRCULAR {
            let limit = self.allocated_size().saturating_sub(1);
            if pos > limit {
                return Err(Error::InvalidPosition {
                    position: pos,
                    limit,
                });
            }
        } else if pos < self.read_pos || pos > self.allocated_size() {
            return Err(Error::InvalidPosition {
                position: pos,
                limit: self.allocated_size(),
            });
        }
        self.write_pos = pos;
        Ok(())
    }

    /// Skips `n` unread bytes.
    pub fn rskip(&mut self, n: usize) -> Result<(), Error> {
        let available = self.data_size();
        if n > available {
            return Err(Error::EndOfBuffer {
                needed: n,
                available,
            });
        }
        self.read_pos = self.forward(self.read_pos, n);
        Ok(())
    }

    /// Advances the write cursor by `n` bytes, committing whatever they contain.
    ///
    /// Used after filling [Buffer::write_ranges] directly.
    pub fn wskip(&mut self, n: usize) -> Result<(), Error> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        self.reserve(n)?;
        self.write_pos = self.forward(self.write_pos, n);
        Ok(())
    }

    /// Moves the read cursor back by `n` bytes, making them unread again.
    pub fn rrev(&mut self, n: usize) -> Result<(), Error> {
        let limit = if M::CIRCULAR {
            self.free_size()
        } else {
            self.read_pos
        };
        if n > limit {
            return Err(Error::InvalidPosition { position: n, limit });
        }
        self.read_pos = self.backward(self.read_pos, n);
        Ok(())
    }

    /// Moves the write cursor back by `n` bytes, discarding the most recent unread data.
    pub fn wrev(&mut self, n: usize) -> Result<(), Error> {
        let limit = self.data_size();
        if n > limit {
            return Err(Error::InvalidPosition { position: n, limit });
        }
        self.write_pos = self.backward(self.write_pos, n);
        Ok(())
    }

    /// Records both cursors.
    pub fn mark(&mut self) {
        self.mark_read();
        self.mark_write();
    }

    /// Records the read cursor.
    pub fn mark_read(&mut self) {
        self.read_mark = self.read_pos;
    }

    /// Records the write cursor.
    pub fn mark_write(&mut self) {
        self.write_mark = self.write_pos;
    }

    /// Restores both cursors to their last recorded positions.
    ///
    /// Fails with [Error::InvalidPosition] (leaving both cursors untouched) if the recorded
    /// pair is not a valid cursor pair, which can happen when the marks were taken at
    /// different times.
    pub fn reset(&mut self) -> Result<(), Error> {
        let (read, write) = (self.read_pos, self.write_pos);

        // Restore whichever cursor keeps the pair ordered first
        let result = if self.write_mark >= self.read_pos {
            self.reset_write().and_then(|_| self.reset_read())
        } else {
            self.reset_read().and_then(|_| self.reset_write())
        };
        if result.is_err() {
            self.read_pos = read;
            self.write_pos = write;
        }
        result
    }

    /// Restores the read cursor to its last recorded position.
    ///
    /// Checked like [Self::set_rpos]: in plain mode the mark must not lie past the write
    /// cursor.
    pub fn reset_read(&mut self) -> Result<(), Error> {
        self.set_rpos(self.read_mark)
    }

    /// Restores the write cursor to its last recorded position.
    ///
    /// Checked like [Self::set_wpos]: in plain mode the mark must not lie before the read
    /// cursor.
    pub fn reset_write(&mut self) -> Result<(), Error> {
        self.set_wpos(self.write_mark)
    }

    /// Discards all data by moving both cursors (and marks) to zero.
    ///
    /// The backing bytes are left untouched.
    pub fn clear(&mut self) {
        self.read_pos = 0;
        self.write_pos = 0;
        self.read_mark = 0;
        self.write_mark = 0;
    }

    /// Moves unread data to the start of the backing storage.
    ///
    /// Afterwards the read cursor is zero and the marks are set to the new cursors. A ring
    /// whose data wraps around the end is rotated in place.
    pub fn crunch(&mut self) -> Result<(), Error> {
        let (read, write) = (self.read_pos, self.write_pos);
        if read == 0 {
            return Ok(());
        }
        let len = self.data_size();
        if len > 0 {
            let data = self.storage.bytes_mut().ok_or(Error::ReadOnly)?;
            if read <= write {
                data.copy_within(read..write, 0);
            } else {
                data.rotate_left(read);
            }
        }
        self.read_pos = 0;
        self.write_pos = len;
        self.read_mark = 0;
        self.write_mark = len;
        Ok(())
    }

    /// Ensures at least `additional` bytes can be written, growing on-demand buffers.
    pub fn reserve(&mut self, additional: usize) -> Result<(), Error> {
        let available = self.free_size();
        if additional <= available {
            return Ok(());
        }
        let insufficient = Error::InsufficientSpace {
            needed: additional,
            available,
        };
        if !self.on_demand || !matches!(self.storage, Storage::Owned(_)) {
            return Err(insufficient);
        }

        // Rings are linearized first so the new bytes extend the free region
        if M::CIRCULAR {
            self.crunch()?;
        }
        let required = (if M::CIRCULAR {
            self.data_size()
                .checked_add(additional)
                .and_then(|n| n.checked_add(M::RESERVED))
        } else {
            self.write_pos.checked_add(additional)
        })
        .ok_or(Error::AllocationFailed(usize::MAX))?;
        let target = next_power_of_two(required).ok_or(Error::AllocationFailed(required))?;

        let Storage::Owned(vec) = &mut self.storage else {
            return Err(insufficient);
        };
        let previous = vec.len();
        vec.try_reserve_exact(target - previous)
            .map_err(|_| Error::AllocationFailed(target))?;
        vec.resize(target, 0);
        debug!(previous, target, circular = M::CIRCULAR, "grew buffer");
        Ok(())
    }

    /// Writes raw bytes at the write cursor.
    pub fn put_slice(&mut self, src: &[u8]) -> Result<(), Error> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        self.reserve(src.len())?;
        let start = self.write_pos;
        let data = self.storage.bytes_mut().ok_or(Error::ReadOnly)?;

        // Split at the end of the backing storage (only a ring ever takes the second copy)
        let first = src.len().min(data.len() - start);
        data[start..start + first].copy_from_slice(&src[..first]);
        data[..src.len() - first].copy_from_slice(&src[first..]);

        self.write_pos = self.forward(start, src.len());
        Ok(())
    }

    /// Copies unread bytes into `dst` without moving the read cursor.
    pub fn peek_slice(&self, dst: &mut [u8]) -> Result<(), Error> {
        let available = self.data_size();
        if dst.len() > available {
            return Err(Error::EndOfBuffer {
                needed: dst.len(),
                available,
            });
        }
        let data = self.storage.bytes();
        let start = self.read_pos;
        let first = dst.len().min(data.len() - start);
        let (head, tail) = dst.split_at_mut(first);
        head.copy_from_slice(&data[start..start + first]);
        tail.copy_from_slice(&data[..tail.len()]);
        Ok(())
    }

    /// Reads unread bytes into `dst`.
    pub fn get_slice(&mut self, dst: &mut [u8]) -> Result<(), Error> {
        self.peek_slice(dst)?;
        self.read_pos = self.forward(self.read_pos, dst.len());
        Ok(())
    }

    /// Reads exactly `N` unread bytes.
    #[inline]
    pub fn get_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut dst = [0; N];
        self.get_slice(&mut dst)?;
        Ok(dst)
    }

    /// Returns the unread data as (at most) two spans in read order.
    ///
    /// The second span is non-empty only when the data of a ring wraps around the end.
    pub fn data_ranges(&self) -> DataRanges<'_> {
        let data = self.storage.bytes();
        let (read, write) = (self.read_pos, self.write_pos);
        if read <= write {
            DataRanges {
                first: &data[read..write],
                second: &[],
            }
        } else {
            DataRanges {
                first: &data[read..],
                second: &data[..write],
            }
        }
    }

    /// Returns the free region as (at most) two writable spans in write order.
    ///
    /// Bytes filled in here become data only once committed with [Buffer::wskip].
    pub fn write_ranges(&mut self) -> Result<(&mut [u8], &mut [u8]), Error> {
        let (read, write) = (self.read_pos, self.write_pos);
        let data = self.storage.bytes_mut().ok_or(Error::ReadOnly)?;
        if !M::CIRCULAR {
            return Ok((&mut data[write..], Default::default()));
        }
        if data.is_empty() {
            return Ok(Default::default());
        }
        if write < read {
            return Ok((&mut data[write..read - 1], Default::default()));
        }
        let (head, tail) = data.split_at_mut(write);
        if read == 0 {
            // The last byte stays free so the cursors never meet
            let len = tail.len() - 1;
            return Ok((&mut tail[..len], Default::default()));
        }
        Ok((tail, &mut head[..read - 1]))
    }

    /// Copies `size` unread bytes (all of them if `None`) from `src` into this buffer.
    ///
    /// Advances the read cursor of `src` and the write cursor of `self`.
    pub fn append<N: Mode>(
        &mut self,
        src: &mut Buffer<'_, N>,
        size: Option<usize>,
    ) -> Result<(), Error> {
        let available = src.data_size();
        let size = size.unwrap_or(available);
        if size > available {
            return Err(Error::EndOfBuffer {
                needed: size,
                available,
            });
        }
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        self.reserve(size)?;

        let ranges = src.data_ranges();
        let first = size.min(ranges.first.len());
        self.put_slice(&ranges.first[..first])?;
        self.put_slice(&ranges.second[..size - first])?;
        src.rskip(size)
    }

    /// Returns a read-only buffer over the next `len` unread bytes and advances past them.
    ///
    /// The child does not borrow from `self`: when `self` is backed by [Bytes] the child
    /// shares (and keeps alive) the same allocation, otherwise the bytes are copied.
    pub fn slice(&mut self, len: usize) -> Result<Buffer<'static, Plain>, Error> {
        let available = self.data_size();
        if len > available {
            return Err(Error::EndOfBuffer {
                needed: len,
                available,
            });
        }
        let bytes = match &self.storage {
            Storage::Shared(bytes) if self.read_pos + len <= bytes.len() => {
                bytes.slice(self.read_pos..self.read_pos + len)
            }
            _ => {
                let mut copy = vec![0; len];
                self.peek_slice(&mut copy)?;
                Bytes::from(copy)
            }
        };
        self.read_pos = self.forward(self.read_pos, len);
        Ok(Buffer::from_bytes(bytes).with_limits(self.limits))
    }

    /// Copies the unread data into a new vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let ranges = self.data_ranges();
        let mut vec = Vec::with_capacity(ranges.len());
        vec.extend_from_slice(ranges.first);
        vec.extend_from_slice(ranges.second);
        vec
    }

    /// Consumes the buffer, returning its unread data.
    ///
    /// Does not copy when the buffer owns linear data starting at offset zero.
    pub fn into_vec(self) -> Vec<u8> {
        match self.storage {
            Storage::Owned(mut vec) if self.read_pos == 0 && self.write_pos <= vec.len() => {
                vec.truncate(self.write_pos);
                vec
            }
            _ => self.to_vec(),
        }
    }

    /// Detaches the buffer from borrowed memory by copying it.
    ///
    /// Read-only buffers stay read-only. Cursors, marks, limits and context are preserved.
    pub fn into_static(self) -> Buffer<'static, M> {
        let storage = match self.storage {
            Storage::Owned(vec) => Storage::Owned(vec),
            Storage::Borrowed(slice) => Storage::Owned(slice.to_vec()),
            Storage::ReadOnly(slice) => Storage::Shared(Bytes::copy_from_slice(slice)),
            Storage::Shared(bytes) => Storage::Shared(bytes),
        };
        Buffer {
            storage,
            read_pos: self.read_pos,
            write_pos: self.write_pos,
            read_mark: self.read_mark,
            write_mark: self.write_mark,
            on_demand: self.on_demand,
            limits: self.limits,
            context: self.context,
            _mode: PhantomData,
        }
    }

    /// Attaches an owned value to the buffer, replacing any previous one.
    ///
    /// Typically used to keep the owner of borrowed memory alive for as long as the
    /// buffer exists.
    pub fn set_context<T: Any + Send + Sync>(&mut self, context: T) {
        self.context = Some(Box::new(context));
    }

    /// Returns the attached value if it has type `T`.
    pub fn context<T: Any>(&self) -> Option<&T> {
        self.context.as_deref()?.downcast_ref()
    }

    /// Detaches and returns the attached value.
    pub fn clear_context(&mut self) -> Option<Box<dyn Any + Send + Sync>> {
        self.context.take()
    }

    /// Encodes `value` at the write cursor.
    ///
    /// Space for the whole value is reserved up front. On error, the write cursor is
    /// restored.
    pub fn write<T: Write + EncodeSize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        let size = value.encode_size();
        self.reserve(size)?;

        let start = self.write_pos;
        let before = self.data_size();
        if let Err(err) = value.write_to(self) {
            self.write_pos = start;
            return Err(err);
        }
        debug_assert_eq!(
            self.data_size() - before,
            size,
            "encode_size() disagrees with write()"
        );
        Ok(())
    }

    /// Decodes a `T` at the read cursor, enforcing [Buffer::limits].
    ///
    /// On error, the read cursor is restored.
    pub fn read<T: Read>(&mut self) -> Result<T, Error> {
        let start = self.read_pos;
        let limits = self.limits;
        T::read_cfg(self, &limits).inspect_err(|_| self.read_pos = start)
    }

    /// Decodes into `out` (see [Buffer::read]).
    pub fn read_into<T: Read>(&mut self, out: &mut T) -> Result<(), Error> {
        *out = self.read()?;
        Ok(())
    }

    /// Chaining form of [Buffer::write].
    ///
    /// ```
    /// use conduit_buffer::Buffer;
    ///
    /// let mut buf = Buffer::new(16);
    /// buf.put(&7u8)?.put("ok")?;
    ///
    /// let (mut a, mut b) = (0u8, String::new());
    /// buf.take(&mut a)?.take(&mut b)?;
    /// assert_eq!((a, b.as_str()), (7, "ok"));
    /// # Ok::<(), conduit_buffer::Error>(())
    /// ```
    pub fn put<T: Write + EncodeSize + ?Sized>(&mut self, value: &T) -> Result<&mut Self, Error> {
        self.write(value)?;
        Ok(self)
    }

    /// Chaining form of [Buffer::read_into].
    pub fn take<T: Read>(&mut self, out: &mut T) -> Result<&mut Self, Error> {
        self.read_into(out)?;
        Ok(self)
    }
}

impl<M: Mode> Clone for Buffer<'_, M> {
    /// Copies writable storage and shares read-only storage.
    ///
    /// The context is not cloned.
    fn clone(&self) -> Self {
        let storage = match &self.storage {
            Storage::Owned(vec) => Storage::Owned(vec.clone()),
            Storage::Borrowed(slice) => Storage::Owned(slice.to_vec()),
            Storage::ReadOnly(slice) => Storage::ReadOnly(*slice),
            Storage::Shared(bytes) => Storage::Shared(bytes.clone()),
        };
        Self {
            storage,
            read_pos: self.read_pos,
            write_pos: self.write_pos,
            read_mark: self.read_mark,
            write_mark: self.write_mark,
            on_demand: self.on_demand,
            limits: self.limits,
            context: None,
            _mode: PhantomData,
        }
    }
}

impl<M: Mode> fmt::Debug for Buffer<'_, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("circular", &M::CIRCULAR)
            .field("rpos", &self.read_pos)
            .field("wpos", &self.write_pos)
            .field("allocated", &self.allocated_size())
            .field("read_only", &self.is_read_only())
            .field("on_demand", &self.on_demand)
            .field("context", &self.context.is_some())
            .finish()
    }
}

/// Unread data of a [Buffer] as two spans.
#[derive(Clone, Copy, Debug)]
pub struct DataRanges<'b> {
    /// Data from the read cursor up to the write cursor (or the end of the storage).
    pub first: &'b [u8],
    /// Data wrapped around to the start of the storage.
    pub second: &'b [u8],
}

impl<'b> DataRanges<'b> {
    /// Total number of bytes in both spans.
    pub fn len(&self) -> usize {
        self.first.len() + self.second.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over the non-empty spans (zero, one or two).
    pub fn iter(&self) -> impl Iterator<Item = &'b [u8]> {
        [self.first, self.second]
            .into_iter()
            .filter(|span| !span.is_empty())
    }

    /// Returns the non-empty spans for vectored (gather) writes.
    pub fn io_slices(&self) -> Vec<IoSlice<'b>> {
        self.iter().map(IoSlice::new).collect()
    }
}
