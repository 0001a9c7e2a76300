//! Lock-free single-producer/single-consumer byte ring.
//!
//! The ring uses the same addressing as a [crate::CircularBuffer] (one byte of storage is
//! reserved so equal positions mean "empty"), but splits ownership of the two cursors
//! between a [Producer] and a [Consumer] that may live on different threads.
//!
//! # Memory Ordering
//!
//! - The producer copies bytes in, then publishes its write position with `Release`.
//! - The consumer observes the write position with `Acquire` before copying bytes out,
//!   then publishes its read position with `Release`.
//! - Each side caches the other side's last observed position and only reloads it when the
//!   cached value says there is not enough room (or data).
//!
//! Nothing stronger is promised: the consumer sees exactly the bytes published up to the
//! most recent write position it observed.
//!
//! # Example
//!
//! ```
//! use conduit_buffer::ring;
//!
//! let (mut producer, mut consumer) = ring::channel(64);
//! std::thread::spawn(move || {
//!     producer.write_value(&(7u32, "hello".to_string())).unwrap();
//! })
//! .join()
//! .unwrap();
//! assert_eq!(
//!     consumer.read_value::<(u32, String)>().unwrap(),
//!     (7, "hello".to_string())
//! );
//! ```

use crate::{Buffer, Encode, EncodeSize, Error, Limits, Read, Write};
use std::{
    cell::UnsafeCell,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

/// Smallest window used to stage a value that wraps around the end of storage.
const MIN_WINDOW: usize = 64;

/// Decodes a value from the start of `bytes`, returning it with the number of bytes it took.
fn decode<T: Read>(bytes: &[u8], limits: Limits) -> Result<(T, usize), Error> {
    let mut buf = Buffer::wrap_read_only(bytes).with_limits(limits);
    let value = buf.read()?;
    Ok((value, buf.rpos()))
}

/// State shared by both halves.
struct Shared {
    data: Box<[UnsafeCell<u8>]>,
    /// Next position the consumer reads from (written only by the consumer).
    read: AtomicUsize,
    /// Next position the producer writes to (written only by the producer).
    write: AtomicUsize,
}

// SAFETY: bytes in `[read, write)` are only accessed by the consumer and bytes outside it
// only by the producer. Ownership of a byte changes hands through a Release store of one
// position that the other side observes with an Acquire load.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

impl Shared {
    #[inline]
    fn allocated(&self) -> usize {
        self.data.len()
    }

    #[inline]
    fn base(&self) -> *mut u8 {
        UnsafeCell::raw_get(self.data.as_ptr())
    }

    #[inline]
    fn used(&self, read: usize, write: usize) -> usize {
        if write >= read {
            write - read
        } else {
            self.allocated() - read + write
        }
    }

    #[inline]
    fn free(&self, read: usize, write: usize) -> usize {
        self.allocated() - 1 - self.used(read, write)
    }
}

/// Creates a ring that holds `capacity` bytes and returns its two halves.
pub fn channel(capacity: usize) -> (Producer, Consumer) {
    let data = (0..capacity + 1).map(|_| UnsafeCell::new(0)).collect();
    let shared = Arc::new(Shared {
        data,
        read: AtomicUsize::new(0),
        write: AtomicUsize::new(0),
    });
    (
        Producer {
            shared: shared.clone(),
            cached_read: 0,
        },
        Consumer {
            shared,
            cached_write: 0,
            limits: Limits::default(),
        },
    )
}

/// Writing half of a [channel].
pub struct Producer {
    shared: Arc<Shared>,
    cached_read: usize,
}

impl Producer {
    /// Number of bytes the ring holds.
    pub fn capacity(&self) -> usize {
        self.shared.allocated() - 1
    }

    /// Number of bytes that can currently be written.
    pub fn free_size(&mut self) -> usize {
        self.cached_read = self.shared.read.load(Ordering::Acquire);
        let write = self.shared.write.load(Ordering::Relaxed);
        self.shared.free(self.cached_read, write)
    }

    /// Returns the free space for `needed` bytes, refreshing the consumer position only if
    /// the cached one is insufficient.
    #[inline]
    fn available(&mut self, write: usize, needed: usize) -> usize {
        let free = self.shared.free(self.cached_read, write);
        if free >= needed {
            return free;
        }
        self.cached_read = self.shared.read.load(Ordering::Acquire);
        self.shared.free(self.cached_read, write)
    }

    /// Copies as many bytes of `src` as fit and returns how many were written.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let write = self.shared.write.load(Ordering::Relaxed);
        let n = src.len().min(self.available(write, src.len()));
        self.publish(write, &src[..n]);
        n
    }

    /// Writes all of `src`, or nothing if it does not fit.
    pub fn write_all(&mut self, src: &[u8]) -> Result<(), Error> {
        let write = self.shared.write.load(Ordering::Relaxed);
        let available = self.available(write, src.len());
        if src.len() > available {
            return Err(Error::InsufficientSpace {
                needed: src.len(),
                available,
            });
        }
        self.publish(write, src);
        Ok(())
    }

    /// Encodes `value` and writes it, or nothing if it does not fit.
    pub fn write_value<T: Write + EncodeSize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.write_all(&value.encode())
    }

    fn publish(&mut self, write: usize, src: &[u8]) {
        if src.is_empty() {
            return;
        }
        let allocated = self.shared.allocated();
        let first = src.len().min(allocated - write);
        // SAFETY: the caller checked that `src.len()` bytes starting at `write` are free, so
        // the consumer does not access them until the Release store below.
        unsafe {
            let base = self.shared.base();
            std::ptr::copy_nonoverlapping(src.as_ptr(), base.add(write), first);
            std::ptr::copy_nonoverlapping(src.as_ptr().add(first), base, src.len() - first);
        }
        self.shared
            .write
            .store((write + src.len()) % allocated, Ordering::Release);
    }
}

/// Reading half of a [channel].
pub struct Consumer {
    shared: Arc<Shared>,
    cached_write: usize,
    limits: Limits,
}

impl Consumer {
    /// Replaces the [Limits] enforced by [Consumer::read_value].
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Number of bytes published by the producer and not yet read.
    pub fn data_size(&mut self) -> usize {
        self.cached_write = self.shared.write.load(Ordering::Acquire);
        let read = self.shared.read.load(Ordering::Relaxed);
        self.shared.used(read, self.cached_write)
    }

    pub fn is_empty(&mut self) -> bool {
        self.data_size() == 0
    }

    #[inline]
    fn available(&mut self, read: usize, needed: usize) -> usize {
        let used = self.shared.used(read, self.cached_write);
        if used >= needed {
            return used;
        }
        self.cached_write = self.shared.write.load(Ordering::Acquire);
        self.shared.used(read, self.cached_write)
    }

    /// Copies published bytes into `dst` without consuming them and returns how many were
    /// copied.
    pub fn peek(&mut self, dst: &mut [u8]) -> usize {
        let read = self.shared.read.load(Ordering::Relaxed);
        let n = dst.len().min(self.available(read, dst.len()));
        self.copy_out(read, &mut dst[..n]);
        n
    }

    /// Consumes up to `dst.len()` bytes and returns how many were read.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let n = self.peek(dst);
        self.consume(n);
        n
    }

    /// Consumes exactly `dst.len()` bytes, or nothing if fewer are available.
    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<(), Error> {
        let read = self.shared.read.load(Ordering::Relaxed);
        let available = self.available(read, dst.len());
        if dst.len() > available {
            return Err(Error::EndOfBuffer {
                needed: dst.len(),
                available,
            });
        }
        self.copy_out(read, dst);
        self.consume(dst.len());
        Ok(())
    }

    /// Decodes one value from the published bytes.
    ///
    /// Values are decoded in place. Only a value that wraps around the end of storage is
    /// staged, through a window that grows until the value fits.
    ///
    /// Nothing is consumed on error, so a value whose bytes have not all been published yet
    /// can be retried later ([Error::EndOfBuffer]).
    pub fn read_value<T: Read>(&mut self) -> Result<T, Error> {
        let read = self.shared.read.load(Ordering::Relaxed);
        let used = self.data_size();
        let contiguous = used.min(self.shared.allocated() - read);
        let decoded = {
            // SAFETY: the bytes in `[read, read + contiguous)` are published and the producer
            // does not touch them until `consume`.
            let span = unsafe {
                std::slice::from_raw_parts(self.shared.base().add(read) as *const u8, contiguous)
            };
            decode::<T>(span, self.limits)
        };
        let (value, consumed) = match decoded {
            Err(Error::EndOfBuffer { .. }) if contiguous < used => {
                let mut window = (2 * contiguous).max(MIN_WINDOW).min(used);
                loop {
                    let mut staged = vec![0; window];
                    self.copy_out(read, &mut staged);
                    match decode::<T>(&staged, self.limits) {
                        Err(Error::EndOfBuffer { .. }) if window < used => {
                            window = (2 * window).min(used);
                        }
                        result => break result?,
                    }
                }
            }
            result => result?,
        };
        self.consume(consumed);
        Ok(value)
    }

    fn copy_out(&self, read: usize, dst: &mut [u8]) {
        let allocated = self.shared.allocated();
        let first = dst.len().min(allocated - read);
        // SAFETY: `dst.len()` bytes starting at `read` were published by the producer (the
        // Acquire load of its position happened in `available`), and it does not touch them
        // until we release them in `consume`.
        unsafe {
            let base = self.shared.base() as *const u8;
            std::ptr::copy_nonoverlapping(base.add(read), dst.as_mut_ptr(), first);
            std::ptr::copy_nonoverlapping(base, dst.as_mut_ptr().add(first), dst.len() - first);
        }
    }

    fn consume(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        let read = self.shared.read.load(Ordering::Relaxed);
        self.shared
            .read
            .store((read + n) % self.shared.allocated(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::thread;

    #[test]
    fn test_capacity() {
        let (mut producer, mut consumer) = channel(12);
        assert_eq!(producer.capacity(), 12);
        assert_eq!(producer.free_size(), 12);
        for value in [1i32, 2, 3] {
            producer.write_value(&value).unwrap();
        }
        assert_eq!(producer.free_size(), 0);
        assert!(producer.write_value(&4i32).is_err());
        for expected in [1i32, 2, 3] {
            assert_eq!(consumer.read_value::<i32>().unwrap(), expected);
        }
        assert_eq!(producer.free_size(), 12);
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_partial_io() {
        let (mut producer, mut consumer) = channel(4);
        assert_eq!(producer.write(&[1, 2, 3, 4, 5, 6]), 4);
        let mut out = [0; 3];
        assert_eq!(consumer.read(&mut out), 3);
        assert_eq!(out, [1, 2, 3]);

        // Wraps around the end of storage
        assert_eq!(producer.write(&[7, 8, 9]), 3);
        let mut out = [0; 8];
        assert_eq!(consumer.peek(&mut out), 4);
        assert_eq!(&out[..4], &[4, 7, 8, 9]);
        assert_eq!(consumer.read(&mut out), 4);
        assert_eq!(consumer.read(&mut out), 0);
    }

    #[test]
    fn test_exact() {
        let (mut producer, mut consumer) = channel(4);
        producer.write_all(&[1, 2]).unwrap();
        assert_eq!(
            producer.write_all(&[3, 4, 5]),
            Err(Error::InsufficientSpace {
                needed: 3,
                available: 2
            })
        );
        let mut out = [0; 3];
        assert!(consumer.read_exact(&mut out).is_err());
        assert_eq!(consumer.data_size(), 2);
        consumer.read_exact(&mut out[..2]).unwrap();
        assert_eq!(&out[..2], &[1, 2]);
    }

    #[test]
    fn test_incomplete_value() {
        let (mut producer, mut consumer) = channel(32);
        let encoded = "partial".to_string().encode();
        producer.write_all(&encoded[..6]).unwrap();
        assert!(matches!(
            consumer.read_value::<String>(),
            Err(Error::EndOfBuffer { .. })
        ));
        assert_eq!(consumer.data_size(), 6);
        producer.write_all(&encoded[6..]).unwrap();
        assert_eq!(consumer.read_value::<String>().unwrap(), "partial");
    }

    #[test]
    fn test_values_wrapping_around_storage() {
        let (mut producer, mut consumer) = channel(100);
        let mut rng = StdRng::seed_from_u64(3);
        let mut pending = std::collections::VecDeque::new();
        for _ in 0..2_000 {
            // Keep a backlog so most reads see data on both sides of the wrap
            let value: Vec<u16> = (0..rng.gen_range(0..20)).map(|_| rng.gen()).collect();
            if producer.write_value(&value).is_ok() {
                pending.push_back(value);
            }
            if pending.len() > 3 || rng.gen_bool(0.2) {
                if let Some(expected) = pending.pop_front() {
                    assert_eq!(consumer.read_value::<Vec<u16>>().unwrap(), expected);
                }
            }
        }
        while let Some(expected) = pending.pop_front() {
            assert_eq!(consumer.read_value::<Vec<u16>>().unwrap(), expected);
        }
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_incomplete_value_across_wrap() {
        let (mut producer, mut consumer) = channel(16);
        producer.write_all(&[0; 12]).unwrap();
        let mut skipped = [0; 12];
        consumer.read_exact(&mut skipped).unwrap();

        // The length prefix and part of the bytes land before the end of storage
        let encoded = "wrapped".to_string().encode();
        producer.write_all(&encoded[..9]).unwrap();
        assert!(matches!(
            consumer.read_value::<String>(),
            Err(Error::EndOfBuffer { .. })
        ));
        assert_eq!(consumer.data_size(), 9);
        producer.write_all(&encoded[9..]).unwrap();
        assert_eq!(consumer.read_value::<String>().unwrap(), "wrapped");
        assert!(consumer.is_empty());
    }

    #[test]
    fn test_limits() {
        let (mut producer, consumer) = channel(32);
        let mut consumer = consumer.with_limits(Limits::new(3, 3));
        producer.write_value("long").unwrap();
        assert_eq!(
            consumer.read_value::<String>(),
            Err(Error::LengthExceeded(4, 3))
        );
    }

    #[test]
    fn test_threads() {
        const COUNT: u64 = 100_000;
        let (mut producer, mut consumer) = channel(61);
        let handle = thread::spawn(move || {
            for i in 0..COUNT {
                while producer.write_value(&i).is_err() {
                    thread::yield_now();
                }
            }
        });
        let mut expected = 0;
        while expected < COUNT {
            match consumer.read_value::<u64>() {
                Ok(value) => {
                    assert_eq!(value, expected);
                    expected += 1;
                }
                Err(_) => thread::yield_now(),
            }
        }
        handle.join().unwrap();
        assert!(consumer.is_empty());
    }
}
