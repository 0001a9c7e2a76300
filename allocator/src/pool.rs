//! Backing memory shared by both allocators.

use crate::Error;
use std::{
    alloc::{alloc_zeroed, dealloc, Layout},
    ptr::NonNull,
};

/// A contiguous region of memory handed out by an allocator.
///
/// The region is either allocated (and freed on drop) by the pool itself or borrowed from
/// the caller, who keeps ownership of it.
pub(crate) struct Pool {
    base: NonNull<u8>,
    size: usize,
    layout: Option<Layout>,
}

// SAFETY: Pool only hands out raw pointers; synchronizing access to the bytes they address
// is the job of the allocator that owns the pool.
unsafe impl Send for Pool {}
// SAFETY: See above, no method of Pool touches the bytes of the region.
unsafe impl Sync for Pool {}

impl Pool {
    /// Allocates a zeroed region of `size` bytes aligned to `alignment`.
    pub(crate) fn allocate(size: usize, alignment: usize) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidConfig("pool size must be non-zero"));
        }
        let layout = Layout::from_size_align(size, alignment)
            .map_err(|_| Error::InvalidConfig("pool size and alignment do not form a layout"))?;

        // SAFETY: Layout has a non-zero size.
        let ptr = unsafe { alloc_zeroed(layout) };
        let base = NonNull::new(ptr).ok_or(Error::PoolAllocation(size))?;
        Ok(Self {
            base,
            size,
            layout: Some(layout),
        })
    }

    /// Wraps a region owned by the caller.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `size` bytes, initialized, and not
    /// accessed through any other path for as long as the pool exists.
    pub(crate) unsafe fn from_raw_parts(base: NonNull<u8>, size: usize) -> Result<Self, Error> {
        if size == 0 {
            return Err(Error::InvalidConfig("pool size must be non-zero"));
        }
        if size > isize::MAX as usize {
            return Err(Error::InvalidConfig("pool size exceeds isize::MAX"));
        }
        Ok(Self {
            base,
            size,
            layout: None,
        })
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub(crate) const fn size(&self) -> usize {
        self.size
    }

    /// Returns the offset of `ptr` from the start of the region, if it lies inside it.
    #[inline]
    pub(crate) fn offset_of(&self, ptr: NonNull<u8>) -> Option<usize> {
        let offset = (ptr.as_ptr() as usize).checked_sub(self.as_ptr() as usize)?;
        (offset < self.size).then_some(offset)
    }

    /// Returns a pointer `offset` bytes into the region.
    ///
    /// # Safety
    ///
    /// `offset` must not exceed the size of the region.
    #[inline]
    pub(crate) unsafe fn at(&self, offset: usize) -> NonNull<u8> {
        debug_assert!(offset <= self.size);
        // SAFETY: Offset stays within (or one past) the region, which cannot wrap the
        // address space.
        unsafe { NonNull::new_unchecked(self.as_ptr().add(offset)) }
    }

    /// Returns true if the region was allocated by the pool.
    #[inline]
    pub(crate) const fn is_owned(&self) -> bool {
        self.layout.is_some()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if let Some(layout) = self.layout {
            // SAFETY: base was allocated in allocate() with this exact layout.
            unsafe { dealloc(self.base.as_ptr(), layout) };
        }
    }
}
