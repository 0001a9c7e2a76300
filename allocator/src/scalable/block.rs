//! Block bookkeeping.
//!
//! A block's metadata is split by who may touch it:
//!
//! - [BlockMeta] lives out of band, one per block of the pool, and is read by any thread
//!   (owner and size class).
//! - [LocalBlock] is the private state (free list, bump cursor, live count). It is held by
//!   exactly one party at a time: the owning thread's heap, or the orphan list of its size
//!   class once the owner exits.
//! - A [Chain] of chunks freed by other threads waits in the owner's mailbox until the owner
//!   splices it into its private free list.
//!
//! Free lists are threaded through the free chunks themselves: the first four bytes of a
//! free chunk hold the index of the next one.

use std::sync::atomic::{AtomicU32, Ordering};

/// End of a chunk list.
pub(crate) const NIL: u32 = u32::MAX;

const UNOWNED: u32 = 0;
const UNCLASSED: u32 = u32::MAX;

/// Writes the link of a free chunk.
///
/// # Safety
///
/// `block` must point to a block holding at least `index + 1` chunks of `chunk` bytes, and
/// the chunk must not be in use.
#[inline]
unsafe fn write_link(block: *mut u8, chunk: usize, index: u32, next: u32) {
    // SAFETY: Guaranteed by the caller. Chunks are at least 8 bytes.
    unsafe {
        block
            .add(index as usize * chunk)
            .cast::<u32>()
            .write_unaligned(next)
    }
}

/// Reads the link of a free chunk.
///
/// # Safety
///
/// Same as [write_link], and the link must have been written.
#[inline]
unsafe fn read_link(block: *mut u8, chunk: usize, index: u32) -> u32 {
    // SAFETY: Guaranteed by the caller.
    unsafe {
        block
            .add(index as usize * chunk)
            .cast::<u32>()
            .read_unaligned()
    }
}

/// Out of band state of a block, readable from any thread.
#[derive(Debug)]
pub(crate) struct BlockMeta {
    /// Owning thread slot plus one, or zero when the block is not owned by any thread.
    owner: AtomicU32,
    /// Size class, or [UNCLASSED] while the block is not carved into chunks.
    class: AtomicU32,
}

impl Default for BlockMeta {
    fn default() -> Self {
        Self {
            owner: AtomicU32::new(UNOWNED),
            class: AtomicU32::new(UNCLASSED),
        }
    }
}

impl BlockMeta {
    #[inline]
    pub(crate) fn owner(&self) -> Option<usize> {
        match self.owner.load(Ordering::Acquire) {
            UNOWNED => None,
            slot => Some(slot as usize - 1),
        }
    }

    /// Callers must hold the lock that guards the transition (the owner's mailbox when
    /// giving a block up, the orphan list when adopting one).
    #[inline]
    pub(crate) fn set_owner(&self, slot: Option<usize>) {
        let value = slot.map_or(UNOWNED, |slot| slot as u32 + 1);
        self.owner.store(value, Ordering::Release);
    }

    #[inline]
    pub(crate) fn class(&self) -> Option<usize> {
        match self.class.load(Ordering::Acquire) {
            UNCLASSED => None,
            class => Some(class as usize),
        }
    }

    #[inline]
    pub(crate) fn set_class(&self, class: Option<usize>) {
        let value = class.map_or(UNCLASSED, |class| class as u32);
        self.class.store(value, Ordering::Release);
    }
}

/// A list of free chunks of one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Chain {
    pub(crate) head: u32,
    pub(crate) tail: u32,
    pub(crate) len: u32,
}

impl Default for Chain {
    fn default() -> Self {
        Self {
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }
}

impl Chain {
    /// Pushes a freed chunk.
    ///
    /// # Safety
    ///
    /// See [write_link].
    #[inline]
    pub(crate) unsafe fn push(&mut self, block: *mut u8, chunk: usize, index: u32) {
        // SAFETY: Forwarded to the caller.
        unsafe { write_link(block, chunk, index, self.head) };
        if self.tail == NIL {
            self.tail = index;
        }
        self.head = index;
        self.len += 1;
    }
}

/// Chunks freed by foreign threads into one block, waiting for the owner.
#[derive(Debug)]
pub(crate) struct MailEntry {
    pub(crate) block: u32,
    pub(crate) chain: Chain,
}

/// Private state of a block.
#[derive(Debug)]
pub(crate) struct LocalBlock {
    pub(crate) index: u32,
    /// Head of the private free list.
    free: u32,
    /// First chunk never handed out.
    bump: u32,
    capacity: u32,
    /// Chunks handed out and not yet returned to the private free list (chunks waiting in a
    /// mailbox still count).
    allocated: u32,
}

impl LocalBlock {
    pub(crate) fn new(index: u32, capacity: usize) -> Self {
        Self {
            index,
            free: NIL,
            bump: 0,
            capacity: capacity as u32,
            allocated: 0,
        }
    }

    /// Returns true if neither the free list nor the bump cursor can serve a chunk.
    #[inline]
    pub(crate) fn is_full(&self) -> bool {
        self.free == NIL && self.bump == self.capacity
    }

    /// Returns true if no chunk of the block is live or waiting in a mailbox.
    #[inline]
    pub(crate) fn is_unused(&self) -> bool {
        self.allocated == 0
    }

    #[inline]
    pub(crate) fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Takes a chunk from the free list, or else from never-used space.
    ///
    /// # Safety
    ///
    /// `block` must point to this block, which holds chunks of `chunk` bytes.
    #[inline]
    pub(crate) unsafe fn pop(&mut self, block: *mut u8, chunk: usize) -> Option<u32> {
        let index = if self.free != NIL {
            let index = self.free;
            // SAFETY: Chunks on the free list are unused and carry a link.
            self.free = unsafe { read_link(block, chunk, index) };
            index
        } else if self.bump < self.capacity {
            self.bump += 1;
            self.bump - 1
        } else {
            return None;
        };
        self.allocated += 1;
        Some(index)
    }

    /// Returns a chunk to the free list.
    ///
    /// Returns false (leaving the block untouched) if the chunk cannot be live: it was never
    /// handed out, or no chunk of the block is.
    ///
    /// # Safety
    ///
    /// `block` must point to this block, which holds chunks of `chunk` bytes, and `index`
    /// must name a chunk that is no longer in use.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn push(&mut self, block: *mut u8, chunk: usize, index: u32) -> bool {
        if index >= self.bump || self.allocated == 0 {
            return false;
        }
        // SAFETY: Forwarded to the caller.
        unsafe { write_link(block, chunk, index, self.free) };
        self.free = index;
        self.allocated -= 1;
        true
    }

    /// Prepends a chain of freed chunks to the free list.
    ///
    /// Returns false (leaving the block untouched) if the chain holds more chunks than are
    /// live.
    ///
    /// # Safety
    ///
    /// `block` must point to this block and `chain` must hold chunks of this block.
    #[inline]
    #[must_use]
    pub(crate) unsafe fn splice(&mut self, block: *mut u8, chunk: usize, chain: &Chain) -> bool {
        if chain.len == 0 {
            return true;
        }
        let Some(allocated) = self.allocated.checked_sub(chain.len) else {
            return false;
        };
        // SAFETY: The tail of a non-empty chain is an unused chunk of this block.
        unsafe { write_link(block, chunk, chain.tail, self.free) };
        self.free = chain.head;
        self.allocated = allocated;
        true
    }
}
