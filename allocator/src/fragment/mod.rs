//! First-fit allocation of relocatable regions from a single pool.
//!
//! The pool is described by a list of blocks in offset order, each either used or free. Free
//! blocks are additionally threaded onto a free list, also kept in offset order. Allocation
//! splits the low end off the first free block large enough for the (chunk-rounded) request.
//! Deallocation merges the released block with any free neighbor, so two free blocks are
//! never adjacent.
//!
//! Callers never hold addresses. [FragmentAllocator::allocate] returns a [MutablePointer], a
//! generation-checked handle into a pointer table that names a block rather than an offset.
//! This indirection lets [FragmentFreeOperator] slide every used block towards the start of
//! the pool (collecting all free space into one trailing block) without invalidating a
//! single handle.
//!
//! Blocks live in an arena and link to each other by index, so a stale link can at worst
//! name the wrong block (caught by [FragmentAllocator::debug]) but never dangle.
//!
//! # Example
//!
//! ```
//! use conduit_allocator::fragment::{Config, FragmentAllocator};
//!
//! let allocator = FragmentAllocator::new(4096, Config::default()).unwrap();
//! let ptr = allocator.allocate(100).unwrap();
//! assert_eq!(allocator.info_size(&ptr), Some(128));
//!
//! allocator.write_at(&ptr, 0, b"hello").unwrap();
//! let mut out = [0u8; 5];
//! allocator.read_at(&ptr, 0, &mut out).unwrap();
//! assert_eq!(&out, b"hello");
//!
//! allocator.deallocate(ptr).unwrap();
//! assert_eq!(allocator.available(), 4096);
//! ```

use crate::{pool::Pool, Error};
use conduit_utils::{bits, NZUsize};
use std::{
    num::NonZeroUsize,
    ptr::{self, NonNull},
    sync::{Mutex, MutexGuard, PoisonError},
};
use tracing::warn;

mod defrag;
pub use defrag::{DefragStats, FragmentFreeOperator, MemMove, Relocate};

/// Configuration for a [FragmentAllocator].
#[derive(Clone, Debug)]
pub struct Config {
    /// Granularity of every allocation. Must be a power of two that divides the pool size.
    pub chunk_size: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: NZUsize!(64),
        }
    }
}

impl Config {
    /// Checks the configuration against a pool of `pool_size` bytes.
    pub fn validate(&self, pool_size: usize) -> Result<(), Error> {
        if !self.chunk_size.is_power_of_two() {
            return Err(Error::InvalidConfig("chunk_size must be a power of two"));
        }
        if pool_size == 0 {
            return Err(Error::InvalidConfig("pool size must be non-zero"));
        }
        if pool_size % self.chunk_size.get() != 0 {
            return Err(Error::InvalidConfig(
                "pool size must be a multiple of chunk_size",
            ));
        }
        Ok(())
    }
}

/// Handle to a region returned by [FragmentAllocator::allocate].
///
/// The handle survives defragmentation. It becomes invalid (rejected by every method) once
/// passed to [FragmentAllocator::deallocate], even if its table slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MutablePointer {
    index: usize,
    generation: u64,
}

/// A block as reported by [FragmentAllocator::snapshot].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    pub offset: usize,
    pub size: usize,
    pub free: bool,
}

#[derive(Clone, Debug)]
struct Block {
    offset: usize,
    size: usize,
    free: bool,
    prev: Option<usize>,
    next: Option<usize>,
    prev_free: Option<usize>,
    next_free: Option<usize>,
    /// Pointer table slot of a used block.
    pointer: Option<usize>,
}

impl Block {
    const fn new(offset: usize, size: usize, free: bool) -> Self {
        Self {
            offset,
            size,
            free,
            prev: None,
            next: None,
            prev_free: None,
            next_free: None,
            pointer: None,
        }
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u64,
    block: Option<usize>,
}

/// Block arena, lists and pointer table. Guarded by the allocator's mutex.
struct Inner {
    blocks: Vec<Block>,
    vacant: Vec<usize>,
    head: Option<usize>,
    free_head: Option<usize>,
    slots: Vec<Slot>,
    vacant_slots: Vec<usize>,
    used: usize,
}

impl Inner {
    fn new(total: usize) -> Self {
        Self {
            blocks: vec![Block::new(0, total, true)],
            vacant: Vec::new(),
            head: Some(0),
            free_head: Some(0),
            slots: Vec::new(),
            vacant_slots: Vec::new(),
            used: 0,
        }
    }

    fn new_block(&mut self, block: Block) -> usize {
        match self.vacant.pop() {
            Some(index) => {
                self.blocks[index] = block;
                index
            }
            None => {
                self.blocks.push(block);
                self.blocks.len() - 1
            }
        }
    }

    /// Unlinks a block from the block list and recycles its arena slot.
    fn remove_block(&mut self, index: usize) {
        let (prev, next) = (self.blocks[index].prev, self.blocks[index].next);
        match prev {
            Some(prev) => self.blocks[prev].next = next,
            None => self.head = next,
        }
        if let Some(next) = next {
            self.blocks[next].prev = prev;
        }
        self.vacant.push(index);
    }

    fn unlink_free(&mut self, index: usize) {
        let (prev, next) = (self.blocks[index].prev_free, self.blocks[index].next_free);
        match prev {
            Some(prev) => self.blocks[prev].next_free = next,
            None => self.free_head = next,
        }
        if let Some(next) = next {
            self.blocks[next].prev_free = prev;
        }
        self.blocks[index].prev_free = None;
        self.blocks[index].next_free = None;
    }

    /// Links a block into the free list after `after` (or at the head).
    fn link_free(&mut self, index: usize, after: Option<usize>) {
        let next = match after {
            Some(after) => self.blocks[after].next_free,
            None => self.free_head,
        };
        self.blocks[index].prev_free = after;
        self.blocks[index].next_free = next;
        match after {
            Some(after) => self.blocks[after].next_free = Some(index),
            None => self.free_head = Some(index),
        }
        if let Some(next) = next {
            self.blocks[next].prev_free = Some(index);
        }
    }

    /// Finds the free-list predecessor of a block that is not yet on the free list by
    /// scanning outward from it for the nearest free block.
    fn free_predecessor(&self, index: usize) -> Option<usize> {
        let (mut left, mut right) = (self.blocks[index].prev, self.blocks[index].next);
        while left.is_some() || right.is_some() {
            if let Some(l) = left {
                if self.blocks[l].free {
                    return Some(l);
                }
                left = self.blocks[l].prev;
            }
            if let Some(r) = right {
                if self.blocks[r].free {
                    return self.blocks[r].prev_free;
                }
                right = self.blocks[r].next;
            }
        }
        None
    }

    /// Finds the first free block of at least `size` bytes.
    fn first_fit(&self, size: usize) -> Option<usize> {
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            if self.blocks[index].size >= size {
                return Some(index);
            }
            cursor = self.blocks[index].next_free;
        }
        None
    }

    fn largest_free(&self) -> usize {
        let mut largest = 0;
        let mut cursor = self.free_head;
        while let Some(index) = cursor {
            largest = largest.max(self.blocks[index].size);
            cursor = self.blocks[index].next_free;
        }
        largest
    }

    /// Assigns a pointer table slot to a used block.
    fn bind(&mut self, block: usize) -> MutablePointer {
        let index = match self.vacant_slots.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    block: None,
                });
                self.slots.len() - 1
            }
        };
        let slot = &mut self.slots[index];
        slot.block = Some(block);
        self.blocks[block].pointer = Some(index);
        MutablePointer {
            index,
            generation: slot.generation,
        }
    }

    /// Releases the slot of a live pointer, returning the block it named.
    fn unbind(&mut self, pointer: &MutablePointer) -> Option<usize> {
        let slot = self.slots.get_mut(pointer.index)?;
        if slot.generation != pointer.generation {
            return None;
        }
        let block = slot.block.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.vacant_slots.push(pointer.index);
        self.blocks[block].pointer = None;
        Some(block)
    }

    fn lookup(&self, pointer: &MutablePointer) -> Option<&Block> {
        let slot = self.slots.get(pointer.index)?;
        if slot.generation != pointer.generation {
            return None;
        }
        slot.block.map(|block| &self.blocks[block])
    }

    /// Returns the pool offset of `len` bytes at `offset` inside the region of `pointer`.
    fn range(&self, pointer: &MutablePointer, offset: usize, len: usize) -> Result<usize, Error> {
        let block = self.lookup(pointer).ok_or(Error::InvalidPointer)?;
        match offset.checked_add(len) {
            Some(end) if end <= block.size => Ok(block.offset + offset),
            _ => Err(Error::OutOfBounds {
                offset,
                len,
                size: block.size,
            }),
        }
    }

    fn check(&self, total: usize, chunk_size: usize) -> Result<(), Error> {
        let corrupted = |message: String| Err(Error::Corrupted(message));

        // Block list: contiguous, conserving, coalesced
        let (mut offset, mut prev, mut cursor) = (0, None, self.head);
        let (mut live, mut free, mut used, mut pointers) = (0, 0, 0, 0);
        let mut prev_free = false;
        while let Some(index) = cursor {
            let Some(block) = self.blocks.get(index) else {
                return corrupted(format!("block link {index} is out of range"));
            };
            live += 1;
            if live > self.blocks.len() {
                return corrupted("block list contains a cycle".into());
            }
            if block.prev != prev {
                return corrupted(format!("block {index} has a broken back link"));
            }
            if block.offset != offset {
                return corrupted(format!(
                    "block {index} starts at {} but the previous block ends at {offset}",
                    block.offset
                ));
            }
            if block.size == 0 || block.size % chunk_size != 0 {
                return corrupted(format!("block {index} has invalid size {}", block.size));
            }
            if block.free {
                if prev_free {
                    return corrupted(format!("free block {index} was not coalesced"));
                }
                if block.pointer.is_some() {
                    return corrupted(format!("free block {index} is bound to a pointer"));
                }
                free += 1;
            } else {
                let bound = block
                    .pointer
                    .and_then(|slot| self.slots.get(slot))
                    .and_then(|slot| slot.block);
                if bound != Some(index) {
                    return corrupted(format!("used block {index} is not bound to a pointer"));
                }
                used += block.size;
                pointers += 1;
            }
            prev_free = block.free;
            offset += block.size;
            prev = Some(index);
            cursor = block.next;
        }
        if offset != total {
            return corrupted(format!("blocks cover {offset} of {total} bytes"));
        }
        if used != self.used {
            return corrupted(format!(
                "used blocks hold {used} bytes but {} are accounted",
                self.used
            ));
        }
        if live + self.vacant.len() != self.blocks.len() {
            return corrupted(format!(
                "{} arena slots are neither linked nor vacant",
                self.blocks.len() - live - self.vacant.len()
            ));
        }

        // Free list: only free blocks, in offset order, all of them
        let (mut count, mut prev, mut last_offset, mut cursor) = (0, None, None, self.free_head);
        while let Some(index) = cursor {
            let block = &self.blocks[index];
            count += 1;
            if count > free {
                return corrupted("free list is longer than the number of free blocks".into());
            }
            if !block.free {
                return corrupted(format!("used block {index} is on the free list"));
            }
            if block.prev_free != prev {
                return corrupted(format!("free block {index} has a broken back link"));
            }
            if last_offset.is_some_and(|last| block.offset <= last) {
                return corrupted(format!("free block {index} is out of order"));
            }
            last_offset = Some(block.offset);
            prev = Some(index);
            cursor = block.next_free;
        }
        if count != free {
            return corrupted(format!("{free} free blocks but {count} on the free list"));
        }

        let bound = self.slots.iter().filter(|slot| slot.block.is_some()).count();
        if bound != pointers {
            return corrupted(format!(
                "{bound} pointers are live but {pointers} blocks are used"
            ));
        }
        Ok(())
    }
}

/// An allocator of variably sized, relocatable regions from one fixed pool.
///
/// Every operation takes a single mutex, so the allocator is safe to share between threads
/// but is meant for comparatively rare, large allocations.
pub struct FragmentAllocator {
    pool: Pool,
    chunk_size: usize,
    inner: Mutex<Inner>,
}

impl FragmentAllocator {
    /// Creates an allocator over a freshly allocated (zeroed) pool of `pool_size` bytes.
    pub fn new(pool_size: usize, config: Config) -> Result<Self, Error> {
        config.validate(pool_size)?;
        let pool = Pool::allocate(pool_size, config.chunk_size.get())?;
        Ok(Self::with_pool(pool, config))
    }

    /// Creates an allocator over memory owned by the caller. The allocator never frees it.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `size` initialized bytes, and the memory
    /// must not be accessed other than through this allocator until it is dropped.
    pub unsafe fn from_raw_parts(
        base: NonNull<u8>,
        size: usize,
        config: Config,
    ) -> Result<Self, Error> {
        config.validate(size)?;
        // SAFETY: Forwarded to the caller.
        let pool = unsafe { Pool::from_raw_parts(base, size) }?;
        Ok(Self::with_pool(pool, config))
    }

    fn with_pool(pool: Pool, config: Config) -> Self {
        let inner = Inner::new(pool.size());
        Self {
            pool,
            chunk_size: config.chunk_size.get(),
            inner: Mutex::new(inner),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates a region of at least `size` bytes (rounded up to the chunk size) from the
    /// first free block large enough to hold it.
    ///
    /// Never defragments. On [Error::Exhausted] the caller may run a
    /// [FragmentFreeOperator] and retry.
    pub fn allocate(&self, size: usize) -> Result<MutablePointer, Error> {
        if size == 0 {
            return Err(Error::ZeroSize);
        }
        let mut inner = self.lock();
        let requested = bits::round_up(size, self.chunk_size).unwrap_or(usize::MAX);
        let Some(found) = inner.first_fit(requested) else {
            let largest = inner.largest_free();
            warn!(requested, largest, "fragment pool exhausted");
            return Err(Error::Exhausted {
                requested: size,
                largest,
            });
        };

        let used = if inner.blocks[found].size == requested {
            inner.unlink_free(found);
            inner.blocks[found].free = false;
            found
        } else {
            // Split the low end off the free block
            let (offset, prev) = (inner.blocks[found].offset, inner.blocks[found].prev);
            let mut block = Block::new(offset, requested, false);
            block.prev = prev;
            block.next = Some(found);
            let index = inner.new_block(block);
            match prev {
                Some(prev) => inner.blocks[prev].next = Some(index),
                None => inner.head = Some(index),
            }
            let free = &mut inner.blocks[found];
            free.prev = Some(index);
            free.offset += requested;
            free.size -= requested;
            index
        };
        inner.used += requested;
        Ok(inner.bind(used))
    }

    /// Returns a region to the pool, merging it with free neighbors.
    ///
    /// Fails with [Error::InvalidPointer] (leaving the allocator untouched) if the pointer
    /// was already deallocated or belongs to another allocator.
    pub fn deallocate(&self, pointer: MutablePointer) -> Result<(), Error> {
        let mut inner = self.lock();
        let Some(index) = inner.unbind(&pointer) else {
            warn!(?pointer, "rejected deallocation of unknown pointer");
            return Err(Error::InvalidPointer);
        };
        let (prev, next, size) = {
            let block = &inner.blocks[index];
            (block.prev, block.next, block.size)
        };
        inner.used -= size;

        let left = prev.filter(|&prev| inner.blocks[prev].free);
        let right = next.filter(|&next| inner.blocks[next].free);
        match (left, right) {
            (Some(left), Some(right)) => {
                let absorbed = size + inner.blocks[right].size;
                inner.blocks[left].size += absorbed;
                inner.unlink_free(right);
                inner.remove_block(index);
                inner.remove_block(right);
            }
            (Some(left), None) => {
                inner.blocks[left].size += size;
                inner.remove_block(index);
            }
            (None, Some(right)) => {
                let block = &mut inner.blocks[right];
                block.offset -= size;
                block.size += size;
                inner.remove_block(index);
            }
            (None, None) => {
                inner.blocks[index].free = true;
                let after = inner.free_predecessor(index);
                inner.link_free(index, after);
            }
        }
        Ok(())
    }

    /// Returns true if `pointer` refers to a live region.
    pub fn is_valid(&self, pointer: &MutablePointer) -> bool {
        self.lock().lookup(pointer).is_some()
    }

    /// Returns the size of the region behind `pointer` (the chunk-rounded request).
    pub fn info_size(&self, pointer: &MutablePointer) -> Option<usize> {
        self.lock().lookup(pointer).map(|block| block.size)
    }

    /// Returns the current address of the region behind `pointer`.
    ///
    /// The address is only stable until the next defragmentation pass. Prefer
    /// [Self::write_at] and [Self::read_at], which resolve the handle under the lock.
    pub fn resolve(&self, pointer: &MutablePointer) -> Option<NonNull<u8>> {
        let inner = self.lock();
        let block = inner.lookup(pointer)?;
        // SAFETY: Blocks never extend past the pool.
        Some(unsafe { self.pool.at(block.offset) })
    }

    /// Copies `data` into the region behind `pointer`, starting `offset` bytes in.
    pub fn write_at(
        &self,
        pointer: &MutablePointer,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Error> {
        let inner = self.lock();
        let start = inner.range(pointer, offset, data.len())?;
        // SAFETY: The range lies inside the pool and the lock excludes relocation. `data`
        // cannot alias the pool without the caller dereferencing a resolved address.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.pool.at(start).as_ptr(), data.len())
        };
        Ok(())
    }

    /// Copies bytes from the region behind `pointer`, starting `offset` bytes in, into `out`.
    pub fn read_at(
        &self,
        pointer: &MutablePointer,
        offset: usize,
        out: &mut [u8],
    ) -> Result<(), Error> {
        let inner = self.lock();
        let start = inner.range(pointer, offset, out.len())?;
        // SAFETY: See write_at.
        unsafe { ptr::copy_nonoverlapping(self.pool.at(start).as_ptr(), out.as_mut_ptr(), out.len()) };
        Ok(())
    }

    /// Size of the pool.
    pub fn total(&self) -> usize {
        self.pool.size()
    }

    /// Bytes held by live regions.
    pub fn used(&self) -> usize {
        self.lock().used
    }

    /// Bytes not held by live regions, whether or not they are contiguous.
    pub fn available(&self) -> usize {
        self.total() - self.used()
    }

    /// Size of the largest free block, the largest request that can currently succeed.
    pub fn largest_free(&self) -> usize {
        self.lock().largest_free()
    }

    /// Number of blocks (used and free) the pool is divided into.
    pub fn block_count(&self) -> usize {
        let inner = self.lock();
        inner.blocks.len() - inner.vacant.len()
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Validates every structural invariant of the allocator.
    ///
    /// Intended for tests and diagnostics; walks every block.
    pub fn debug(&self) -> Result<(), Error> {
        self.lock().check(self.pool.size(), self.chunk_size)
    }

    /// Lists every block in offset order.
    pub fn snapshot(&self) -> Vec<BlockInfo> {
        let inner = self.lock();
        let mut blocks = Vec::new();
        let mut cursor = inner.head;
        while let Some(index) = cursor {
            let block = &inner.blocks[index];
            blocks.push(BlockInfo {
                offset: block.offset,
                size: block.size,
                free: block.free,
            });
            cursor = block.next;
        }
        blocks
    }

    /// Compacts the pool with [MemMove]. See [FragmentFreeOperator].
    pub fn defragment(&self) -> DefragStats {
        FragmentFreeOperator::new(self).run()
    }
}
