//! Thread-cached allocation of small chunks from a fixed pool.
//!
//! The pool is split in two regions growing towards each other: blocks of `block_size`
//! bytes carved upwards from the start (in batches of `blocks_per_big_block`), and large
//! regions carved downwards from the end. A block serves chunks of a single size class.
//!
//! # Locking
//!
//! Each thread owns the blocks it allocates from and serves most requests from them
//! without synchronization. The path of [ScalablePoolAllocator::allocate] for a small
//! request, in order:
//!
//! 1. the active block's private free list,
//! 2. the active block's never-used space,
//! 3. older blocks of the same size class held by the thread, newest first,
//! 4. the thread's mailbox for the size class (chunks freed by other threads),
//! 5. an orphaned, partially used block of the size class (left by an exited thread),
//! 6. an empty block from the pool.
//!
//! Only steps 4-6 take a lock, and each a narrow one: one spin lock per (thread, size class)
//! mailbox, one per size class orphan list, and one pool lock for carving blocks. Freeing a
//! chunk owned by the calling thread is lock free. Freeing a chunk owned by another thread
//! pushes it to that thread's mailbox. Large requests take the large-allocator lock.
//!
//! # Thread exit
//!
//! When a thread exits (or calls [ScalablePoolAllocator::release_thread]) its mailboxes are
//! drained, unused blocks return to the pool, and partially used blocks become orphans that
//! any thread may adopt. Chunks freed into an orphan go straight to its free list.
//!
//! # Example
//!
//! ```
//! use conduit_allocator::scalable::{Config, ScalablePoolAllocator};
//! use conduit_utils::NZUsize;
//!
//! let allocator = ScalablePoolAllocator::new(Config::with_pool_size(NZUsize!(1 << 20))).unwrap();
//! let ptr = allocator.allocate(24).unwrap();
//! assert_eq!(allocator.usable_size(ptr), Some(24));
//! allocator.deallocate(ptr).unwrap();
//! assert_eq!(allocator.stats().chunks_in_use(), 0);
//! ```

use crate::{pool::Pool, Error};
use conduit_utils::bits;
use prometheus_client::registry::Registry;
use spin::Mutex;
use std::{
    ptr::NonNull,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};
use tracing::{debug, error, warn};

mod block;
mod config;
mod large;
mod stats;
mod thread;

use block::{BlockMeta, Chain, LocalBlock, MailEntry};
pub use config::{Config, DEFAULT_BINS, MAX_BINS};
use large::Large;
pub use stats::Statistics;
use thread::{LocalBin, LocalHeap};

/// Alignment of large regions (and required alignment of a borrowed pool).
pub const LARGE_ALIGNMENT: usize = cache_line_size();

/// Returns the cache line size for the current architecture.
///
/// 128 bytes on x86_64 and aarch64 accounts for adjacent-line prefetching.
const fn cache_line_size() -> usize {
    cfg_if::cfg_if! {
        if #[cfg(any(target_arch = "x86_64", target_arch = "aarch64"))] {
            128
        } else {
            64
        }
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

/// Pool boundaries and the stack of empty blocks.
struct Carve {
    empty: Vec<u32>,
    /// End of the block region.
    small_top: usize,
    /// Start of the large region.
    large_bottom: usize,
}

pub(crate) struct Inner {
    id: u64,
    config: Config,
    pool: Pool,
    metas: Box<[BlockMeta]>,
    /// Mailboxes, indexed by thread slot then size class.
    mailboxes: Box<[Box<[Mutex<Vec<MailEntry>>]>]>,
    /// Orphaned blocks, indexed by size class.
    orphans: Box<[Mutex<Vec<LocalBlock>>]>,
    /// Free thread slots.
    slots: Mutex<Vec<usize>>,
    carve: Mutex<Carve>,
    /// Mirrors `Carve::small_top` for lock-free classification of freed pointers.
    small_top: AtomicUsize,
    large: Mutex<Large>,
    stats: Statistics,
}

impl Inner {
    fn new(config: Config, pool: Pool) -> Self {
        let classes = config.bins.len();
        let threads = config.max_threads.get();
        let blocks = pool.size() / config.block_size.get();
        let class_locks = |_| -> Box<[Mutex<Vec<MailEntry>>]> {
            (0..classes).map(|_| Mutex::default()).collect()
        };
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            metas: (0..blocks).map(|_| BlockMeta::default()).collect(),
            mailboxes: (0..threads).map(class_locks).collect(),
            orphans: (0..classes).map(|_| Mutex::default()).collect(),
            slots: Mutex::new((0..threads).rev().collect()),
            carve: Mutex::new(Carve {
                empty: Vec::new(),
                small_top: 0,
                large_bottom: pool.size(),
            }),
            small_top: AtomicUsize::new(0),
            large: Mutex::default(),
            stats: Statistics::default(),
            config,
            pool,
        }
    }

    pub(crate) fn acquire_slot(&self) -> Option<usize> {
        let slot = self.slots.lock().pop();
        if slot.is_none() {
            warn!(
                max_threads = self.config.max_threads.get(),
                "no thread slot available"
            );
        }
        slot
    }

    #[inline]
    fn chunk(&self, class: usize) -> usize {
        self.config.bins[class]
    }

    #[inline]
    fn block_ptr(&self, block: u32) -> *mut u8 {
        // SAFETY: Block indices handed out by carve_block lie inside the pool.
        unsafe { self.pool.at(block as usize * self.config.block_size.get()) }.as_ptr()
    }

    fn allocate_small(&self, heap: &mut LocalHeap, class: usize) -> Option<NonNull<u8>> {
        let chunk = self.chunk(class);
        let slot = heap.slot;
        let bin = &mut heap.bins[class];
        loop {
            // Active block
            if let Some(block) = bin.blocks.last_mut() {
                let base = self.block_ptr(block.index);
                // SAFETY: The heap holds this block, carved into chunks of this class.
                if let Some(index) = unsafe { block.pop(base, chunk) } {
                    self.stats.small_allocated();
                    // SAFETY: index is below the block's capacity.
                    return NonNull::new(unsafe { base.add(index as usize * chunk) });
                }
            }

            // Older blocks, newest first
            if let Some(position) = bin.blocks.iter().rposition(|block| !block.is_full()) {
                let block = bin.blocks.remove(position);
                bin.blocks.push(block);
                continue;
            }

            // Chunks freed by other threads
            if self.privatize(slot, class, bin) {
                continue;
            }

            // Orphaned blocks
            if let Some(block) = self.adopt(slot, class) {
                bin.blocks.push(block);
                continue;
            }

            // Empty block
            let index = self.carve_block()?;
            let meta = &self.metas[index as usize];
            meta.set_class(Some(class));
            meta.set_owner(Some(slot));
            self.stats.block_acquired();
            bin.blocks
                .push(LocalBlock::new(index, self.config.capacity(class)));
        }
    }

    /// Moves the chunks waiting in a mailbox to the private free lists of their blocks.
    /// Returns true if any chunk was moved.
    fn privatize(&self, slot: usize, class: usize, bin: &mut LocalBin) -> bool {
        let entries = std::mem::take(&mut *self.mailboxes[slot][class].lock());
        let chunk = self.chunk(class);
        let mut moved = false;
        for entry in entries {
            let Some(block) = bin.blocks.iter_mut().find(|block| block.index == entry.block)
            else {
                error!(block = entry.block, slot, "mailbox names a block the thread does not hold");
                continue;
            };
            // SAFETY: The chain holds freed chunks of this block.
            if !unsafe { block.splice(self.block_ptr(entry.block), chunk, &entry.chain) } {
                error!(
                    block = entry.block,
                    freed = entry.chain.len,
                    "mailbox holds more chunks than the block has live"
                );
                continue;
            }
            moved = true;
        }
        moved
    }

    fn adopt(&self, slot: usize, class: usize) -> Option<LocalBlock> {
        let mut orphans = self.orphans[class].lock();
        let block = orphans.pop()?;
        self.metas[block.index as usize].set_owner(Some(slot));
        Some(block)
    }

    /// Takes an empty block, carving a new batch from the pool if none is left.
    fn carve_block(&self) -> Option<u32> {
        let mut carve = self.carve.lock();
        if let Some(index) = carve.empty.pop() {
            return Some(index);
        }
        let block_size = self.config.block_size.get();
        let room = (carve.large_bottom - carve.small_top) / block_size;
        let count = room.min(self.config.blocks_per_big_block.get());
        if count == 0 {
            return None;
        }
        let first = carve.small_top / block_size;
        carve.small_top += count * block_size;
        self.small_top.store(carve.small_top, Ordering::Release);
        carve
            .empty
            .extend((first + 1..first + count).rev().map(|index| index as u32));
        debug!(first, count, "carved blocks from pool");
        Some(first as u32)
    }

    /// Returns an unused block to the pool.
    fn retire(&self, index: u32) {
        self.metas[index as usize].set_class(None);
        self.carve.lock().empty.push(index);
        self.stats.block_released();
    }

    fn deallocate_small(&self, offset: usize) -> Result<(), Error> {
        let block_size = self.config.block_size.get();
        let (block, within) = (offset / block_size, offset % block_size);
        let meta = &self.metas[block];
        let class = meta.class().ok_or(Error::InvalidPointer)?;
        let chunk = self.chunk(class);
        if within % chunk != 0 || within / chunk >= self.config.capacity(class) {
            return Err(Error::InvalidPointer);
        }
        let (block, index) = (block as u32, (within / chunk) as u32);

        // Owned by the calling thread: no lock
        let freed = thread::with_existing(self.id, |heap| {
            (meta.owner() == Some(heap.slot)).then(|| self.free_private(heap, class, block, index))
        });
        match freed {
            Some(result) => result?,
            None => self.free_public(class, block, index)?,
        }
        self.stats.small_deallocated();
        Ok(())
    }

    fn free_private(
        &self,
        heap: &mut LocalHeap,
        class: usize,
        block: u32,
        index: u32,
    ) -> Result<(), Error> {
        let chunk = self.chunk(class);
        let slot = heap.slot;
        let bin = &mut heap.bins[class];
        let Some(position) = bin.blocks.iter().position(|local| local.index == block) else {
            return Err(Error::Corrupted(format!(
                "block {block} is owned by slot {slot} but not held by it"
            )));
        };
        let local = &mut bin.blocks[position];
        let was_full = local.is_full();
        // SAFETY: The chunk belongs to this block and is no longer used by the caller.
        if !unsafe { local.push(self.block_ptr(block), chunk, index) } {
            return Err(Error::InvalidPointer);
        }
        let unused = local.is_unused();

        let active = position + 1 == bin.blocks.len();
        if unused && !active {
            let local = bin.blocks.remove(position);
            {
                let _mailbox = self.mailboxes[slot][class].lock();
                self.metas[local.index as usize].set_owner(None);
            }
            self.retire(local.index);
        } else if was_full && !active {
            // Prefer the block with fresh space over older ones
            let local = bin.blocks.remove(position);
            bin.blocks.push(local);
        }
        Ok(())
    }

    fn free_public(&self, class: usize, block: u32, index: u32) -> Result<(), Error> {
        let chunk = self.chunk(class);
        let meta = &self.metas[block as usize];
        let base = self.block_ptr(block);
        loop {
            match meta.owner() {
                Some(owner) => {
                    let mut mailbox = self.mailboxes[owner][class].lock();
                    if meta.owner() != Some(owner) {
                        continue;
                    }
                    let position = match mailbox.iter().position(|entry| entry.block == block) {
                        Some(position) => position,
                        None => {
                            // First foreign free into this block: register it
                            mailbox.push(MailEntry {
                                block,
                                chain: Chain::default(),
                            });
                            mailbox.len() - 1
                        }
                    };
                    // SAFETY: The chunk belongs to this block and is no longer used.
                    unsafe { mailbox[position].chain.push(base, chunk, index) };
                    return Ok(());
                }
                None => {
                    let mut orphans = self.orphans[class].lock();
                    if meta.owner().is_some() {
                        continue;
                    }
                    let Some(position) = orphans.iter().position(|orphan| orphan.index == block)
                    else {
                        return Err(Error::InvalidPointer);
                    };
                    let orphan = &mut orphans[position];
                    // SAFETY: See above.
                    if !unsafe { orphan.push(base, chunk, index) } {
                        return Err(Error::InvalidPointer);
                    }
                    if orphan.is_unused() {
                        orphans.swap_remove(position);
                        self.retire(block);
                    }
                    return Ok(());
                }
            }
        }
    }

    fn allocate_large(&self, size: usize) -> Option<NonNull<u8>> {
        let size = bits::align_up(size, LARGE_ALIGNMENT)?;
        let mut large = self.large.lock();
        let offset = match large.take(size) {
            Some(offset) => offset,
            None => {
                let mut carve = self.carve.lock();
                if carve.large_bottom - carve.small_top < size {
                    return None;
                }
                carve.large_bottom -= size;
                carve.large_bottom
            }
        };
        large.track(offset, size);
        drop(large);
        self.stats.large_allocated(size);
        // SAFETY: The region lies inside the pool.
        Some(unsafe { self.pool.at(offset) })
    }

    fn deallocate_large(&self, offset: usize) -> Result<(), Error> {
        let mut large = self.large.lock();
        let size = large.untrack(offset).ok_or(Error::InvalidPointer)?;
        let (start, len) = large.release(offset, size);

        // Hand space touching the boundary back, so blocks may be carved from it
        let mut carve = self.carve.lock();
        if start == carve.large_bottom {
            large.remove_free(start);
            carve.large_bottom += len;
        }
        drop(carve);
        drop(large);
        self.stats.large_deallocated(size);
        Ok(())
    }

    /// Hands every block of a heap back (see the module documentation).
    pub(crate) fn release_heap(&self, heap: &mut LocalHeap) {
        let slot = heap.slot;
        let (mut orphaned, mut retired) = (0, 0);
        for (class, bin) in heap.bins.iter_mut().enumerate() {
            let mut blocks = std::mem::take(&mut bin.blocks);
            if blocks.is_empty() {
                continue;
            }
            let chunk = self.chunk(class);
            let mut orphans = self.orphans[class].lock();
            let mut mailbox = self.mailboxes[slot][class].lock();
            for entry in mailbox.drain(..) {
                let Some(block) = blocks.iter_mut().find(|block| block.index == entry.block) else {
                    continue;
                };
                // SAFETY: The chain holds freed chunks of this block.
                if !unsafe { block.splice(self.block_ptr(entry.block), chunk, &entry.chain) } {
                    error!(
                        block = entry.block,
                        freed = entry.chain.len,
                        "mailbox holds more chunks than the block has live"
                    );
                }
            }
            for block in blocks {
                self.metas[block.index as usize].set_owner(None);
                if block.is_unused() {
                    self.retire(block.index);
                    retired += 1;
                } else {
                    orphans.push(block);
                    orphaned += 1;
                }
            }
        }
        self.slots.lock().push(slot);
        debug!(slot, orphaned, retired, "released thread heap");
    }
}

/// A pool allocator for small, short-lived objects shared by many threads.
///
/// Requests up to and including [Config::large_threshold] bytes are rounded up to a size
/// class and served from thread-owned blocks; larger requests are served by a first-fit large
/// allocator.
/// See the [module documentation](self) for the allocation path and locking.
#[derive(Clone)]
pub struct ScalablePoolAllocator {
    inner: Arc<Inner>,
}

impl ScalablePoolAllocator {
    /// Creates an allocator over a freshly allocated pool of `config.pool_size` bytes.
    pub fn new(config: Config) -> Result<Self, Error> {
        config.validate()?;
        let pool = Pool::allocate(config.pool_size.get(), config.block_size.get())?;
        Ok(Self::with_pool(config, pool))
    }

    /// Creates an allocator over `config.pool_size` bytes owned by the caller. The allocator
    /// never frees them.
    ///
    /// # Safety
    ///
    /// `base` must be aligned to [LARGE_ALIGNMENT] and valid for reads and writes of
    /// `config.pool_size` bytes, which must not be accessed other than through pointers
    /// returned by this allocator until it (and every clone) is dropped.
    pub unsafe fn from_raw_parts(base: NonNull<u8>, config: Config) -> Result<Self, Error> {
        config.validate()?;
        if base.as_ptr() as usize % LARGE_ALIGNMENT != 0 {
            return Err(Error::InvalidConfig("pool base is not cache-line aligned"));
        }
        // SAFETY: Forwarded to the caller.
        let pool = unsafe { Pool::from_raw_parts(base, config.pool_size.get()) }?;
        Ok(Self::with_pool(config, pool))
    }

    fn with_pool(config: Config, pool: Pool) -> Self {
        Self {
            inner: Arc::new(Inner::new(config, pool)),
        }
    }

    /// Allocates at least `size` bytes (a zero-byte request is served as one byte).
    ///
    /// The large threshold is inclusive on the small side: a request of exactly
    /// [Config::large_threshold] bytes (the last size class) is still served from a block,
    /// and only strictly larger requests go to the large allocator.
    ///
    /// Returns `None` when the pool is exhausted or every thread slot is taken.
    pub fn allocate(&self, size: usize) -> Option<NonNull<u8>> {
        let inner = &self.inner;
        let size = size.max(1);
        let ptr = match inner.config.bin_index(size) {
            Some(class) => {
                thread::with_heap(inner, |heap| inner.allocate_small(heap, class)).flatten()
            }
            None => inner.allocate_large(size),
        };
        if ptr.is_none() {
            inner.stats.allocation_failed();
            warn!(size, "scalable pool exhausted");
        }
        ptr
    }

    /// Returns memory obtained from [Self::allocate] (on any thread) to the pool.
    ///
    /// Fails with [Error::InvalidPointer] for pointers this allocator did not hand out and
    /// leaves the allocator untouched. A small chunk freed twice is only rejected when the
    /// free is applied directly (on the owning thread, or into an orphaned block) and its
    /// block has no other live chunk; otherwise double frees are not detected.
    pub fn deallocate(&self, ptr: NonNull<u8>) -> Result<(), Error> {
        let inner = &self.inner;
        let Some(offset) = inner.pool.offset_of(ptr) else {
            warn!(?ptr, "rejected deallocation of foreign pointer");
            return Err(Error::InvalidPointer);
        };
        let result = if offset < inner.small_top.load(Ordering::Acquire) {
            inner.deallocate_small(offset)
        } else {
            inner.deallocate_large(offset)
        };
        if let Err(err) = &result {
            warn!(offset, %err, "rejected deallocation");
        }
        result
    }

    /// Returns the number of bytes usable at `ptr` (the chunk size, or the aligned size of a
    /// large region).
    pub fn usable_size(&self, ptr: NonNull<u8>) -> Option<usize> {
        let inner = &self.inner;
        let offset = inner.pool.offset_of(ptr)?;
        if offset < inner.small_top.load(Ordering::Acquire) {
            let block_size = inner.config.block_size.get();
            let class = inner.metas[offset / block_size].class()?;
            Some(inner.chunk(class))
        } else {
            inner.large.lock().size_of(offset)
        }
    }

    /// Returns the size class serving requests of `size` bytes. See [Config::bin_index].
    pub fn bin_index(&self, size: usize) -> Option<usize> {
        self.inner.config.bin_index(size)
    }

    /// Returns the chunk size of a size class.
    pub fn chunk_size(&self, index: usize) -> Option<usize> {
        self.inner.config.chunk_size(index)
    }

    /// Hands the calling thread's blocks back to the allocator and frees its thread slot.
    ///
    /// Runs automatically when a thread exits. Returns false if the thread has not allocated
    /// from this allocator since its last release. Chunks the thread still has live stay valid.
    pub fn release_thread(&self) -> bool {
        // Dropping the heap releases it
        thread::take_heap(self.inner.id).is_some()
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn stats(&self) -> &Statistics {
        &self.inner.stats
    }

    /// Registers the allocator's statistics with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        self.inner.stats.register(registry);
    }

    /// Bytes not yet carved into blocks or large regions.
    pub fn unclaimed(&self) -> usize {
        let carve = self.inner.carve.lock();
        carve.large_bottom - carve.small_top
    }

    /// Number of empty blocks ready to be handed to a thread.
    pub fn empty_blocks(&self) -> usize {
        self.inner.carve.lock().empty.len()
    }

    /// Number of partially used blocks left behind by exited threads.
    pub fn orphaned_blocks(&self) -> usize {
        self.inner
            .orphans
            .iter()
            .map(|orphans| orphans.lock().len())
            .sum()
    }

    /// Bytes held by free (not yet reused) large regions.
    pub fn free_large_bytes(&self) -> usize {
        self.inner.large.lock().free_bytes()
    }

    /// Bytes held by live large regions.
    pub fn live_large_bytes(&self) -> usize {
        self.inner.large.lock().live_bytes()
    }

    /// Returns true if the pool was allocated by this allocator.
    pub fn owns_pool(&self) -> bool {
        self.inner.pool.is_owned()
    }
}
