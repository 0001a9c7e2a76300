//! Per-thread heaps.
//!
//! Each thread that allocates from a [super::ScalablePoolAllocator] gets a [LocalHeap]: a
//! slot id (naming its mailboxes) and one [LocalBin] per size class holding the private
//! state of the blocks it owns. Heaps live in a thread local, keyed by allocator id, and hold
//! only a weak reference to the allocator. When a heap is dropped (explicitly through
//! `release_thread` or by the thread local destructor at thread exit) its blocks are handed
//! back to the allocator.

use super::{block::LocalBlock, Inner};
use std::{
    cell::RefCell,
    sync::{Arc, Weak},
};

/// Blocks of one size class held by a thread. The last block is the active one.
#[derive(Debug, Default)]
pub(crate) struct LocalBin {
    pub(crate) blocks: Vec<LocalBlock>,
}

pub(crate) struct LocalHeap {
    pub(crate) id: u64,
    pub(crate) slot: usize,
    pub(crate) bins: Vec<LocalBin>,
    inner: Weak<Inner>,
}

impl LocalHeap {
    fn new(inner: &Arc<Inner>, slot: usize) -> Self {
        Self {
            id: inner.id,
            slot,
            bins: (0..inner.config.bins.len())
                .map(|_| LocalBin::default())
                .collect(),
            inner: Arc::downgrade(inner),
        }
    }
}

impl Drop for LocalHeap {
    fn drop(&mut self) {
        // The allocator (and its pool) may already be gone
        if let Some(inner) = self.inner.upgrade() {
            inner.release_heap(self);
        }
    }
}

thread_local! {
    static HEAPS: RefCell<Vec<LocalHeap>> = const { RefCell::new(Vec::new()) };
}

/// Runs `f` with the calling thread's heap for `inner`, creating the heap on first use.
///
/// Returns `None` if no thread slot is free or the thread local is being destroyed.
pub(crate) fn with_heap<R>(inner: &Arc<Inner>, f: impl FnOnce(&mut LocalHeap) -> R) -> Option<R> {
    HEAPS
        .try_with(|heaps| {
            let mut heaps = heaps.try_borrow_mut().ok()?;
            let position = match heaps.iter().position(|heap| heap.id == inner.id) {
                Some(position) => position,
                None => {
                    // Forget heaps of dropped allocators
                    heaps.retain(|heap| heap.inner.strong_count() > 0);
                    let slot = inner.acquire_slot()?;
                    heaps.push(LocalHeap::new(inner, slot));
                    heaps.len() - 1
                }
            };
            Some(f(&mut heaps[position]))
        })
        .ok()
        .flatten()
}

/// Runs `f` with the calling thread's heap for allocator `id`, if it has one.
pub(crate) fn with_existing<R>(id: u64, f: impl FnOnce(&mut LocalHeap) -> Option<R>) -> Option<R> {
    HEAPS
        .try_with(|heaps| {
            let mut heaps = heaps.try_borrow_mut().ok()?;
            let heap = heaps.iter_mut().find(|heap| heap.id == id)?;
            f(heap)
        })
        .ok()
        .flatten()
}

/// Removes the calling thread's heap for allocator `id`.
pub(crate) fn take_heap(id: u64) -> Option<LocalHeap> {
    HEAPS
        .try_with(|heaps| {
            let mut heaps = heaps.try_borrow_mut().ok()?;
            let position = heaps.iter().position(|heap| heap.id == id)?;
            Some(heaps.swap_remove(position))
        })
        .ok()
        .flatten()
}
