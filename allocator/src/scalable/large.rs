//! Bookkeeping for requests larger than the largest size class.
//!
//! Large regions are carved downwards from the top of the pool. Released regions go to a
//! free map keyed by offset (merged with adjacent free regions) and are reused first fit.
//! Only offsets are tracked here; the caller owns the memory and the boundary with the block
//! region.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
pub(crate) struct Large {
    free: BTreeMap<usize, usize>,
    live: HashMap<usize, usize>,
}

impl Large {
    /// Takes the low end of the first free region of at least `size` bytes.
    pub(crate) fn take(&mut self, size: usize) -> Option<usize> {
        let (&offset, &len) = self.free.iter().find(|(_, &len)| len >= size)?;
        self.free.remove(&offset);
        if len > size {
            self.free.insert(offset + size, len - size);
        }
        Some(offset)
    }

    pub(crate) fn track(&mut self, offset: usize, size: usize) {
        self.live.insert(offset, size);
    }

    /// Stops tracking a live region, returning its size.
    pub(crate) fn untrack(&mut self, offset: usize) -> Option<usize> {
        self.live.remove(&offset)
    }

    pub(crate) fn size_of(&self, offset: usize) -> Option<usize> {
        self.live.get(&offset).copied()
    }

    /// Adds a region to the free map, merging it with its neighbors. Returns the merged
    /// region.
    pub(crate) fn release(&mut self, mut offset: usize, mut size: usize) -> (usize, usize) {
        let end = offset + size;
        if let Some((&prev, &len)) = self.free.range(..offset).next_back() {
            if prev + len == offset {
                self.free.remove(&prev);
                offset = prev;
                size += len;
            }
        }
        if let Some(len) = self.free.remove(&end) {
            size += len;
        }
        self.free.insert(offset, size);
        (offset, size)
    }

    /// Removes a free region (when it is handed back to the pool).
    pub(crate) fn remove_free(&mut self, offset: usize) {
        self.free.remove(&offset);
    }

    pub(crate) fn live_bytes(&self) -> usize {
        self.live.values().sum()
    }

    pub(crate) fn free_bytes(&self) -> usize {
        self.free.values().sum()
    }
}
