//! Compaction of a [FragmentAllocator] pool.

use super::{Block, FragmentAllocator};
use std::ops::Range;
use tracing::debug;

/// Moves bytes inside the pool during compaction.
///
/// `src` and `dst..dst + src.len()` may overlap (blocks only ever move towards the start of
/// the pool), so implementations must copy as [slice::copy_within] does.
pub trait Relocate {
    fn relocate(&mut self, pool: &mut [u8], src: Range<usize>, dst: usize);
}

/// Relocates with [slice::copy_within] (a `memmove`).
#[derive(Clone, Copy, Debug, Default)]
pub struct MemMove;

impl Relocate for MemMove {
    #[inline]
    fn relocate(&mut self, pool: &mut [u8], src: Range<usize>, dst: usize) {
        pool.copy_within(src, dst);
    }
}

impl<F: FnMut(&mut [u8], Range<usize>, usize)> Relocate for F {
    #[inline]
    fn relocate(&mut self, pool: &mut [u8], src: Range<usize>, dst: usize) {
        self(pool, src, dst)
    }
}

/// Outcome of a compaction pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefragStats {
    /// Used blocks that changed offset.
    pub moved_blocks: usize,
    /// Bytes copied by the relocator.
    pub moved_bytes: usize,
    /// Size of the single free block left at the end of the pool.
    pub reclaimed: usize,
}

/// Compacts every used block of a [FragmentAllocator] towards the start of its pool.
///
/// A single pass walks the blocks in offset order, summing the free space seen so far. Each
/// used block is shifted left by that sum (copied by the [Relocate] implementation, then its
/// offset updated) and each free block is dropped. All free space ends up in one trailing
/// block. Handles stay valid since they name blocks, not offsets.
///
/// The allocator lock is held for the whole pass.
pub struct FragmentFreeOperator<'a, R: Relocate = MemMove> {
    allocator: &'a FragmentAllocator,
    relocator: R,
}

impl<'a> FragmentFreeOperator<'a> {
    pub fn new(allocator: &'a FragmentAllocator) -> Self {
        Self::with_relocator(allocator, MemMove)
    }
}

impl<'a, R: Relocate> FragmentFreeOperator<'a, R> {
    pub fn with_relocator(allocator: &'a FragmentAllocator, relocator: R) -> Self {
        Self {
            allocator,
            relocator,
        }
    }

    /// Runs one compaction pass.
    pub fn run(&mut self) -> DefragStats {
        let allocator = self.allocator;
        let mut inner = allocator.lock();

        // SAFETY: The pool is valid for its whole size and the lock excludes every other
        // access made through the allocator for as long as the slice lives.
        let pool =
            unsafe { std::slice::from_raw_parts_mut(allocator.pool.as_ptr(), allocator.pool.size()) };

        let mut stats = DefragStats::default();
        let (mut shift, mut tail, mut cursor) = (0, None, inner.head);
        while let Some(index) = cursor {
            let Block {
                offset,
                size,
                free,
                next,
                ..
            } = inner.blocks[index];
            if free {
                inner.unlink_free(index);
                inner.remove_block(index);
                shift += size;
            } else {
                if shift > 0 {
                    self.relocator
                        .relocate(pool, offset..offset + size, offset - shift);
                    inner.blocks[index].offset = offset - shift;
                    stats.moved_blocks += 1;
                    stats.moved_bytes += size;
                }
                tail = Some(index);
            }
            cursor = next;
        }

        if shift > 0 {
            let mut block = Block::new(allocator.pool.size() - shift, shift, true);
            block.prev = tail;
            let index = inner.new_block(block);
            match tail {
                Some(tail) => inner.blocks[tail].next = Some(index),
                None => inner.head = Some(index),
            }
            inner.link_free(index, None);
        }
        stats.reclaimed = shift;
        debug!(
            moved_blocks = stats.moved_blocks,
            moved_bytes = stats.moved_bytes,
            reclaimed = stats.reclaimed,
            "defragmented fragment pool"
        );
        stats
    }
}
