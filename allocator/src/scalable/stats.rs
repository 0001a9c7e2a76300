//! Allocation statistics.

use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use tracing::error;

/// Counters and gauges maintained by a [super::ScalablePoolAllocator].
///
/// All metrics are shared handles: clones registered with a [Registry] observe the same
/// values.
#[derive(Debug, Default)]
pub struct Statistics {
    small_allocations: Counter,
    small_deallocations: Counter,
    large_allocations: Counter,
    large_deallocations: Counter,
    failed_allocations: Counter,
    blocks_in_use: Gauge,
    chunks_in_use: Gauge,
    large_bytes_in_use: Gauge,
    underruns: Counter,
}

impl Statistics {
    /// Registers every metric with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register(
            "scalable_pool_small_allocations",
            "Number of chunks allocated from blocks",
            self.small_allocations.clone(),
        );
        registry.register(
            "scalable_pool_small_deallocations",
            "Number of chunks returned to blocks",
            self.small_deallocations.clone(),
        );
        registry.register(
            "scalable_pool_large_allocations",
            "Number of regions allocated by the large allocator",
            self.large_allocations.clone(),
        );
        registry.register(
            "scalable_pool_large_deallocations",
            "Number of regions returned to the large allocator",
            self.large_deallocations.clone(),
        );
        registry.register(
            "scalable_pool_failed_allocations",
            "Number of allocations that found the pool exhausted",
            self.failed_allocations.clone(),
        );
        registry.register(
            "scalable_pool_blocks_in_use",
            "Number of blocks carved into chunks",
            self.blocks_in_use.clone(),
        );
        registry.register(
            "scalable_pool_chunks_in_use",
            "Number of live chunks",
            self.chunks_in_use.clone(),
        );
        registry.register(
            "scalable_pool_large_bytes_in_use",
            "Bytes held by live large regions",
            self.large_bytes_in_use.clone(),
        );
        registry.register(
            "scalable_pool_underruns",
            "Number of gauge decrements below zero (bookkeeping bugs)",
            self.underruns.clone(),
        );
    }

    pub(crate) fn small_allocated(&self) {
        self.small_allocations.inc();
        self.chunks_in_use.inc();
    }

    pub(crate) fn small_deallocated(&self) {
        self.small_deallocations.inc();
        self.decrement(&self.chunks_in_use, 1, "chunks_in_use");
    }

    pub(crate) fn large_allocated(&self, size: usize) {
        self.large_allocations.inc();
        self.large_bytes_in_use.inc_by(size as i64);
    }

    pub(crate) fn large_deallocated(&self, size: usize) {
        self.large_deallocations.inc();
        self.decrement(&self.large_bytes_in_use, size as i64, "large_bytes_in_use");
    }

    pub(crate) fn block_acquired(&self) {
        self.blocks_in_use.inc();
    }

    pub(crate) fn block_released(&self) {
        self.decrement(&self.blocks_in_use, 1, "blocks_in_use");
    }

    pub(crate) fn allocation_failed(&self) {
        self.failed_allocations.inc();
    }

    /// Decrements a gauge, surfacing (instead of hiding) a drop below zero.
    fn decrement(&self, gauge: &Gauge, amount: i64, name: &'static str) {
        let previous = gauge.dec_by(amount);
        if previous < amount {
            self.underruns.inc();
            error!(gauge = name, previous, amount, "allocator statistics underrun");
        }
    }

    pub fn small_allocations(&self) -> u64 {
        self.small_allocations.get()
    }

    pub fn small_deallocations(&self) -> u64 {
        self.small_deallocations.get()
    }

    pub fn large_allocations(&self) -> u64 {
        self.large_allocations.get()
    }

    pub fn large_deallocations(&self) -> u64 {
        self.large_deallocations.get()
    }

    pub fn failed_allocations(&self) -> u64 {
        self.failed_allocations.get()
    }

    pub fn blocks_in_use(&self) -> i64 {
        self.blocks_in_use.get()
    }

    pub fn chunks_in_use(&self) -> i64 {
        self.chunks_in_use.get()
    }

    pub fn large_bytes_in_use(&self) -> i64 {
        self.large_bytes_in_use.get()
    }

    pub fn underruns(&self) -> u64 {
        self.underruns.get()
    }
}
