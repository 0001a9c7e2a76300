use conduit_allocator::scalable::{Config, ScalablePoolAllocator};
use conduit_macros::test_traced;
use conduit_utils::NZUsize;
use prometheus_client::{encoding::text::encode, registry::Registry};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use std::{
    ptr::NonNull,
    sync::{Arc, Barrier},
    thread,
};

const THREADS: usize = 4;
const PER_THREAD: usize = 2_000;

fn allocator() -> ScalablePoolAllocator {
    ScalablePoolAllocator::new(Config::with_pool_size(NZUsize!(64 * 1024 * 1024))).unwrap()
}

/// Fills a chunk with a pattern derived from its address.
fn stamp(ptr: NonNull<u8>, len: usize) {
    let tag = (ptr.as_ptr() as usize >> 3) as u8;
    // SAFETY: Every chunk handed out holds at least `len` bytes.
    unsafe { ptr.as_ptr().write_bytes(tag, len) };
}

fn check_stamp(ptr: NonNull<u8>, len: usize) {
    let tag = (ptr.as_ptr() as usize >> 3) as u8;
    // SAFETY: Written by stamp() and still live.
    let bytes = unsafe { std::slice::from_raw_parts(ptr.as_ptr(), len) };
    assert!(bytes.iter().all(|&b| b == tag), "chunk at {ptr:?} was overwritten");
}

#[test_traced("INFO")]
fn test_cross_thread_shuffled_frees() {
    let allocator = allocator();
    let barrier = Arc::new(Barrier::new(THREADS));

    // Each thread allocates its share of objects of random sizes
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let allocator = allocator.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(t as u64);
                let chunks: Vec<(usize, usize)> = (0..PER_THREAD)
                    .map(|_| {
                        let len = rng.gen_range(1..=2048);
                        let ptr = allocator.allocate(len).unwrap();
                        stamp(ptr, len);
                        (ptr.as_ptr() as usize, len)
                    })
                    .collect();
                barrier.wait();
                chunks
            })
        })
        .collect();
    let mut chunks: Vec<(usize, usize)> = handles
        .into_iter()
        .flat_map(|handle| handle.join().unwrap())
        .collect();
    assert_eq!(allocator.stats().chunks_in_use(), (THREADS * PER_THREAD) as i64);

    // Shuffle ownership of the frees across a new set of threads
    chunks.shuffle(&mut StdRng::seed_from_u64(99));
    let handles: Vec<_> = chunks
        .chunks(PER_THREAD)
        .map(|share| {
            let allocator = allocator.clone();
            let share = share.to_vec();
            thread::spawn(move || {
                let mut keep = Vec::new();
                for (i, (addr, len)) in share.into_iter().enumerate() {
                    let ptr = NonNull::new(addr as *mut u8).unwrap();
                    check_stamp(ptr, len);
                    allocator.deallocate(ptr).unwrap();

                    // Interleave fresh allocations with the foreign frees
                    if i % 4 == 0 {
                        let fresh = allocator.allocate(len).unwrap();
                        stamp(fresh, len);
                        keep.push((fresh, len));
                    }
                }
                for (ptr, len) in keep {
                    check_stamp(ptr, len);
                    allocator.deallocate(ptr).unwrap();
                }
                allocator.release_thread();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let stats = allocator.stats();
    assert_eq!(stats.chunks_in_use(), 0);
    assert_eq!(stats.small_allocations(), stats.small_deallocations());
    assert_eq!(stats.blocks_in_use(), 0);
    assert_eq!(stats.underruns(), 0);
    assert_eq!(allocator.orphaned_blocks(), 0);
}

#[test]
fn test_concurrent_churn() {
    let allocator = allocator();
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let allocator = allocator.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(100 + t as u64);
                let mut live = Vec::new();
                for _ in 0..20_000 {
                    if live.is_empty() || rng.gen_bool(0.5) {
                        // Mostly small, sometimes large
                        let len = if rng.gen_ratio(1, 50) {
                            rng.gen_range(8193..64 * 1024)
                        } else {
                            rng.gen_range(1..=512)
                        };
                        let ptr = allocator.allocate(len).unwrap();
                        assert!(allocator.usable_size(ptr).unwrap() >= len);
                        stamp(ptr, len);
                        live.push((ptr, len));
                    } else {
                        let (ptr, len) = live.swap_remove(rng.gen_range(0..live.len()));
                        check_stamp(ptr, len);
                        allocator.deallocate(ptr).unwrap();
                    }
                }
                for (ptr, len) in live {
                    check_stamp(ptr, len);
                    allocator.deallocate(ptr).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Exited threads released their blocks
    let stats = allocator.stats();
    assert_eq!(stats.chunks_in_use(), 0);
    assert_eq!(stats.blocks_in_use(), 0);
    assert_eq!(stats.large_bytes_in_use(), 0);
    assert_eq!(stats.large_allocations(), stats.large_deallocations());
    assert_eq!(stats.underruns(), 0);
}

#[test]
fn test_custom_bins() {
    let config = Config {
        pool_size: NZUsize!(4 * 1024 * 1024),
        bins: vec![32, 128, 512],
        ..Config::default()
    };
    let allocator = ScalablePoolAllocator::new(config).unwrap();
    assert_eq!(allocator.bin_index(100), Some(1));
    assert_eq!(allocator.chunk_size(1), Some(128));

    let small = allocator.allocate(100).unwrap();
    assert_eq!(allocator.usable_size(small), Some(128));

    // Above the last class goes to the large allocator
    let large = allocator.allocate(513).unwrap();
    assert_eq!(allocator.stats().large_allocations(), 1);
    assert!(allocator.usable_size(large).unwrap() >= 513);

    allocator.deallocate(small).unwrap();
    allocator.deallocate(large).unwrap();
    allocator.release_thread();
}

#[test]
fn test_metrics_registry() {
    let allocator = allocator();
    let mut registry = Registry::default();
    allocator.register(&mut registry);

    let ptr = allocator.allocate(64).unwrap();
    let mut encoded = String::new();
    encode(&mut encoded, &registry).unwrap();
    assert!(encoded.contains("scalable_pool_small_allocations_total 1"));
    assert!(encoded.contains("scalable_pool_blocks_in_use 1"));

    allocator.deallocate(ptr).unwrap();
    allocator.release_thread();
    let mut encoded = String::new();
    encode(&mut encoded, &registry).unwrap();
    assert!(encoded.contains("scalable_pool_chunks_in_use 0"));
    assert!(encoded.contains("scalable_pool_blocks_in_use 0"));
}
