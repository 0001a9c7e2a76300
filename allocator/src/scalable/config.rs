use crate::Error;
use conduit_utils::NZUsize;
use std::num::NonZeroUsize;

/// Maximum number of size classes.
pub const MAX_BINS: usize = 32;

/// Default size classes: 8 byte steps up to 32, then four classes per power of two.
pub const DEFAULT_BINS: [usize; MAX_BINS] = [
    8, 16, 24, 32, 48, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 640, 768,
    896, 1024, 1280, 1536, 1792, 2048, 2560, 3072, 4096, 5120, 6144, 8192,
];

/// Smallest supported block.
const MIN_BLOCK_SIZE: usize = 1024;

/// Largest supported block (chunk indices must fit in a `u32`).
const MAX_BLOCK_SIZE: usize = 1 << 30;

/// Configuration for a [super::ScalablePoolAllocator].
#[derive(Clone, Debug)]
pub struct Config {
    /// Size of the pool. Must be a multiple of `block_size`.
    pub pool_size: NonZeroUsize,
    /// Size of a block, the unit carved into chunks of one size class. Must be a power of two.
    pub block_size: NonZeroUsize,
    /// Chunk size of each size class, strictly increasing multiples of 8. Requests larger
    /// than the last class are served by the large allocator.
    pub bins: Vec<usize>,
    /// Blocks carved from the pool at a time.
    pub blocks_per_big_block: NonZeroUsize,
    /// Maximum number of threads that may hold blocks at the same time.
    pub max_threads: NonZeroUsize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_size: NZUsize!(64 * 1024 * 1024),
            block_size: NZUsize!(16 * 1024),
            bins: DEFAULT_BINS.to_vec(),
            blocks_per_big_block: NZUsize!(16),
            max_threads: NZUsize!(64),
        }
    }
}

impl Config {
    /// Default configuration over a pool of `pool_size` bytes.
    pub fn with_pool_size(pool_size: NonZeroUsize) -> Self {
        Self {
            pool_size,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let block_size = self.block_size.get();
        if !block_size.is_power_of_two() {
            return Err(Error::InvalidConfig("block_size must be a power of two"));
        }
        if !(MIN_BLOCK_SIZE..=MAX_BLOCK_SIZE).contains(&block_size) {
            return Err(Error::InvalidConfig("block_size must be between 1 KiB and 1 GiB"));
        }
        if self.pool_size.get() % block_size != 0 {
            return Err(Error::InvalidConfig(
                "pool_size must be a multiple of block_size",
            ));
        }
        if self.pool_size.get() / block_size > u32::MAX as usize {
            return Err(Error::InvalidConfig("pool_size holds too many blocks"));
        }
        if self.bins.is_empty() || self.bins.len() > MAX_BINS {
            return Err(Error::InvalidConfig("bins must hold between 1 and 32 sizes"));
        }
        if self.bins.iter().any(|&bin| bin == 0 || bin % 8 != 0) {
            return Err(Error::InvalidConfig("bins must be non-zero multiples of 8"));
        }
        if self.bins.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(Error::InvalidConfig("bins must be strictly increasing"));
        }
        if self.large_threshold() > block_size {
            return Err(Error::InvalidConfig("bins must not exceed block_size"));
        }
        if self.max_threads.get() >= u32::MAX as usize {
            return Err(Error::InvalidConfig("max_threads is too large"));
        }
        Ok(())
    }

    /// Returns the size class serving requests of `size` bytes, or `None` if the request
    /// is for the large allocator.
    ///
    /// Binary search over the bin table, so at most `log2(bins)` comparisons.
    #[inline]
    pub fn bin_index(&self, size: usize) -> Option<usize> {
        let index = self.bins.partition_point(|&bin| bin < size);
        (index < self.bins.len()).then_some(index)
    }

    /// Returns the chunk size of a size class.
    #[inline]
    pub fn chunk_size(&self, index: usize) -> Option<usize> {
        self.bins.get(index).copied()
    }

    /// Largest request served from blocks (the last size class). Requests of exactly this
    /// many bytes are small.
    #[inline]
    pub fn large_threshold(&self) -> usize {
        self.bins.last().copied().unwrap_or(0)
    }

    /// Number of chunks in a block of the given size class.
    #[inline]
    pub(crate) fn capacity(&self, index: usize) -> usize {
        self.block_size.get() / self.bins[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.large_threshold(), 8192);
        assert_eq!(config.capacity(0), 2048);
        assert_eq!(config.capacity(31), 2);
    }

    #[test]
    fn test_bin_index() {
        let config = Config::default();
        assert_eq!(config.bin_index(0), Some(0));
        assert_eq!(config.bin_index(1), Some(0));
        assert_eq!(config.bin_index(8), Some(0));
        assert_eq!(config.bin_index(9), Some(1));
        assert_eq!(config.bin_index(33), Some(4));
        assert_eq!(config.bin_index(1025), Some(22));
        assert_eq!(config.bin_index(8192), Some(31));
        assert_eq!(config.bin_index(8193), None);

        // Every size maps to the smallest class that holds it
        for size in 1..=8192 {
            let index = config.bin_index(size).unwrap();
            let chunk = config.chunk_size(index).unwrap();
            assert!(chunk >= size);
            assert!(index == 0 || config.chunk_size(index - 1).unwrap() < size);
        }
    }

    #[test]
    fn test_invalid() {
        let check = |update: fn(&mut Config)| {
            let mut config = Config::default();
            update(&mut config);
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        };
        check(|c| c.block_size = NZUsize!(3000));
        check(|c| c.block_size = NZUsize!(512));
        check(|c| c.pool_size = NZUsize!(20_000));
        check(|c| c.bins.clear());
        check(|c| c.bins = (1..=33).map(|i| i * 8).collect());
        check(|c| c.bins = vec![8, 12]);
        check(|c| c.bins = vec![16, 8]);
        check(|c| c.bins = vec![8, 32 * 1024]);
    }

    #[test]
    fn test_custom_bins() {
        let config = Config {
            bins: vec![64, 256, 1024],
            ..Config::default()
        };
        config.validate().unwrap();
        assert_eq!(config.bin_index(65), Some(1));
        assert_eq!(config.bin_index(1025), None);
        assert_eq!(config.chunk_size(3), None);
    }
}
