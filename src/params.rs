//! Chain parameters: epoch length and the growth of cache and dataset sizes.
use crate::core::HASH_BYTES;
use crate::error::Error;
use serde::{Deserialize, Serialize};

/// Width of the mix row read by one dataset access.
pub const MIX_BYTES: usize = 128;
/// Pollination passes over a freshly chained cache.
pub const CACHE_ROUNDS: usize = 3;
/// Cache items mixed into every dataset item.
pub const DATASET_PARENTS: u32 = 256;
/// Dataset rows read per nonce.
pub const LOOKUP_ACCESSES: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainParams {
    pub epoch_length: u64,
    pub cache_init_bytes: u64,
    pub cache_growth_bytes: u64,
    pub dataset_init_bytes: u64,
    pub dataset_growth_bytes: u64,
}

impl Default for ChainParams {
    fn default() -> Self {
        Self::mainnet()
    }
}

impl ChainParams {
    pub const fn mainnet() -> Self {
        Self {
            epoch_length: 30_000,
            cache_init_bytes: 1 << 24,
            cache_growth_bytes: 1 << 17,
            dataset_init_bytes: 1 << 30,
            dataset_growth_bytes: 1 << 23,
        }
    }

    /// Tiny fixed sizes for fast tests: 1 KiB cache, 32 KiB dataset.
    pub const fn tester() -> Self {
        Self {
            epoch_length: 30_000,
            cache_init_bytes: 1024,
            cache_growth_bytes: 0,
            dataset_init_bytes: 32 * 1024,
            dataset_growth_bytes: 0,
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.epoch_length == 0 {
            return Err(Error::InvalidConfig("epoch_length must be >= 1".into()));
        }
        if self.cache_init_bytes < 2 * HASH_BYTES as u64 {
            return Err(Error::InvalidConfig(format!(
                "cache_init_bytes must be >= {}",
                2 * HASH_BYTES
            )));
        }
        if self.dataset_init_bytes < 2 * MIX_BYTES as u64 {
            return Err(Error::InvalidConfig(format!(
                "dataset_init_bytes must be >= {}",
                2 * MIX_BYTES
            )));
        }
        if self.dataset_init_bytes < self.cache_init_bytes {
            return Err(Error::InvalidConfig(
                "dataset must not be smaller than the cache".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    pub fn epoch(&self, block_number: u64) -> u64 {
        block_number / self.epoch_length
    }

    /// Whether most of the epoch containing `block_number` has gone by, so
    /// the next epoch should be generated ahead of need.
    pub fn nearing_epoch_end(&self, block_number: u64) -> bool {
        let remaining = self.epoch_length - block_number % self.epoch_length;
        remaining.saturating_mul(4) <= self.epoch_length
    }

    /// Cache size in bytes: a prime number of items.
    pub fn cache_size(&self, epoch: u64) -> usize {
        let bytes = self
            .cache_init_bytes
            .saturating_add(self.cache_growth_bytes.saturating_mul(epoch));
        prime_rows(bytes, HASH_BYTES)
    }

    /// Dataset size in bytes: a prime number of mix rows.
    pub fn dataset_size(&self, epoch: u64) -> usize {
        let bytes = self
            .dataset_init_bytes
            .saturating_add(self.dataset_growth_bytes.saturating_mul(epoch));
        prime_rows(bytes, MIX_BYTES)
    }
}

/// Largest `rows * row_bytes <= bytes` with a prime `rows`.
fn prime_rows(bytes: u64, row_bytes: usize) -> usize {
    let mut rows = bytes / row_bytes as u64;
    while rows > 2 && !is_prime(rows) {
        rows -= 1;
    }
    (rows as usize) * row_bytes
}

fn is_prime(n: u64) -> bool {
    if n < 2 {
        return false;
    }
    if n % 2 == 0 {
        return n == 2;
    }
    let mut d = 3u64;
    while d * d <= n {
        if n % d == 0 {
            return false;
        }
        d += 2;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_prime_multiples() {
        let p = ChainParams::mainnet();
        for epoch in [0u64, 1, 100, 511] {
            let cache = p.cache_size(epoch);
            let full = p.dataset_size(epoch);
            assert_eq!(cache % HASH_BYTES, 0);
            assert!(is_prime((cache / HASH_BYTES) as u64));
            assert_eq!(full % MIX_BYTES, 0);
            assert!(is_prime((full / MIX_BYTES) as u64));
        }
    }

    #[test]
    fn sizes_grow_monotonically() {
        for p in [ChainParams::mainnet(), ChainParams::tester()] {
            let mut prev = (0usize, 0usize);
            for epoch in 0..200 {
                let cur = (p.cache_size(epoch), p.dataset_size(epoch));
                assert!(cur.0 >= prev.0, "cache shrank at epoch {epoch}");
                assert!(cur.1 >= prev.1, "dataset shrank at epoch {epoch}");
                prev = cur;
            }
        }
    }

    #[test]
    fn mainnet_epoch_zero_sizes() {
        let p = ChainParams::mainnet();
        // largest prime item counts below 2^18 and 2^23
        assert_eq!(p.cache_size(0), 262_139 * HASH_BYTES);
        assert_eq!(p.dataset_size(0), 8_388_593 * MIX_BYTES);
    }

    #[test]
    fn tester_sizes_are_tiny() {
        let p = ChainParams::tester();
        assert_eq!(p.cache_size(0), 13 * HASH_BYTES);
        assert_eq!(p.dataset_size(0), 251 * MIX_BYTES);
        assert_eq!(p.cache_size(0), p.cache_size(40));
    }

    #[test]
    fn nearing_epoch_end_triggers_in_last_quarter() {
        let p = ChainParams::tester();
        assert!(!p.nearing_epoch_end(0));
        assert!(!p.nearing_epoch_end(22_499));
        assert!(p.nearing_epoch_end(22_500));
        assert!(p.nearing_epoch_end(29_999));
        assert!(!p.nearing_epoch_end(30_000));
    }

    #[test]
    fn validate_rejects_zero_epoch_length() {
        let p = ChainParams {
            epoch_length: 0,
            ..ChainParams::tester()
        };
        assert!(matches!(p.validate(), Err(Error::InvalidConfig(_))));
        assert!(ChainParams::mainnet().validate().is_ok());
    }
}
