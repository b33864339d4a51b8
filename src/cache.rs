//! Light cache generation.
use crate::core::{hash512, word, SeedHash, HASH_BYTES};
use crate::error::Error;
use crate::params::{ChainParams, CACHE_ROUNDS};
use crate::store::Producer;
use std::time::Instant;

/// Build a cache of `size` bytes for `seed`.
pub fn build_cache(seed: &SeedHash, size: usize) -> Vec<u8> {
    let mut cache = vec![0u8; size];
    fill_cache(seed, &mut cache);
    cache
}

/// Fill `cache` in place: a sequential hash chain followed by
/// `CACHE_ROUNDS` pollination passes.
///
/// `cache.len()` must be a non-zero multiple of `HASH_BYTES`.
pub fn fill_cache(seed: &SeedHash, cache: &mut [u8]) {
    let n = cache.len() / HASH_BYTES;
    if n == 0 {
        return;
    }

    cache[..HASH_BYTES].copy_from_slice(&hash512(seed));
    for i in 1..n {
        let prev = hash512(&cache[(i - 1) * HASH_BYTES..i * HASH_BYTES]);
        cache[i * HASH_BYTES..(i + 1) * HASH_BYTES].copy_from_slice(&prev);
    }

    let mut input = [0u8; 3 * HASH_BYTES];
    for _ in 0..CACHE_ROUNDS {
        for i in 0..n {
            let cur = i * HASH_BYTES;
            let a = word(&cache[cur..], 0) as usize % n;
            let b = word(&cache[cur..], 1) as usize % n;
            input[..HASH_BYTES].copy_from_slice(&cache[cur..cur + HASH_BYTES]);
            input[HASH_BYTES..2 * HASH_BYTES]
                .copy_from_slice(&cache[a * HASH_BYTES..(a + 1) * HASH_BYTES]);
            input[2 * HASH_BYTES..].copy_from_slice(&cache[b * HASH_BYTES..(b + 1) * HASH_BYTES]);
            cache[cur..cur + HASH_BYTES].copy_from_slice(&hash512(&input));
        }
    }
}

/// Produces light caches for the epoch store.
#[derive(Debug, Clone, Copy)]
pub struct CacheProducer {
    params: ChainParams,
}

impl CacheProducer {
    pub fn new(params: ChainParams) -> Self {
        Self { params }
    }
}

impl Producer for CacheProducer {
    const KIND: &'static str = "cache";

    fn payload_size(&self, epoch: u64) -> usize {
        self.params.cache_size(epoch)
    }

    fn produce(&self, epoch: u64, seed: &SeedHash, out: &mut [u8]) -> Result<(), Error> {
        let start = Instant::now();
        fill_cache(seed, out);
        tracing::debug!(
            epoch,
            bytes = out.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generated light cache"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::seed_hash;

    #[test]
    fn cache_is_deterministic() {
        let seed = seed_hash(2);
        assert_eq!(build_cache(&seed, 13 * HASH_BYTES), build_cache(&seed, 13 * HASH_BYTES));
    }

    #[test]
    fn pollination_rewrites_the_chain() {
        let seed = seed_hash(0);
        let cache = build_cache(&seed, 13 * HASH_BYTES);
        // Without pollination the first item would equal hash512(seed).
        assert_ne!(&cache[..HASH_BYTES], &hash512(&seed)[..]);
    }

    #[test]
    fn different_seeds_give_different_caches() {
        let a = build_cache(&seed_hash(0), 13 * HASH_BYTES);
        let b = build_cache(&seed_hash(1), 13 * HASH_BYTES);
        assert_ne!(a, b);
    }

    #[test]
    fn producer_reports_chain_sizes() {
        let producer = CacheProducer::new(ChainParams::tester());
        assert_eq!(producer.payload_size(0), 13 * HASH_BYTES);
        let mut out = vec![0u8; producer.payload_size(0)];
        producer.produce(0, &seed_hash(0), &mut out).unwrap();
        assert_eq!(out, build_cache(&seed_hash(0), 13 * HASH_BYTES));
    }
}
