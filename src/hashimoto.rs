//! The proof-of-work digest over a cache (light) or a full dataset.
use crate::core::{fnv, fnv_words, hash256, hash512, word, Item, HASH_BYTES, WORD_BYTES};
use crate::item::dataset_item;
use crate::params::{LOOKUP_ACCESSES, MIX_BYTES};

const MIX_WORDS: usize = MIX_BYTES / WORD_BYTES;
const MIX_HASHES: usize = MIX_BYTES / HASH_BYTES;

/// Compressed mix and final hash for one nonce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Digest {
    pub mix_digest: [u8; 32],
    pub result: [u8; 32],
}

/// Digest computed by deriving dataset items on demand from the cache.
pub fn hashimoto_light(seal_hash: &[u8; 32], nonce: u64, dataset_size: usize, cache: &[u8]) -> Digest {
    hashimoto(seal_hash, nonce, dataset_size, |index| dataset_item(cache, index))
}

/// Digest computed by reading a fully generated dataset.
pub fn hashimoto_full(seal_hash: &[u8; 32], nonce: u64, dataset: &[u8]) -> Digest {
    hashimoto(seal_hash, nonce, dataset.len(), |index| {
        let off = index as usize * HASH_BYTES;
        let mut item = [0u8; HASH_BYTES];
        item.copy_from_slice(&dataset[off..off + HASH_BYTES]);
        item
    })
}

fn hashimoto(
    seal_hash: &[u8; 32],
    nonce: u64,
    dataset_size: usize,
    lookup: impl Fn(u32) -> Item,
) -> Digest {
    let rows = (dataset_size / MIX_BYTES) as u32;

    let mut seed_input = [0u8; 40];
    seed_input[..32].copy_from_slice(seal_hash);
    seed_input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed = hash512(&seed_input);
    let seed_head = word(&seed, 0);

    let mut mix = [0u8; MIX_BYTES];
    for chunk in mix.chunks_exact_mut(HASH_BYTES) {
        chunk.copy_from_slice(&seed);
    }

    let mut row = [0u8; MIX_BYTES];
    for i in 0..LOOKUP_ACCESSES {
        let parent = fnv(i as u32 ^ seed_head, word(&mix, i % MIX_WORDS)) % rows;
        for j in 0..MIX_HASHES {
            let item = lookup(parent * MIX_HASHES as u32 + j as u32);
            row[j * HASH_BYTES..(j + 1) * HASH_BYTES].copy_from_slice(&item);
        }
        fnv_words(&mut mix, &row);
    }

    let mut mix_digest = [0u8; 32];
    for (out, quad) in mix_digest.chunks_exact_mut(WORD_BYTES).zip((0..MIX_WORDS).step_by(4)) {
        let folded = fnv(
            fnv(fnv(word(&mix, quad), word(&mix, quad + 1)), word(&mix, quad + 2)),
            word(&mix, quad + 3),
        );
        out.copy_from_slice(&folded.to_le_bytes());
    }

    let mut final_input = [0u8; HASH_BYTES + 32];
    final_input[..HASH_BYTES].copy_from_slice(&seed);
    final_input[HASH_BYTES..].copy_from_slice(&mix_digest);
    Digest {
        mix_digest,
        result: hash256(&final_input),
    }
}

/// Largest digest accepted at `difficulty`: `(2^256 - 1) / difficulty`, big-endian.
pub fn target_for_difficulty(difficulty: u64) -> [u8; 32] {
    let mut target = [0u8; 32];
    if difficulty == 0 {
        return target;
    }
    let divisor = difficulty as u128;
    let mut remainder = 0u128;
    for limb in target.chunks_exact_mut(8) {
        let current = (remainder << 64) | u64::MAX as u128;
        limb.copy_from_slice(&((current / divisor) as u64).to_be_bytes());
        remainder = current % divisor;
    }
    target
}

/// Whether a big-endian digest is within `target`.
#[inline]
pub fn meets_target(result: &[u8; 32], target: &[u8; 32]) -> bool {
    result <= target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::build_cache;
    use crate::core::seed_hash;
    use crate::dataset::fill_dataset;
    use crate::params::ChainParams;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn light_and_full_agree() {
        let params = ChainParams::tester();
        let cache = build_cache(&seed_hash(0), params.cache_size(0));
        let mut dataset = vec![0u8; params.dataset_size(0)];
        fill_dataset(&cache, &mut dataset, 2, &AtomicU64::new(0)).unwrap();

        let seal = [0x5au8; 32];
        for nonce in [0u64, 1, 0xdead_beef, u64::MAX] {
            let light = hashimoto_light(&seal, nonce, dataset.len(), &cache);
            let full = hashimoto_full(&seal, nonce, &dataset);
            assert_eq!(light, full, "nonce {nonce}");
        }
    }

    #[test]
    fn nonce_changes_digest() {
        let params = ChainParams::tester();
        let cache = build_cache(&seed_hash(0), params.cache_size(0));
        let size = params.dataset_size(0);
        let a = hashimoto_light(&[1u8; 32], 7, size, &cache);
        let b = hashimoto_light(&[1u8; 32], 8, size, &cache);
        assert_ne!(a.result, b.result);
        assert_ne!(a.mix_digest, b.mix_digest);
    }

    #[test]
    fn target_scales_inversely() {
        assert_eq!(target_for_difficulty(1), [0xff; 32]);
        let mut half = [0xff; 32];
        half[0] = 0x7f;
        assert_eq!(target_for_difficulty(2), half);
        let t16 = target_for_difficulty(16);
        assert_eq!(t16[0], 0x0f);
        assert!(t16[1..].iter().all(|b| *b == 0xff));
        assert_eq!(target_for_difficulty(0), [0u8; 32]);
    }

    #[test]
    fn target_comparison_is_big_endian() {
        let target = target_for_difficulty(16);
        let mut ok = [0u8; 32];
        ok[0] = 0x0f;
        ok[31] = 0xff;
        assert!(meets_target(&ok, &target));
        let mut too_big = [0u8; 32];
        too_big[0] = 0x10;
        assert!(!meets_target(&too_big, &target));
    }
}
