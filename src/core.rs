//! Hash primitives shared by the cache, dataset and digest code.
use sha2::{Digest, Sha256, Sha512};

/// Width of a cache or dataset item in bytes.
pub const HASH_BYTES: usize = 64;
/// Width of a word inside an item.
pub const WORD_BYTES: usize = 4;
/// Number of 32-bit words in one item.
pub const ITEM_WORDS: usize = HASH_BYTES / WORD_BYTES;

const FNV_PRIME: u32 = 0x0100_0193;

pub type SeedHash = [u8; 32];
pub type Item = [u8; HASH_BYTES];

/// 512-bit hash used for cache and dataset items.
pub fn hash512(data: &[u8]) -> Item {
    Sha512::digest(data).into()
}

/// 256-bit hash used for the seed chain and the final digest.
pub fn hash256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Seed hash of `epoch`: the zero seed hashed `epoch` times.
pub fn seed_hash(epoch: u64) -> SeedHash {
    let mut seed = [0u8; 32];
    for _ in 0..epoch {
        seed = hash256(&seed);
    }
    seed
}

#[inline]
pub fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

#[inline]
pub(crate) fn word(bytes: &[u8], index: usize) -> u32 {
    let off = index * WORD_BYTES;
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

#[inline]
pub(crate) fn set_word(bytes: &mut [u8], index: usize, value: u32) {
    let off = index * WORD_BYTES;
    bytes[off..off + WORD_BYTES].copy_from_slice(&value.to_le_bytes());
}

/// Word-wise `fnv(dst[i], src[i])` over two equally sized buffers.
pub(crate) fn fnv_words(dst: &mut [u8], src: &[u8]) {
    for i in 0..dst.len() / WORD_BYTES {
        set_word(dst, i, fnv(word(dst, i), word(src, i)));
    }
}
