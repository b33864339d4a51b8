//! Derivation of single cache and dataset items.
use crate::core::{fnv, fnv_words, hash512, set_word, word, Item, HASH_BYTES, ITEM_WORDS};
use crate::params::DATASET_PARENTS;

/// Number of items in a cache (or dataset) byte table.
#[inline]
pub fn item_count(table: &[u8]) -> usize {
    table.len() / HASH_BYTES
}

/// Cache item at `index`, wrapping around the item count.
pub fn cache_item(cache: &[u8], index: u32) -> Item {
    let n = item_count(cache);
    let off = (index as usize % n) * HASH_BYTES;
    let mut item = [0u8; HASH_BYTES];
    item.copy_from_slice(&cache[off..off + HASH_BYTES]);
    item
}

/// Dataset item `index`, computed from the cache alone.
///
/// The item seeds a mix from one cache item, then folds in
/// `DATASET_PARENTS` further cache items chosen from the mix itself.
pub fn dataset_item(cache: &[u8], index: u32) -> Item {
    let n = item_count(cache) as u32;
    let mut mix = cache_item(cache, index);
    let head = word(&mix, 0) ^ index;
    set_word(&mut mix, 0, head);
    let mut mix = hash512(&mix);

    for round in 0..DATASET_PARENTS {
        let parent = fnv(index ^ round, word(&mix, round as usize % ITEM_WORDS)) % n;
        fnv_words(&mut mix, &cache_item(cache, parent));
    }
    hash512(&mix)
}
