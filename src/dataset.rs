//! Full dataset generation, split across worker threads.
use crate::cache::CacheProducer;
use crate::core::{SeedHash, HASH_BYTES};
use crate::error::Error;
use crate::item::dataset_item;
use crate::params::ChainParams;
use crate::store::{EpochStore, Producer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Instant;

/// Items generated between progress updates.
const PROGRESS_STRIDE: usize = 1024;

/// Fill `out` with dataset items derived from `cache`.
///
/// The item range is split into one contiguous chunk per thread. `progress`
/// counts items written so far.
pub fn fill_dataset(
    cache: &[u8],
    out: &mut [u8],
    threads: usize,
    progress: &AtomicU64,
) -> Result<(), Error> {
    let total = out.len() / HASH_BYTES;
    if total == 0 {
        return Ok(());
    }
    let threads = threads.clamp(1, total);
    let per_thread = total.div_ceil(threads);
    let milestone = (total / 10).max(1) as u64;

    thread::scope(|scope| {
        let mut joins = Vec::with_capacity(threads);
        for (chunk_idx, chunk) in out.chunks_mut(per_thread * HASH_BYTES).enumerate() {
            let first = chunk_idx * per_thread;
            joins.push(scope.spawn(move || {
                for (offset, slot) in chunk.chunks_exact_mut(HASH_BYTES).enumerate() {
                    let index = (first + offset) as u32;
                    slot.copy_from_slice(&dataset_item(cache, index));
                    if (offset + 1) % PROGRESS_STRIDE == 0 {
                        report(progress, PROGRESS_STRIDE as u64, milestone, total);
                    }
                }
                let tail = (chunk.len() / HASH_BYTES) % PROGRESS_STRIDE;
                report(progress, tail as u64, milestone, total);
            }));
        }
        for join in joins {
            join.join().map_err(|_| Error::WorkerPanicked)?;
        }
        Ok(())
    })
}

fn report(progress: &AtomicU64, done: u64, milestone: u64, total: usize) {
    if done == 0 {
        return;
    }
    let before = progress.fetch_add(done, Ordering::Relaxed);
    let after = before + done;
    if before / milestone != after / milestone {
        tracing::info!(
            percentage = after * 100 / total as u64,
            "generating dataset"
        );
    }
}

/// Produces full datasets, pulling the matching light cache from `caches`.
pub struct DatasetProducer {
    params: ChainParams,
    caches: Arc<EpochStore<CacheProducer>>,
    threads: usize,
    /// Items written so far, per epoch currently being generated.
    progress: Mutex<HashMap<u64, Arc<AtomicU64>>>,
}

impl DatasetProducer {
    pub fn new(params: ChainParams, caches: Arc<EpochStore<CacheProducer>>, threads: usize) -> Self {
        Self {
            params,
            caches,
            threads: threads.max(1),
            progress: Mutex::new(HashMap::new()),
        }
    }

    /// Items written so far for `epoch`, or `None` when it is not being generated.
    pub fn progress(&self, epoch: u64) -> Option<u64> {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&epoch)
            .map(|counter| counter.load(Ordering::Relaxed))
    }

    fn track(&self, epoch: u64) -> Arc<AtomicU64> {
        let counter = Arc::new(AtomicU64::new(0));
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(epoch, counter.clone());
        counter
    }

    fn untrack(&self, epoch: u64) {
        self.progress
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&epoch);
    }
}

impl Producer for DatasetProducer {
    const KIND: &'static str = "full";
    const MAP_FILES: bool = true;

    fn payload_size(&self, epoch: u64) -> usize {
        self.params.dataset_size(epoch)
    }

    fn produce(&self, epoch: u64, _seed: &SeedHash, out: &mut [u8]) -> Result<(), Error> {
        let cache = self.caches.get(epoch)?;
        let start = Instant::now();
        let progress = self.track(epoch);
        let filled = fill_dataset(&cache, out, self.threads, &progress);
        self.untrack(epoch);
        filled?;
        tracing::info!(
            epoch,
            bytes = out.len(),
            threads = self.threads,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generated dataset"
        );
        Ok(())
    }
}
