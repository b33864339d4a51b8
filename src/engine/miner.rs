use crate::error::Error;
use crate::hashimoto::{hashimoto_full, meets_target};
use crate::stream::{NonceSource, StopFlag};
use crate::types::{MineOutcome, Solution};
use flume::Sender;
use std::thread;

/// Nonces a worker claims at once; stop signals are checked between batches.
pub(crate) const NONCE_BATCH: u64 = 64;

/// Search nonces from `start` over the full dataset until one meets `target`
/// or `abort` fires.
pub(crate) fn search(
    dataset: &[u8],
    seal_hash: [u8; 32],
    target: [u8; 32],
    threads: usize,
    start: u64,
    abort: &StopFlag,
) -> Result<MineOutcome, Error> {
    let nonces = NonceSource::new(start);
    let found = StopFlag::new();
    let threads = threads.max(1);
    let (tx, rx) = flume::bounded::<Solution>(threads);

    thread::scope(|scope| {
        let mut joins = Vec::with_capacity(threads);
        for _ in 0..threads {
            let worker_tx = tx.clone();
            let nonces = &nonces;
            let found = &found;
            let seal_hash = &seal_hash;
            let target = &target;
            joins.push(scope.spawn(move || {
                worker_loop(dataset, seal_hash, target, nonces, found, abort, worker_tx)
            }));
        }
        drop(tx);

        let outcome = match rx.recv() {
            Ok(solution) => MineOutcome::Sealed(solution),
            Err(_) => MineOutcome::Aborted,
        };
        found.force_stop();

        let mut attempts = 0u64;
        for join in joins {
            attempts += join.join().map_err(|_| Error::WorkerPanicked)?;
        }
        tracing::debug!(attempts, threads, sealed = outcome.solution().is_some(), "nonce search finished");
        Ok(outcome)
    })
}

fn worker_loop(
    dataset: &[u8],
    seal_hash: &[u8; 32],
    target: &[u8; 32],
    nonces: &NonceSource,
    found: &StopFlag,
    abort: &StopFlag,
    tx: Sender<Solution>,
) -> u64 {
    let mut attempts = 0u64;
    while !abort.should_stop() && !found.should_stop() {
        let first = nonces.reserve(NONCE_BATCH);
        for offset in 0..NONCE_BATCH {
            let nonce = first.wrapping_add(offset);
            let digest = hashimoto_full(seal_hash, nonce, dataset);
            attempts += 1;
            if meets_target(&digest.result, target) {
                found.force_stop();
                let _ = tx.send(Solution {
                    nonce,
                    mix_digest: digest.mix_digest,
                    result: digest.result,
                });
                return attempts;
            }
        }
    }
    attempts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::build_cache;
    use crate::core::seed_hash;
    use crate::dataset::fill_dataset;
    use crate::hashimoto::{hashimoto_light, target_for_difficulty};
    use crate::params::ChainParams;
    use std::sync::atomic::AtomicU64;
    use std::sync::Arc;
    use std::time::Duration;

    fn tiny_dataset() -> (Vec<u8>, Vec<u8>) {
        let params = ChainParams::tester();
        let cache = build_cache(&seed_hash(0), params.cache_size(0));
        let mut dataset = vec![0u8; params.dataset_size(0)];
        fill_dataset(&cache, &mut dataset, 2, &AtomicU64::new(0)).unwrap();
        (cache, dataset)
    }

    #[test]
    fn search_finds_a_valid_nonce() {
        let (cache, dataset) = tiny_dataset();
        let seal = [4u8; 32];
        let target = target_for_difficulty(8);
        let outcome = search(&dataset, seal, target, 3, 1000, &StopFlag::new()).unwrap();
        let solution = *outcome.solution().expect("easy target should be met");
        assert!(solution.nonce >= 1000);
        let light = hashimoto_light(&seal, solution.nonce, dataset.len(), &cache);
        assert_eq!(light.mix_digest, solution.mix_digest);
        assert!(meets_target(&light.result, &target));
    }

    #[test]
    fn preset_abort_returns_immediately() {
        let (_, dataset) = tiny_dataset();
        let abort = StopFlag::new();
        abort.force_stop();
        let outcome = search(&dataset, [0u8; 32], [0u8; 32], 2, 0, &abort).unwrap();
        assert_eq!(outcome, MineOutcome::Aborted);
    }

    #[test]
    fn abort_interrupts_unreachable_target() {
        let (_, dataset) = tiny_dataset();
        let abort = Arc::new(StopFlag::new());
        let trigger = abort.clone();
        let stopper = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            trigger.force_stop();
        });
        let outcome = search(&dataset, [0u8; 32], [0u8; 32], 2, 0, &abort).unwrap();
        stopper.join().unwrap();
        assert_eq!(outcome, MineOutcome::Aborted);
    }
}
