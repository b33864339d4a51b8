//! The consensus-facing engine: seal verification and mining.
mod miner;

use crate::cache::CacheProducer;
use crate::config::{Config, PowMode};
use crate::dataset::DatasetProducer;
use crate::error::{Error, VerifyError};
use crate::hashimoto::{hashimoto_light, meets_target, target_for_difficulty};
use crate::header::Header;
use crate::params::ChainParams;
use crate::store::{EpochStore, Handle};
use crate::stream::StopFlag;
use crate::types::{MineOutcome, Solution, Verdict};
use std::sync::{Arc, OnceLock};

/// The two operations the surrounding node needs from a proof-of-work engine.
pub trait PowEngine {
    /// Check the seal of `header` using the light cache only.
    fn verify_seal(&self, header: &Header) -> Result<Verdict, Error>;

    /// Search for a seal for `header` until one is found or `abort` fires.
    fn mine(&self, header: &Header, abort: Arc<StopFlag>) -> Result<MineOutcome, Error>;
}

/// Proof-of-work engine backed by epoch-keyed caches and datasets.
///
/// Cloning is cheap; clones share the same stores.
#[derive(Clone)]
pub struct Zrmash {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    caches: Arc<EpochStore<CacheProducer>>,
    datasets: Arc<EpochStore<DatasetProducer>>,
}

static SHARED: OnceLock<Zrmash> = OnceLock::new();

impl Zrmash {
    /// Create an engine for `config`, validating it first.
    pub fn new(config: Config) -> Result<Self, Error> {
        let config = config.normalized();
        config.validate()?;
        match config.mode {
            PowMode::Normal => {}
            PowMode::Test => tracing::warn!("zrmash used in test mode"),
            PowMode::Fake => tracing::warn!("zrmash used in fake mode"),
            PowMode::Shared => {
                tracing::warn!("zrmash used in shared mode");
                return Ok(Self::shared());
            }
        }
        Ok(Self::assemble(config))
    }

    /// Engine with tiny sizes, kept in memory.
    pub fn tester() -> Self {
        Self::assemble(Config::tester())
    }

    /// Engine that accepts every seal and mines without work.
    pub fn faker() -> Self {
        Self::assemble(Config {
            mode: PowMode::Fake,
            ..Config::tester()
        })
    }

    /// The process-wide shared engine.
    pub fn shared() -> Self {
        SHARED
            .get_or_init(|| {
                Self::assemble(Config {
                    cache_dir: None,
                    caches_in_mem: 3,
                    caches_on_disk: 0,
                    dataset_dir: None,
                    datasets_in_mem: 1,
                    datasets_on_disk: 0,
                    mode: PowMode::Shared,
                    ..Config::default()
                })
            })
            .clone()
    }

    fn assemble(config: Config) -> Self {
        let caches = Arc::new(EpochStore::new(
            CacheProducer::new(config.chain),
            config.cache_settings(),
        ));
        let datasets = Arc::new(EpochStore::new(
            DatasetProducer::new(config.chain, caches.clone(), config.resolved_dataset_threads()),
            config.dataset_settings(),
        ));
        tracing::debug!(
            mode = ?config.mode,
            cache_dir = ?config.cache_dir,
            dataset_dir = ?config.dataset_dir,
            "zrmash engine ready"
        );
        Self {
            inner: Arc::new(Inner {
                config,
                caches,
                datasets,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn chain(&self) -> &ChainParams {
        &self.inner.config.chain
    }

    pub fn caches(&self) -> &EpochStore<CacheProducer> {
        &self.inner.caches
    }

    pub fn datasets(&self) -> &EpochStore<DatasetProducer> {
        &self.inner.datasets
    }

    /// Whether both handles share one engine.
    pub fn same_engine(&self, other: &Zrmash) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Light cache for the epoch of `block_number`.
    pub fn cache(&self, block_number: u64) -> Result<Handle, Error> {
        let epoch = self.chain().epoch(block_number);
        let handle = self.inner.caches.get(epoch)?;
        if self.inner.config.lookahead && self.chain().nearing_epoch_end(block_number) {
            self.inner.caches.prefetch(epoch + 1);
        }
        Ok(handle)
    }

    /// Full dataset for the epoch of `block_number`.
    pub fn dataset(&self, block_number: u64) -> Result<Handle, Error> {
        let epoch = self.chain().epoch(block_number);
        let handle = self.inner.datasets.get(epoch)?;
        if self.inner.config.lookahead && self.chain().nearing_epoch_end(block_number) {
            self.inner.datasets.prefetch(epoch + 1);
        }
        Ok(handle)
    }

    fn is_fake(&self) -> bool {
        self.inner.config.mode == PowMode::Fake
    }
}

impl PowEngine for Zrmash {
    fn verify_seal(&self, header: &Header) -> Result<Verdict, Error> {
        if self.is_fake() {
            return Ok(Verdict::Valid);
        }
        if header.difficulty == 0 {
            return Ok(Verdict::Invalid(VerifyError::InvalidDifficulty));
        }
        let epoch = self.chain().epoch(header.number);
        let cache = self.cache(header.number)?;
        let digest = hashimoto_light(
            &header.seal_hash(),
            header.nonce,
            self.chain().dataset_size(epoch),
            &cache,
        );
        if digest.mix_digest != header.mix_digest {
            return Ok(Verdict::Invalid(VerifyError::InvalidMixDigest));
        }
        if !meets_target(&digest.result, &target_for_difficulty(header.difficulty)) {
            return Ok(Verdict::Invalid(VerifyError::InsufficientWork));
        }
        Ok(Verdict::Valid)
    }

    fn mine(&self, header: &Header, abort: Arc<StopFlag>) -> Result<MineOutcome, Error> {
        if abort.should_stop() {
            return Ok(MineOutcome::Aborted);
        }
        if self.is_fake() {
            return Ok(MineOutcome::Sealed(Solution {
                nonce: header.nonce,
                mix_digest: [0u8; 32],
                result: [0u8; 32],
            }));
        }
        if header.difficulty == 0 {
            return Err(Error::InvalidConfig(
                "cannot mine a header with zero difficulty".into(),
            ));
        }
        let dataset = self.dataset(header.number)?;
        let threads = self.inner.config.resolved_mining_threads();
        let start = rand::random::<u64>();
        tracing::debug!(
            number = header.number,
            epoch = dataset.epoch(),
            threads,
            "started nonce search"
        );
        let outcome = miner::search(
            &dataset,
            header.seal_hash(),
            target_for_difficulty(header.difficulty),
            threads,
            start,
            &abort,
        )?;
        if let MineOutcome::Sealed(solution) = &outcome {
            tracing::info!(
                number = header.number,
                nonce = solution.nonce,
                result = %solution.result_hex(),
                "sealed header"
            );
        }
        Ok(outcome)
    }
}

impl std::fmt::Debug for Zrmash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Zrmash")
            .field("mode", &self.inner.config.mode)
            .field("resident_caches", &self.inner.caches.resident_epochs())
            .field("resident_datasets", &self.inner.datasets.resident_epochs())
            .finish()
    }
}
