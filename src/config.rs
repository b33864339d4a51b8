//! Engine configuration supplied by the host node.
use crate::error::Error;
use crate::params::ChainParams;
use crate::store::StoreSettings;
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Largest initial dataset a test-mode chain may keep as configured.
const TEST_DATASET_LIMIT: u64 = 1 << 24;

/// How the engine treats proof-of-work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowMode {
    #[default]
    Normal,
    /// Tiny cache and dataset sizes for fast tests.
    Test,
    /// Accept every seal and mine without doing any work.
    Fake,
    /// One in-memory engine shared by every handle in the process.
    Shared,
}

#[derive(Builder, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[builder(pattern = "owned", default)]
#[serde(default)]
pub struct Config {
    /// Directory for light cache files; `None` keeps caches in memory only.
    #[builder(setter(into, strip_option))]
    pub cache_dir: Option<PathBuf>,
    pub caches_in_mem: usize,
    pub caches_on_disk: usize,
    /// Directory for dataset files; `None` keeps datasets in memory only.
    #[builder(setter(into, strip_option))]
    pub dataset_dir: Option<PathBuf>,
    pub datasets_in_mem: usize,
    pub datasets_on_disk: usize,
    /// Dataset generation threads, 0 for all hardware threads.
    pub dataset_threads: usize,
    /// Mining threads, 0 for all hardware threads.
    pub mining_threads: usize,
    /// Pre-generate the next epoch near the end of the current one.
    pub lookahead: bool,
    pub mode: PowMode,
    pub chain: ChainParams,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_dir: Some(PathBuf::from("zrmash")),
            caches_in_mem: 2,
            caches_on_disk: 3,
            dataset_dir: default_dataset_dir(),
            datasets_in_mem: 1,
            datasets_on_disk: 2,
            dataset_threads: 0,
            mining_threads: 0,
            lookahead: true,
            mode: PowMode::Normal,
            chain: ChainParams::mainnet(),
        }
    }
}

fn default_dataset_dir() -> Option<PathBuf> {
    let home = dirs::home_dir()?;
    if cfg!(windows) {
        Some(home.join("AppData").join("Zrmash"))
    } else {
        Some(home.join(".zrmash"))
    }
}

impl Config {
    /// In-memory configuration with tiny sizes.
    pub fn tester() -> Self {
        Self {
            cache_dir: None,
            caches_in_mem: 1,
            caches_on_disk: 0,
            dataset_dir: None,
            datasets_in_mem: 1,
            datasets_on_disk: 0,
            dataset_threads: 1,
            mining_threads: 1,
            lookahead: false,
            mode: PowMode::Test,
            chain: ChainParams::tester(),
        }
    }

    /// Parse a JSON configuration and validate it.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config = serde_json::from_str::<Config>(json)?.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Apply mode-implied settings. Test mode swaps a full-size chain for
    /// [`ChainParams::tester`], so the mode flag alone is enough.
    pub fn normalized(mut self) -> Self {
        if self.mode == PowMode::Test && self.chain.dataset_init_bytes > TEST_DATASET_LIMIT {
            tracing::debug!("test mode selected, using reduced chain sizes");
            self.chain = ChainParams::tester();
        }
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.caches_in_mem == 0 {
            return Err(Error::InvalidConfig("caches_in_mem must be >= 1".into()));
        }
        if self.datasets_in_mem == 0 {
            return Err(Error::InvalidConfig("datasets_in_mem must be >= 1".into()));
        }
        if matches!(&self.cache_dir, Some(dir) if dir.as_os_str().is_empty()) {
            return Err(Error::InvalidConfig("cache_dir must not be empty".into()));
        }
        if matches!(&self.dataset_dir, Some(dir) if dir.as_os_str().is_empty()) {
            return Err(Error::InvalidConfig("dataset_dir must not be empty".into()));
        }
        self.chain.validate()
    }

    pub(crate) fn cache_settings(&self) -> StoreSettings {
        StoreSettings {
            dir: self.cache_dir.clone(),
            in_mem: self.caches_in_mem,
            on_disk: self.caches_on_disk,
        }
    }

    pub(crate) fn dataset_settings(&self) -> StoreSettings {
        StoreSettings {
            dir: self.dataset_dir.clone(),
            in_mem: self.datasets_in_mem,
            on_disk: self.datasets_on_disk,
        }
    }

    pub(crate) fn resolved_dataset_threads(&self) -> usize {
        resolve_threads(self.dataset_threads)
    }

    pub(crate) fn resolved_mining_threads(&self) -> usize {
        resolve_threads(self.mining_threads)
    }
}

fn resolve_threads(requested: usize) -> usize {
    if requested == 0 {
        num_cpus::get().max(1)
    } else {
        requested
    }
}

impl ConfigBuilder {
    pub fn build_validated(self) -> Result<Config, Error> {
        let config = self
            .build()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?
            .normalized();
        config.validate()?;
        Ok(config)
    }
}
