//! Epoch-indexed proof-of-work engine.
//!
//! Every epoch of `epoch_length` blocks has a seed hash, a light cache
//! derived from it and a much larger dataset derived from the cache.
//! Verifiers only need the cache; miners read the full dataset.
//! Both are kept in an LRU table per kind and optionally persisted to disk
//! as `[magic number][payload]` files, so restarts reuse earlier work.
//!
//! ```no_run
//! use std::sync::Arc;
//! use zrmash::{Header, PowEngine, StopFlag, Zrmash};
//!
//! let engine = Zrmash::tester();
//! let header = Header { number: 1, difficulty: 16, ..Header::default() };
//! let outcome = engine.mine(&header, Arc::new(StopFlag::new())).unwrap();
//! if let Some(solution) = outcome.solution() {
//!     let sealed = header.with_seal(solution.nonce, solution.mix_digest);
//!     assert!(engine.verify_seal(&sealed).unwrap().is_valid());
//! }
//! ```

pub mod cache;
pub mod config;
pub mod core;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod hashimoto;
pub mod header;
pub mod item;
pub mod params;
pub mod store;
pub mod stream;
pub mod types;

pub use crate::cache::{build_cache, CacheProducer};
pub use crate::config::{Config, ConfigBuilder, PowMode};
pub use crate::core::{seed_hash, SeedHash};
pub use crate::dataset::{fill_dataset, DatasetProducer};
pub use crate::engine::{PowEngine, Zrmash};
pub use crate::error::{Error, VerifyError};
pub use crate::hashimoto::{hashimoto_full, hashimoto_light, target_for_difficulty, Digest};
pub use crate::header::Header;
pub use crate::item::{cache_item, dataset_item};
pub use crate::params::ChainParams;
pub use crate::store::{EpochStore, Handle, Producer, StoreSettings};
pub use crate::stream::{NonceSource, StopFlag};
pub use crate::types::{MineOutcome, Solution, Verdict};
