//! Epoch-keyed retention of caches and datasets, in memory and on disk.
//!
//! The generation table is guarded by one mutex that is only held while
//! looking up, inserting or evicting records. Producing a payload happens
//! under the record's own build lock, so concurrent callers for the same
//! epoch wait for a single build and share its result.
pub mod file;

use crate::core::{seed_hash, SeedHash};
use crate::error::Error;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;

use self::file::Prepared;

/// Something the store can generate per epoch.
pub trait Producer: Send + Sync + 'static {
    /// File name prefix for persisted generations.
    const KIND: &'static str;

    /// Map persisted payloads instead of reading them into memory.
    const MAP_FILES: bool = false;

    /// Exact payload size for `epoch`.
    fn payload_size(&self, epoch: u64) -> usize;

    /// Fill `out` (exactly `payload_size(epoch)` bytes) for `epoch`.
    fn produce(&self, epoch: u64, seed: &SeedHash, out: &mut [u8]) -> Result<(), Error>;
}

/// Retention limits and location of one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    pub dir: Option<PathBuf>,
    pub in_mem: usize,
    pub on_disk: usize,
}

impl StoreSettings {
    pub fn in_memory(in_mem: usize) -> Self {
        Self {
            dir: None,
            in_mem,
            on_disk: 0,
        }
    }

    fn disk_dir(&self) -> Option<&PathBuf> {
        self.dir.as_ref().filter(|_| self.on_disk > 0)
    }
}

/// One epoch's cache or dataset.
#[derive(Debug)]
pub struct Generation {
    epoch: u64,
    seed: SeedHash,
    payload: OnceLock<Arc<Payload>>,
    build: Mutex<()>,
}

/// Bytes of one generation, owned or mapped from its file.
enum Payload {
    Owned(Box<[u8]>),
    Mapped(Mmap),
}

impl Deref for Payload {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Payload::Owned(bytes) => &bytes[..],
            Payload::Mapped(map) => &map[..],
        }
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match self {
            Payload::Owned(_) => "owned",
            Payload::Mapped(_) => "mapped",
        };
        f.debug_struct("Payload")
            .field("source", &source)
            .field("len", &self.len())
            .finish()
    }
}

impl Generation {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            seed: seed_hash(epoch),
            payload: OnceLock::new(),
            build: Mutex::new(()),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn seed(&self) -> &SeedHash {
        &self.seed
    }

    pub fn is_built(&self) -> bool {
        self.payload.get().is_some()
    }

    /// Return the payload, running `build` at most once across all callers.
    fn materialize(
        &self,
        build: impl FnOnce() -> Result<Payload, Error>,
    ) -> Result<Arc<Payload>, Error> {
        if let Some(payload) = self.payload.get() {
            return Ok(payload.clone());
        }
        let _guard = lock(&self.build);
        if let Some(payload) = self.payload.get() {
            return Ok(payload.clone());
        }
        let payload = Arc::new(build()?);
        Ok(self.payload.get_or_init(|| payload).clone())
    }
}

/// A resolved generation. The record stays resident while any handle is alive.
#[derive(Debug, Clone)]
pub struct Handle {
    generation: Arc<Generation>,
    payload: Arc<Payload>,
}

impl Handle {
    pub fn epoch(&self) -> u64 {
        self.generation.epoch
    }

    pub fn seed(&self) -> &SeedHash {
        &self.generation.seed
    }

    /// Whether both handles refer to the same generation record.
    pub fn same_generation(&self, other: &Handle) -> bool {
        Arc::ptr_eq(&self.generation, &other.generation)
    }
}

impl Deref for Handle {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.payload[..]
    }
}

#[derive(Debug)]
struct Entry {
    generation: Arc<Generation>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Table {
    entries: HashMap<u64, Entry>,
    /// Lookahead generations, outside the LRU limit until first requested.
    futures: HashMap<u64, Arc<Generation>>,
    tick: u64,
}

impl Table {
    /// Fetch or create the record for `epoch` and mark it most recently used.
    fn touch(&mut self, epoch: u64) -> Arc<Generation> {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(&epoch) {
            entry.last_used = tick;
            return entry.generation.clone();
        }
        let generation = self
            .futures
            .remove(&epoch)
            .unwrap_or_else(|| Arc::new(Generation::new(epoch)));
        self.entries.insert(
            epoch,
            Entry {
                generation: generation.clone(),
                last_used: tick,
            },
        );
        generation
    }

    /// Register a lookahead record for `epoch`. Earlier lookahead records are
    /// dropped once nothing holds them, so in-flight builds stay findable.
    fn add_future(&mut self, epoch: u64) -> Arc<Generation> {
        self.futures
            .retain(|_, generation| Arc::strong_count(generation) > 1);
        let generation = Arc::new(Generation::new(epoch));
        self.futures.insert(epoch, generation.clone());
        generation
    }

    /// Drop least recently used records beyond `limit`, skipping any that a
    /// caller still holds.
    fn evict(&mut self, limit: usize, kind: &str) {
        while self.entries.len() > limit {
            let victim = self
                .entries
                .iter()
                .filter(|(_, entry)| Arc::strong_count(&entry.generation) == 1)
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(epoch, _)| *epoch);
            match victim {
                Some(epoch) => {
                    self.entries.remove(&epoch);
                    tracing::debug!(kind, epoch, "evicted generation from memory");
                }
                None => break,
            }
        }
    }

    fn contains(&self, epoch: u64) -> bool {
        self.entries.contains_key(&epoch) || self.futures.contains_key(&epoch)
    }
}

/// Epoch store for one kind of generation.
pub struct EpochStore<P: Producer> {
    producer: P,
    settings: StoreSettings,
    table: Mutex<Table>,
    pruned: Mutex<PruneMark>,
    builds: AtomicU64,
    loads: AtomicU64,
}

/// Every on-disk epoch below `below` has already been removed.
#[derive(Debug)]
struct PruneMark {
    below: u64,
    seed: SeedHash,
}

impl<P: Producer> EpochStore<P> {
    pub fn new(producer: P, settings: StoreSettings) -> Self {
        Self {
            producer,
            settings,
            table: Mutex::new(Table::default()),
            pruned: Mutex::new(PruneMark {
                below: 0,
                seed: seed_hash(0),
            }),
            builds: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    pub fn producer(&self) -> &P {
        &self.producer
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    /// Resolve the generation for `epoch`, building or loading it if needed.
    pub fn get(&self, epoch: u64) -> Result<Handle, Error> {
        let generation = {
            let mut table = lock(&self.table);
            let generation = table.touch(epoch);
            table.evict(self.settings.in_mem, P::KIND);
            generation
        };
        let payload = generation.materialize(|| self.load_or_produce(&generation))?;
        Ok(Handle {
            generation,
            payload,
        })
    }

    /// Start building `epoch` on a background thread unless it is already
    /// known to the store.
    pub fn prefetch(self: &Arc<Self>, epoch: u64) {
        let generation = {
            let mut table = lock(&self.table);
            if table.contains(epoch) {
                return;
            }
            table.add_future(epoch)
        };
        tracing::debug!(kind = P::KIND, epoch, "pre-generating next epoch");
        let store = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name(format!("zrmash-{}-{epoch}", P::KIND))
            .spawn(move || {
                if let Err(err) = generation.materialize(|| store.load_or_produce(&generation)) {
                    tracing::warn!(kind = P::KIND, epoch, error = %err, "lookahead generation failed");
                }
            });
        if let Err(err) = spawned {
            tracing::warn!(kind = P::KIND, epoch, error = %err, "could not spawn lookahead thread");
        }
    }

    /// Whether `epoch` currently has a record in memory.
    pub fn is_resident(&self, epoch: u64) -> bool {
        lock(&self.table).contains(epoch)
    }

    /// Epochs currently held in the LRU table, ascending.
    pub fn resident_epochs(&self) -> Vec<u64> {
        let mut epochs: Vec<u64> = lock(&self.table).entries.keys().copied().collect();
        epochs.sort_unstable();
        epochs
    }

    /// Number of payloads produced from scratch.
    pub fn builds(&self) -> u64 {
        self.builds.load(Ordering::SeqCst)
    }

    /// Number of payloads loaded from disk.
    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }

    fn load_or_produce(&self, generation: &Generation) -> Result<Payload, Error> {
        let epoch = generation.epoch;
        let size = self.producer.payload_size(epoch);
        let Some(dir) = self.settings.disk_dir() else {
            return self.produce(generation, size).map(|bytes| Payload::Owned(bytes.into()));
        };

        let path = file::file_path(dir, P::KIND, &generation.seed);
        match file::prepare(dir, P::KIND, &generation.seed, size, false)? {
            Prepared::Match(handle) => {
                let payload = if P::MAP_FILES {
                    Payload::Mapped(file::map_payload(&path, &handle, size)?)
                } else {
                    Payload::Owned(file::read_payload(&path, handle, size)?.into())
                };
                self.loads.fetch_add(1, Ordering::SeqCst);
                tracing::debug!(kind = P::KIND, epoch, path = %path.display(), "loaded generation from disk");
                Ok(payload)
            }
            Prepared::Created { file: handle, probe } => {
                tracing::debug!(kind = P::KIND, epoch, ?probe, "no reusable file, generating");
                let payload = self.produce(generation, size)?;
                file::write_payload(&path, handle, &payload)?;
                self.prune_disk(epoch);
                Ok(Payload::Owned(payload.into()))
            }
        }
    }

    fn produce(&self, generation: &Generation, size: usize) -> Result<Vec<u8>, Error> {
        let mut payload = vec![0u8; size];
        self.producer
            .produce(generation.epoch, &generation.seed, &mut payload)?;
        self.builds.fetch_add(1, Ordering::SeqCst);
        Ok(payload)
    }

    /// Delete files of epochs that fell out of the on-disk window ending at `epoch`.
    ///
    /// Only epochs between the previous window start and the new one are
    /// visited, so steady progress costs one removal per build.
    fn prune_disk(&self, epoch: u64) {
        let Some(dir) = self.settings.disk_dir() else {
            return;
        };
        let oldest_kept = (epoch + 1).saturating_sub(self.settings.on_disk as u64);
        let mut mark = lock(&self.pruned);
        while mark.below < oldest_kept {
            let old = mark.below;
            match file::remove(dir, P::KIND, &mark.seed) {
                Ok(true) => tracing::debug!(kind = P::KIND, epoch = old, "removed stale generation file"),
                Ok(false) => {}
                Err(err) => tracing::warn!(kind = P::KIND, epoch = old, error = %err, "could not remove stale generation file"),
            }
            mark.seed = crate::core::hash256(&mark.seed);
            mark.below += 1;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
