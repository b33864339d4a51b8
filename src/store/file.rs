//! On-disk generation files: `[magic number][payload]`.
//!
//! The magic number is written in host byte order; files are never shared
//! between hosts, so it only guards against stale or foreign content.
use crate::core::SeedHash;
use crate::error::Error;
use memmap2::{Mmap, MmapOptions};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

pub const MAGIC_NUMBER: u64 = 0xFEE1_DEAD_BADD_CAFE;
pub const MAGIC_NUMBER_SIZE: u64 = 8;
/// Algorithm revision baked into file names.
pub const REVISION: u32 = 23;

/// Why an existing file could not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Absent,
    SizeMismatch { found: u64 },
    MagicMismatch,
    Forced,
}

/// Outcome of [`prepare`]. Failures are reported as `Err`.
#[derive(Debug)]
pub enum Prepared {
    /// The file holds a valid payload; the cursor sits right after the magic number.
    Match(File),
    /// The file was (re)created at its final length with a zeroed header.
    /// Hand it to [`write_payload`] to fill it.
    Created { file: File, probe: Probe },
}

/// Canonical file name for a generation of `kind` with `seed`.
pub fn file_name(kind: &str, seed: &SeedHash) -> String {
    let name = format!("{kind}-R{REVISION}-{}", hex::encode(&seed[..8]));
    if cfg!(target_endian = "big") {
        format!("{name}.be")
    } else {
        name
    }
}

pub fn file_path(dir: &Path, kind: &str, seed: &SeedHash) -> PathBuf {
    dir.join(file_name(kind, seed))
}

/// Check whether the file at `path` holds a reusable payload of `payload_size` bytes.
///
/// Returns `Ok(None)` on a match, leaving `file` positioned after the magic number.
fn check(file: &mut File, payload_size: u64) -> io::Result<Option<Probe>> {
    let found = file.metadata()?.len();
    if found != payload_size + MAGIC_NUMBER_SIZE {
        return Ok(Some(Probe::SizeMismatch { found }));
    }
    let mut magic = [0u8; MAGIC_NUMBER_SIZE as usize];
    file.read_exact(&mut magic)?;
    if u64::from_ne_bytes(magic) != MAGIC_NUMBER {
        return Ok(Some(Probe::MagicMismatch));
    }
    Ok(None)
}

/// Read-only check of an existing file. `Ok(None)` means the file matches.
pub fn probe(path: &Path, payload_size: usize) -> Result<Option<Probe>, Error> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Some(Probe::Absent)),
        Err(err) => return Err(Error::io(path, err)),
    };
    check(&mut file, payload_size as u64).map_err(|e| Error::io(path, e))
}

/// Open the generation file for `seed`, reusing it when it is valid and
/// otherwise creating it at its final size.
pub fn prepare(
    dir: &Path,
    kind: &str,
    seed: &SeedHash,
    payload_size: usize,
    force_create: bool,
) -> Result<Prepared, Error> {
    fs::create_dir_all(dir).map_err(|e| {
        tracing::error!(path = %dir.display(), error = %e, "could not create the zrmash directory");
        Error::io(dir, e)
    })?;
    let path = file_path(dir, kind, seed);
    let payload_size = payload_size as u64;

    let probe = if force_create {
        Probe::Forced
    } else {
        match OpenOptions::new().read(true).write(true).open(&path) {
            Ok(mut file) => match check(&mut file, payload_size) {
                Ok(None) => return Ok(Prepared::Match(file)),
                Ok(Some(probe)) => probe,
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Probe::SizeMismatch {
                    found: file.metadata().map(|m| m.len()).unwrap_or(0),
                },
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "could not read generation file");
                    return Err(Error::io(&path, e));
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => Probe::Absent,
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "could not open generation file");
                return Err(Error::io(&path, e));
            }
        }
    };
    if !matches!(probe, Probe::Absent | Probe::Forced) {
        tracing::warn!(path = %path.display(), ?probe, "discarding unusable generation file");
    }

    let file = create(&path, payload_size + MAGIC_NUMBER_SIZE).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "could not create generation file, insufficient space?");
        Error::io(&path, e)
    })?;
    Ok(Prepared::Created { file, probe })
}

/// Create `path` and commit its full extent before any payload is written.
fn create(path: &Path, total_size: u64) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)?;
    file.seek(SeekFrom::Start(total_size - 1))?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

/// Write `payload` into a freshly created file, then commit the magic number.
///
/// The magic number goes in last, so an interrupted write leaves a file that
/// [`prepare`] rejects.
pub fn write_payload(path: &Path, mut file: File, payload: &[u8]) -> Result<(), Error> {
    let write = |file: &mut File| -> io::Result<()> {
        file.seek(SeekFrom::Start(MAGIC_NUMBER_SIZE))?;
        file.write_all(payload)?;
        file.sync_data()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&MAGIC_NUMBER.to_ne_bytes())?;
        file.sync_all()
    };
    write(&mut file).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "could not write generation file");
        Error::io(path, e)
    })
}

/// Read the payload of a matching file.
pub fn read_payload(path: &Path, mut file: File, payload_size: usize) -> Result<Vec<u8>, Error> {
    let mut payload = vec![0u8; payload_size];
    file.read_exact(&mut payload).map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "could not read generation file");
        Error::io(path, e)
    })?;
    Ok(payload)
}

/// Map the payload of a matching file read-only.
pub fn map_payload(path: &Path, file: &File, payload_size: usize) -> Result<Mmap, Error> {
    // SAFETY: a file that matched is never written again; it is only
    // recreated after it stops matching, which a committed file cannot.
    let mapped = unsafe {
        MmapOptions::new()
            .offset(MAGIC_NUMBER_SIZE)
            .len(payload_size)
            .map(file)
    };
    mapped.map_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "could not map generation file");
        Error::io(path, e)
    })
}

/// Remove the file for `seed` if present.
pub fn remove(dir: &Path, kind: &str, seed: &SeedHash) -> Result<bool, Error> {
    let path = file_path(dir, kind, seed);
    match fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(Error::io(path, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::seed_hash;

    fn fill(dir: &Path, seed: &SeedHash, payload: &[u8]) {
        match prepare(dir, "cache", seed, payload.len(), false).unwrap() {
            Prepared::Created { file, probe } => {
                assert_eq!(probe, Probe::Absent);
                write_payload(&file_path(dir, "cache", seed), file, payload).unwrap();
            }
            Prepared::Match(_) => panic!("fresh directory should not match"),
        }
    }

    #[test]
    fn file_name_uses_revision_and_seed_prefix() {
        let name = file_name("cache", &seed_hash(0));
        assert!(name.starts_with("cache-R23-0000000000000000"));
    }

    #[test]
    fn created_file_is_preallocated() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let seed = seed_hash(1);
        let prepared = prepare(&nested, "full", &seed, 100, false).unwrap();
        assert!(matches!(prepared, Prepared::Created { probe: Probe::Absent, .. }));
        let len = fs::metadata(file_path(&nested, "full", &seed)).unwrap().len();
        assert_eq!(len, 100 + MAGIC_NUMBER_SIZE);
    }

    #[test]
    fn written_file_matches_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(2);
        let payload: Vec<u8> = (0..=255u8).collect();
        fill(dir.path(), &seed, &payload);

        let path = file_path(dir.path(), "cache", &seed);
        assert_eq!(probe(&path, payload.len()).unwrap(), None);
        match prepare(dir.path(), "cache", &seed, payload.len(), false).unwrap() {
            Prepared::Match(file) => {
                assert_eq!(read_payload(&path, file, payload.len()).unwrap(), payload);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn mapped_payload_skips_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(8);
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
        fill(dir.path(), &seed, &payload);

        let path = file_path(dir.path(), "cache", &seed);
        match prepare(dir.path(), "cache", &seed, payload.len(), false).unwrap() {
            Prepared::Match(file) => {
                let mapped = map_payload(&path, &file, payload.len()).unwrap();
                assert_eq!(&mapped[..], &payload[..]);
            }
            other => panic!("expected match, got {other:?}"),
        }
    }

    #[test]
    fn wrong_length_with_valid_magic_is_a_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(3);
        fill(dir.path(), &seed, &[7u8; 64]);

        let path = file_path(dir.path(), "cache", &seed);
        assert_eq!(
            probe(&path, 128).unwrap(),
            Some(Probe::SizeMismatch { found: 64 + MAGIC_NUMBER_SIZE })
        );
        match prepare(dir.path(), "cache", &seed, 128, false).unwrap() {
            Prepared::Created { probe, .. } => {
                assert_eq!(probe, Probe::SizeMismatch { found: 64 + MAGIC_NUMBER_SIZE })
            }
            other => panic!("expected rebuild, got {other:?}"),
        }
        assert_eq!(fs::metadata(&path).unwrap().len(), 128 + MAGIC_NUMBER_SIZE);
    }

    #[test]
    fn foreign_magic_is_a_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(4);
        let path = file_path(dir.path(), "cache", &seed);
        fs::write(&path, [1u8; 8 + 32]).unwrap();
        assert_eq!(probe(&path, 32).unwrap(), Some(Probe::MagicMismatch));
        assert!(matches!(
            prepare(dir.path(), "cache", &seed, 32, false).unwrap(),
            Prepared::Created { probe: Probe::MagicMismatch, .. }
        ));
    }

    #[test]
    fn forced_creation_ignores_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(5);
        fill(dir.path(), &seed, &[9u8; 32]);
        assert!(matches!(
            prepare(dir.path(), "cache", &seed, 32, true).unwrap(),
            Prepared::Created { probe: Probe::Forced, .. }
        ));
    }

    #[test]
    fn unusable_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let err = prepare(&blocker.join("sub"), "cache", &seed_hash(0), 32, false).unwrap_err();
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn interrupted_write_is_not_reused() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(7);
        let path = file_path(dir.path(), "cache", &seed);
        match prepare(dir.path(), "cache", &seed, 4096, false).unwrap() {
            Prepared::Created { mut file, .. } => {
                // Part of the payload lands, the header never does.
                file.seek(SeekFrom::Start(MAGIC_NUMBER_SIZE)).unwrap();
                file.write_all(&[0xaa; 100]).unwrap();
            }
            other => panic!("expected creation, got {other:?}"),
        }
        assert_eq!(probe(&path, 4096).unwrap(), Some(Probe::MagicMismatch));
        assert!(matches!(
            prepare(dir.path(), "cache", &seed, 4096, false).unwrap(),
            Prepared::Created { probe: Probe::MagicMismatch, .. }
        ));
    }

    #[test]
    fn remove_reports_presence() {
        let dir = tempfile::tempdir().unwrap();
        let seed = seed_hash(6);
        fill(dir.path(), &seed, &[1u8; 16]);
        assert!(remove(dir.path(), "cache", &seed).unwrap());
        assert!(!remove(dir.path(), "cache", &seed).unwrap());
    }
}
