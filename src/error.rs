use std::io;
use std::path::PathBuf;

/// Reasons a sealed header is rejected.
///
/// These are ordinary negative outcomes of verification, not failures of the
/// engine itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    #[error("non-positive difficulty")]
    InvalidDifficulty,
    #[error("invalid mix digest")]
    InvalidMixDigest,
    #[error("invalid proof-of-work")]
    InsufficientWork,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed config: {0}")]
    MalformedConfig(#[from] serde_json::Error),
    #[error("worker thread panicked")]
    WorkerPanicked,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
