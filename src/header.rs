use blake3::Hasher as Blake3Hasher;
use serde::{Deserialize, Serialize};

/// The parts of a block header the engine consumes.
///
/// `extra` carries every other hashable header field, opaque to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    pub number: u64,
    pub parent_hash: [u8; 32],
    pub difficulty: u64,
    pub nonce: u64,
    pub mix_digest: [u8; 32],
    pub extra: Vec<u8>,
}

impl Header {
    /// Hash of the header without its seal (nonce and mix digest).
    pub fn seal_hash(&self) -> [u8; 32] {
        let mut hasher = Blake3Hasher::new();
        hasher.update(b"zrmash:seal:v1|");
        hasher.update(&self.parent_hash);
        hasher.update(&self.number.to_le_bytes());
        hasher.update(&self.difficulty.to_le_bytes());
        hasher.update(&(self.extra.len() as u64).to_le_bytes());
        hasher.update(&self.extra);
        hasher.finalize().into()
    }

    /// Copy of the header carrying the given seal.
    pub fn with_seal(&self, nonce: u64, mix_digest: [u8; 32]) -> Self {
        Self {
            nonce,
            mix_digest,
            ..self.clone()
        }
    }

    pub fn seal_hash_hex(&self) -> String {
        hex::encode(self.seal_hash())
    }
}
