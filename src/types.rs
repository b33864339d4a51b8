use crate::error::VerifyError;
use serde::{Deserialize, Serialize};

/// Result of checking a sealed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Invalid(VerifyError),
}

impl Verdict {
    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }

    /// Convert into a `Result`, for callers that treat rejection as an error.
    pub fn into_result(self) -> Result<(), VerifyError> {
        match self {
            Verdict::Valid => Ok(()),
            Verdict::Invalid(err) => Err(err),
        }
    }
}

/// A nonce meeting the header's target, with its digests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Solution {
    pub nonce: u64,
    pub mix_digest: [u8; 32],
    pub result: [u8; 32],
}

impl Solution {
    pub fn result_hex(&self) -> String {
        hex::encode(self.result)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MineOutcome {
    Sealed(Solution),
    Aborted,
}

impl MineOutcome {
    pub fn solution(&self) -> Option<&Solution> {
        match self {
            MineOutcome::Sealed(solution) => Some(solution),
            MineOutcome::Aborted => None,
        }
    }
}
