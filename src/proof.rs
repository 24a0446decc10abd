//! Digest computation and the difficulty predicate shared by the search
//! engine and the ledger
//!
//! Both sides must agree bit-for-bit: a digest is valid when, interpreted
//! as a big-endian unsigned integer, it is <= MAX_TARGET >> (8 * difficulty).
//! That holds exactly when the top `difficulty` bytes of the digest are zero.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Nonce width in bytes (256-bit random nonces).
pub const NONCE_LEN: usize = 32;

/// A fixed-width random nonce.
pub type Nonce = [u8; NONCE_LEN];

/// SHA-256 over miner address, nonce, and big-endian timestamp.
pub fn compute_digest(miner: &str, nonce: &Nonce, timestamp: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(miner.as_bytes());
    hasher.update(nonce);
    hasher.update(timestamp.to_be_bytes());
    hasher.finalize().into()
}

/// The difficulty predicate: top `difficulty` bytes of the digest are zero.
///
/// Difficulties of 32 and above only admit the all-zero digest.
pub fn check_difficulty(digest: &[u8; 32], difficulty: u32) -> bool {
    let zero_bytes = difficulty.min(32) as usize;
    digest[..zero_bytes].iter().all(|&b| b == 0)
}

/// The tuple a miner submits to the ledger.
///
/// The digest is always recomputed from these three fields; a submission
/// carries no validity claim of its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofSubmission {
    pub miner: String,
    pub nonce: Nonce,
    pub timestamp: u64,
}

impl ProofSubmission {
    pub fn new(miner: impl Into<String>, nonce: Nonce, timestamp: u64) -> Self {
        Self {
            miner: miner.into(),
            nonce,
            timestamp,
        }
    }

    pub fn digest(&self) -> [u8; 32] {
        compute_digest(&self.miner, &self.nonce, self.timestamp)
    }

    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        check_difficulty(&self.digest(), difficulty)
    }

    /// Hex rendering of the nonce for logs and display.
    pub fn nonce_hex(&self) -> String {
        hex::encode(self.nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_deterministic() {
        let nonce = [7u8; 32];
        let a = compute_digest("0xminer", &nonce, 1_700_000_000);
        let b = compute_digest("0xminer", &nonce, 1_700_000_000);
        assert_eq!(a, b);
    }

    #[test]
    fn test_digest_depends_on_every_field() {
        let nonce = [7u8; 32];
        let base = compute_digest("0xminer", &nonce, 1_700_000_000);

        assert_ne!(base, compute_digest("0xother", &nonce, 1_700_000_000));
        assert_ne!(base, compute_digest("0xminer", &[8u8; 32], 1_700_000_000));
        assert_ne!(base, compute_digest("0xminer", &nonce, 1_700_000_001));
    }

    #[test]
    fn test_check_difficulty_zero_accepts_everything() {
        assert!(check_difficulty(&[0xFF; 32], 0));
        assert!(check_difficulty(&[0u8; 32], 0));
    }

    #[test]
    fn test_check_difficulty_leading_zero_bytes() {
        // 0x0000AB... passes difficulty 2, fails difficulty 3
        let mut digest = [0u8; 32];
        digest[2] = 0xAB;
        assert!(check_difficulty(&digest, 1));
        assert!(check_difficulty(&digest, 2));
        assert!(!check_difficulty(&digest, 3));
    }

    #[test]
    fn test_check_difficulty_high_digest_fails() {
        // 0xFFFF... has no leading zero bytes
        assert!(!check_difficulty(&[0xFF; 32], 1));
        assert!(!check_difficulty(&[0xFF; 32], 2));
    }

    #[test]
    fn test_check_difficulty_beyond_digest_width() {
        assert!(check_difficulty(&[0u8; 32], 32));
        assert!(check_difficulty(&[0u8; 32], 64));
        let mut digest = [0u8; 32];
        digest[31] = 1;
        assert!(!check_difficulty(&digest, 32));
        assert!(!check_difficulty(&digest, 64));
    }

    #[test]
    fn test_submission_matches_free_functions() {
        let submission = ProofSubmission::new("0xminer", [7u8; 32], 1_700_000_000);
        assert_eq!(
            submission.digest(),
            compute_digest("0xminer", &[7u8; 32], 1_700_000_000)
        );
        assert_eq!(
            submission.meets_difficulty(1),
            check_difficulty(&submission.digest(), 1)
        );
    }

    #[test]
    fn test_nonce_hex() {
        let submission = ProofSubmission::new("0xminer", [0xAB; 32], 0);
        assert_eq!(submission.nonce_hex(), "ab".repeat(32));
    }
}
