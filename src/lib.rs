//! Proof-of-Work reward distribution engine
//!
//! Two cooperating components connected by a narrow verification contract:
//! - The nonce search engine hunts for a nonce whose digest over
//!   (miner address, nonce, timestamp) clears the current difficulty
//! - The mining ledger verifies every submission independently, prevents
//!   nonce replay, rate-limits miners, and pays a fixed reward from a
//!   pooled balance
//!
//! The ledger is the single authority over balances and miner records; the
//! search engine is untrusted and never mutates shared state. A per-miner
//! mining session ties the two together with the retry/backoff policy a
//! well-behaved client is expected to follow.

pub mod events;
pub mod ledger;
pub mod miner;
pub mod proof;
pub mod session;

pub use events::MiningEvent;
pub use ledger::{GlobalStats, MinerRecord, MiningLedger};
pub use miner::{NonceSearcher, SearchConfig, SearcherStats};
pub use proof::{check_difficulty, compute_digest, Nonce, ProofSubmission, NONCE_LEN};
pub use session::MiningSession;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MiningError {
    #[error("timestamp {submitted} outside acceptance window around {now}")]
    StaleOrFutureTimestamp { submitted: u64, now: u64 },

    #[error("mining too fast, retry in {retry_after_secs}s")]
    TooFast { retry_after_secs: u64 },

    #[error("nonce already used")]
    DuplicateNonce,

    #[error("digest does not meet difficulty {difficulty}")]
    InvalidProof { difficulty: u32 },

    #[error("reward pool balance {balance} below required {required}")]
    InsufficientPool { balance: u128, required: u128 },

    #[error("operation requires the admin identity")]
    Unauthorized,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, MiningError>;

/// Ledger configuration. Mutable fields (difficulty, reward) are changed
/// through admin operations after construction.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Number of leading zero bytes a digest must have
    pub difficulty: u32,
    /// Payout per accepted submission, in base units (must be > 0)
    pub reward_amount: u128,
    /// Minimum seconds between accepted submissions from one miner
    pub min_resubmit_interval_secs: u64,
    /// Submitted timestamps may deviate this many seconds from ledger time
    pub timestamp_tolerance_secs: u64,
    /// Initial reward pool funding
    pub initial_pool_balance: u128,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            difficulty: 2,
            reward_amount: 10_000_000, // 10 units at 6 decimals
            min_resubmit_interval_secs: 30,
            timestamp_tolerance_secs: 120,
            initial_pool_balance: 0,
        }
    }
}

/// Current unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LedgerConfig::default();
        assert_eq!(config.difficulty, 2);
        assert_eq!(config.reward_amount, 10_000_000);
        assert_eq!(config.min_resubmit_interval_secs, 30);
    }

    #[test]
    fn test_error_display() {
        let err = MiningError::TooFast {
            retry_after_secs: 12,
        };
        assert_eq!(err.to_string(), "mining too fast, retry in 12s");

        let err = MiningError::InsufficientPool {
            balance: 5,
            required: 10,
        };
        assert!(err.to_string().contains('5'));
        assert!(err.to_string().contains("10"));
    }
}
