//! Ledger notifications for observers
//!
//! The ledger publishes over a broadcast channel; subscribers that lag or
//! disconnect never block a submission.

use crate::Nonce;

/// Events emitted by the mining ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiningEvent {
    /// A submission was accepted and paid out
    MiningSuccess {
        miner: String,
        reward: u128,
        nonce: Nonce,
    },
    /// Admin changed the difficulty
    DifficultyUpdated { old: u32, new: u32 },
    /// Admin changed the reward amount
    RewardUpdated { old: u128, new: u128 },
    /// The reward pool was funded
    PoolFunded { amount: u128, balance: u128 },
}
