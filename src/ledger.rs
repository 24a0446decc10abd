//! The mining ledger: sole arbiter of submission validity and reward
//! accounting
//!
//! Every submission is validated and applied inside one exclusive critical
//! section, so checks never interleave with mutations and submissions
//! serialize in arrival order. Rejections are typed errors; the ledger
//! never panics on bad input.

use crate::events::MiningEvent;
use crate::proof::{check_difficulty, ProofSubmission};
use crate::{unix_now, LedgerConfig, MiningError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Per-miner reward record. Created lazily on the first accepted
/// submission and never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerRecord {
    /// Miner address
    pub address: String,
    /// Cumulative payout, in base units
    pub total_rewarded: u128,
    /// Timestamp of the last accepted submission
    pub last_mine_time: u64,
    /// Number of accepted submissions
    pub successful_mines: u64,
    /// Record creation timestamp
    pub created_at: u64,
}

impl MinerRecord {
    fn new(address: String) -> Self {
        Self {
            address,
            total_rewarded: 0,
            last_mine_time: 0,
            successful_mines: 0,
            created_at: unix_now(),
        }
    }
}

/// Ledger-wide statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStats {
    pub total_rewarded: u128,
    pub total_miners: usize,
    pub difficulty: u32,
    pub reward_amount: u128,
    pub pool_balance: u128,
}

struct LedgerState {
    difficulty: u32,
    reward_amount: u128,
    min_resubmit_interval_secs: u64,
    timestamp_tolerance_secs: u64,
    pool_balance: u128,
    miners: HashMap<String, MinerRecord>,
    used_nonces: HashSet<(String, [u8; 32])>,
    total_rewarded: u128,
}

/// The authoritative verifier and reward pool owner.
pub struct MiningLedger {
    admin: String,
    state: Mutex<LedgerState>,
    event_tx: broadcast::Sender<MiningEvent>,
}

impl MiningLedger {
    /// Create a ledger owned by `admin`, seeded with the configured pool
    /// balance.
    pub fn new(admin: impl Into<String>, config: LedgerConfig) -> Result<Self> {
        if config.reward_amount == 0 {
            return Err(MiningError::InvalidConfig(
                "reward amount must be greater than zero".to_string(),
            ));
        }

        let admin = admin.into();
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        info!(
            "Creating mining ledger: admin={}, difficulty={}, reward={}, interval={}s, pool={}",
            admin,
            config.difficulty,
            config.reward_amount,
            config.min_resubmit_interval_secs,
            config.initial_pool_balance
        );

        Ok(Self {
            admin,
            state: Mutex::new(LedgerState {
                difficulty: config.difficulty,
                reward_amount: config.reward_amount,
                min_resubmit_interval_secs: config.min_resubmit_interval_secs,
                timestamp_tolerance_secs: config.timestamp_tolerance_secs,
                pool_balance: config.initial_pool_balance,
                miners: HashMap::new(),
                used_nonces: HashSet::new(),
                total_rewarded: 0,
            }),
            event_tx,
        })
    }

    /// Subscribe to ledger events.
    pub fn subscribe(&self) -> broadcast::Receiver<MiningEvent> {
        self.event_tx.subscribe()
    }

    /// Validate a submission and, if it passes every check, pay out the
    /// current reward. Returns the amount paid.
    ///
    /// Check order is fixed: timestamp window, rate limit, replay, proof,
    /// pool funds. The first failing check decides the error.
    pub async fn submit(&self, submission: &ProofSubmission) -> Result<u128> {
        let now = unix_now();
        let mut state = self.state.lock().await;

        // 1. Timestamp window
        let tolerance = state.timestamp_tolerance_secs;
        let stale = submission.timestamp.saturating_add(tolerance) < now;
        let future = submission.timestamp > now.saturating_add(tolerance);
        if stale || future {
            debug!(
                "Rejecting submission from {}: timestamp {} outside window (now {})",
                submission.miner, submission.timestamp, now
            );
            return Err(MiningError::StaleOrFutureTimestamp {
                submitted: submission.timestamp,
                now,
            });
        }

        // 2. Rate limit (no record yet means the miner has never been paid)
        if let Some(record) = state.miners.get(&submission.miner) {
            let elapsed = now.saturating_sub(record.last_mine_time);
            if elapsed < state.min_resubmit_interval_secs {
                let retry_after_secs = state.min_resubmit_interval_secs - elapsed;
                debug!(
                    "Rejecting submission from {}: too fast, {}s remaining",
                    submission.miner, retry_after_secs
                );
                return Err(MiningError::TooFast { retry_after_secs });
            }
        }

        // 3. Replay
        let nonce_key = (submission.miner.clone(), submission.nonce);
        if state.used_nonces.contains(&nonce_key) {
            debug!(
                "Rejecting submission from {}: nonce {} already used",
                submission.miner,
                submission.nonce_hex()
            );
            return Err(MiningError::DuplicateNonce);
        }

        // 4/5. Recompute the proof server-side; a client validity claim is
        // never trusted
        let digest = submission.digest();
        if !check_difficulty(&digest, state.difficulty) {
            debug!(
                "Rejecting submission from {}: digest {} fails difficulty {}",
                submission.miner,
                hex::encode(digest),
                state.difficulty
            );
            return Err(MiningError::InvalidProof {
                difficulty: state.difficulty,
            });
        }

        // 6. Pool funds
        let reward = state.reward_amount;
        if state.pool_balance < reward {
            warn!(
                "Rejecting submission from {}: pool balance {} below reward {}",
                submission.miner, state.pool_balance, reward
            );
            return Err(MiningError::InsufficientPool {
                balance: state.pool_balance,
                required: reward,
            });
        }

        // Accepted: apply the whole transition under the same lock
        state.used_nonces.insert(nonce_key);
        state.pool_balance -= reward;
        state.total_rewarded = state.total_rewarded.saturating_add(reward);

        let miner = submission.miner.clone();
        let record = state
            .miners
            .entry(miner.clone())
            .or_insert_with(|| MinerRecord::new(miner.clone()));
        record.total_rewarded = record.total_rewarded.saturating_add(reward);
        record.successful_mines = record.successful_mines.saturating_add(1);
        // Accepted timestamps may arrive out of order inside the window;
        // last_mine_time stays monotonic
        record.last_mine_time = record.last_mine_time.max(submission.timestamp);

        let mines = record.successful_mines;
        drop(state);

        info!(
            "Mining success: miner={}, reward={}, nonce={}, total_mines={}",
            submission.miner,
            reward,
            submission.nonce_hex(),
            mines
        );

        // No subscribers is fine
        let _ = self.event_tx.send(MiningEvent::MiningSuccess {
            miner: submission.miner.clone(),
            reward,
            nonce: submission.nonce,
        });

        Ok(reward)
    }

    /// Run the difficulty predicate against the current difficulty.
    /// Exposed so clients can pre-validate before submitting.
    pub async fn check_digest(&self, digest: &[u8; 32]) -> bool {
        let state = self.state.lock().await;
        check_difficulty(digest, state.difficulty)
    }

    /// Update the difficulty. Admin only; takes effect for all subsequent
    /// submissions.
    pub async fn update_difficulty(&self, caller: &str, new_difficulty: u32) -> Result<()> {
        self.require_admin(caller)?;

        let mut state = self.state.lock().await;
        let old = state.difficulty;
        state.difficulty = new_difficulty;
        drop(state);

        info!("Difficulty updated: {} -> {}", old, new_difficulty);
        let _ = self.event_tx.send(MiningEvent::DifficultyUpdated {
            old,
            new: new_difficulty,
        });
        Ok(())
    }

    /// Update the reward amount. Admin only; rejects zero.
    pub async fn update_reward(&self, caller: &str, new_reward: u128) -> Result<()> {
        self.require_admin(caller)?;
        if new_reward == 0 {
            return Err(MiningError::InvalidConfig(
                "reward amount must be greater than zero".to_string(),
            ));
        }

        let mut state = self.state.lock().await;
        let old = state.reward_amount;
        state.reward_amount = new_reward;
        drop(state);

        info!("Reward updated: {} -> {}", old, new_reward);
        let _ = self.event_tx.send(MiningEvent::RewardUpdated {
            old,
            new: new_reward,
        });
        Ok(())
    }

    /// Withdraw from the reward pool. Admin only.
    pub async fn withdraw_rewards(&self, caller: &str, amount: u128) -> Result<()> {
        self.require_admin(caller)?;

        let mut state = self.state.lock().await;
        if state.pool_balance < amount {
            return Err(MiningError::InsufficientPool {
                balance: state.pool_balance,
                required: amount,
            });
        }
        state.pool_balance -= amount;
        let remaining = state.pool_balance;
        drop(state);

        info!("Rewards withdrawn: amount={}, remaining={}", amount, remaining);
        Ok(())
    }

    /// Fund the reward pool. Deposit semantics: callable by anyone.
    pub async fn fund(&self, amount: u128) {
        let mut state = self.state.lock().await;
        state.pool_balance = state.pool_balance.saturating_add(amount);
        let balance = state.pool_balance;
        drop(state);

        info!("Pool funded: amount={}, balance={}", amount, balance);
        let _ = self
            .event_tx
            .send(MiningEvent::PoolFunded { amount, balance });
    }

    /// Record for one miner, if it has ever been paid.
    pub async fn get_miner_stats(&self, miner: &str) -> Option<MinerRecord> {
        let state = self.state.lock().await;
        state.miners.get(miner).cloned()
    }

    /// Current reward pool balance.
    pub async fn pool_balance(&self) -> u128 {
        self.state.lock().await.pool_balance
    }

    /// Ledger-wide statistics.
    pub async fn global_stats(&self) -> GlobalStats {
        let state = self.state.lock().await;
        GlobalStats {
            total_rewarded: state.total_rewarded,
            total_miners: state.miners.len(),
            difficulty: state.difficulty,
            reward_amount: state.reward_amount,
            pool_balance: state.pool_balance,
        }
    }

    /// Current difficulty.
    pub async fn difficulty(&self) -> u32 {
        self.state.lock().await.difficulty
    }

    /// Current reward amount.
    pub async fn reward_amount(&self) -> u128 {
        self.state.lock().await.reward_amount
    }

    fn require_admin(&self, caller: &str) -> Result<()> {
        if caller != self.admin {
            warn!("Unauthorized admin operation attempted by {}", caller);
            return Err(MiningError::Unauthorized);
        }
        Ok(())
    }
}
