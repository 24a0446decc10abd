//! Client-side nonce search
//!
//! Best-effort, bounded discovery of a nonce meeting the current
//! difficulty. The searcher never touches the ledger; it only produces a
//! submission tuple for the caller to hand in.

use crate::proof::{check_difficulty, compute_digest, Nonce, ProofSubmission};
use crate::unix_now;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Search loop configuration.
#[derive(Debug, Clone, Copy)]
pub struct SearchConfig {
    /// Hard ceiling on attempts per search round
    pub attempt_cap: u64,
    /// Yield to the runtime (and re-check cancellation promptly) every
    /// this many attempts
    pub yield_interval: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            attempt_cap: 100_000,
            yield_interval: 1_024,
        }
    }
}

/// Searcher statistics snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct SearcherStats {
    /// Attempts consumed in the current (or last) round
    pub round_attempts: u64,
    /// Attempt ceiling per round
    pub attempt_cap: u64,
    /// Attempts across all rounds
    pub total_attempts: u64,
    /// Nonces found across all rounds
    pub nonces_found: u64,
}

/// Bounded random search for a nonce satisfying the difficulty predicate.
///
/// Cancellation is cooperative and latched: the flag is checked every
/// iteration, a cancel takes effect within one yield interval, and it
/// stays in force across rounds until `reset` — so a cancel that lands
/// between two rounds still aborts the next one.
pub struct NonceSearcher {
    config: SearchConfig,
    round_attempts: AtomicU64,
    total_attempts: AtomicU64,
    nonces_found: AtomicU64,
    cancelled: AtomicBool,
}

impl NonceSearcher {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            round_attempts: AtomicU64::new(0),
            total_attempts: AtomicU64::new(0),
            nonces_found: AtomicU64::new(0),
            cancelled: AtomicBool::new(false),
        }
    }

    /// Search one round for `miner` at the given difficulty.
    ///
    /// Returns `None` when the attempt cap is exhausted or the round is
    /// cancelled; the caller decides whether to retry.
    pub async fn search(&self, miner: &str, difficulty: u32) -> Option<ProofSubmission> {
        self.round_attempts.store(0, Ordering::Relaxed);

        for attempt in 1..=self.config.attempt_cap {
            if self.cancelled.load(Ordering::Relaxed) {
                debug!(
                    "Search cancelled for {} after {} attempts",
                    miner,
                    attempt - 1
                );
                return None;
            }

            // thread-local RNG handle is not held across yield points
            let nonce: Nonce = rand::random();
            let timestamp = unix_now();
            let digest = compute_digest(miner, &nonce, timestamp);

            self.round_attempts.store(attempt, Ordering::Relaxed);
            self.total_attempts.fetch_add(1, Ordering::Relaxed);

            if check_difficulty(&digest, difficulty) {
                self.nonces_found.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Valid nonce found for {} after {} attempts (difficulty {})",
                    miner, attempt, difficulty
                );
                return Some(ProofSubmission::new(miner, nonce, timestamp));
            }

            if attempt % self.config.yield_interval == 0 {
                tokio::task::yield_now().await;
            }
        }

        debug!(
            "Search exhausted for {} at {} attempts (difficulty {})",
            miner, self.config.attempt_cap, difficulty
        );
        None
    }

    /// Cancel the in-flight search round and every round after it, until
    /// `reset` is called.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    /// Clear a latched cancel so the searcher can be reused.
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Relaxed);
    }

    /// Attempts consumed in the current round.
    pub fn attempts(&self) -> u64 {
        self.round_attempts.load(Ordering::Relaxed)
    }

    /// Fraction of the attempt cap consumed in the current round.
    pub fn progress(&self) -> f64 {
        if self.config.attempt_cap == 0 {
            return 0.0;
        }
        self.attempts() as f64 / self.config.attempt_cap as f64
    }

    pub fn stats(&self) -> SearcherStats {
        SearcherStats {
            round_attempts: self.round_attempts.load(Ordering::Relaxed),
            attempt_cap: self.config.attempt_cap,
            total_attempts: self.total_attempts.load(Ordering::Relaxed),
            nonces_found: self.nonces_found.load(Ordering::Relaxed),
        }
    }
}

impl Default for NonceSearcher {
    fn default() -> Self {
        Self::new(SearchConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_difficulty_zero_finds_immediately() {
        let searcher = NonceSearcher::default();
        let found = searcher.search("0xminer", 0).await;

        let submission = found.expect("difficulty 0 accepts the first nonce");
        assert_eq!(submission.miner, "0xminer");
        assert!(submission.meets_difficulty(0));
        assert_eq!(searcher.attempts(), 1);
        assert_eq!(searcher.stats().nonces_found, 1);
    }

    #[tokio::test]
    async fn test_found_submission_verifies() {
        let searcher = NonceSearcher::default();
        // difficulty 1: one-in-256 per attempt, effectively certain within
        // the 100k cap
        let submission = searcher.search("0xminer", 1).await.unwrap();
        assert!(submission.meets_difficulty(1));
        assert!(searcher.attempts() >= 1);
    }

    #[tokio::test]
    async fn test_exhaustion_respects_cap() {
        let config = SearchConfig {
            attempt_cap: 50,
            yield_interval: 16,
        };
        let searcher = NonceSearcher::new(config);

        // difficulty 32 requires an all-zero digest; 50 attempts cannot hit it
        let found = searcher.search("0xminer", 32).await;
        assert!(found.is_none());
        assert_eq!(searcher.attempts(), 50);
        assert!((searcher.progress() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_total_attempts_accumulate_across_rounds() {
        let config = SearchConfig {
            attempt_cap: 10,
            yield_interval: 4,
        };
        let searcher = NonceSearcher::new(config);

        searcher.search("0xminer", 32).await;
        searcher.search("0xminer", 32).await;

        let stats = searcher.stats();
        assert_eq!(stats.round_attempts, 10);
        assert_eq!(stats.total_attempts, 20);
        assert_eq!(stats.nonces_found, 0);
    }

    #[tokio::test]
    async fn test_cancel_latches_until_reset() {
        let searcher = NonceSearcher::default();
        searcher.cancel();

        // difficulty 0 would succeed on the first attempt; the latched
        // cancel wins, and keeps winning on later rounds
        assert!(searcher.search("0xminer", 0).await.is_none());
        assert!(searcher.search("0xminer", 0).await.is_none());

        searcher.reset();
        assert!(searcher.search("0xminer", 0).await.is_some());
    }

    #[tokio::test]
    async fn test_cancel_before_round_aborts_unbounded_search() {
        // a cancel landing just before a round starts must not be
        // discarded, or an uncapped round would run forever
        let config = SearchConfig {
            attempt_cap: u64::MAX,
            yield_interval: 64,
        };
        let searcher = NonceSearcher::new(config);
        searcher.cancel();

        let found = tokio::time::timeout(
            std::time::Duration::from_secs(2),
            searcher.search("0xminer", 32),
        )
        .await
        .expect("cancelled round returns promptly");
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_cancel_aborts_inflight_round() {
        use std::sync::Arc;

        let config = SearchConfig {
            attempt_cap: u64::MAX,
            yield_interval: 64,
        };
        let searcher = Arc::new(NonceSearcher::new(config));

        let task = {
            let searcher = Arc::clone(&searcher);
            tokio::spawn(async move { searcher.search("0xminer", 32).await })
        };

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        searcher.cancel();

        let found = task.await.unwrap();
        assert!(found.is_none());
    }
}
