//! Long-lived per-miner mining loop
//!
//! Alternates nonce search and ledger submission, applying the retry
//! policy the verifier expects: wait out a rate limit, retry quickly after
//! an exhausted search, back off harder after a rejection that indicates a
//! stale view or a client bug, and stop outright when the pool is dry.

use crate::ledger::MiningLedger;
use crate::miner::{NonceSearcher, SearchConfig};
use crate::MiningError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Pause after an exhausted search round.
const NOT_FOUND_RETRY: Duration = Duration::from_secs(1);
/// Pause after an accepted submission before mining again.
const SUCCESS_PAUSE: Duration = Duration::from_secs(2);
/// Pause after a rejection that needs fresh input or a fresh difficulty.
const HARD_ERROR_RETRY: Duration = Duration::from_secs(5);

/// A cancellable mining task for one participant.
pub struct MiningSession {
    identity: String,
    ledger: Arc<MiningLedger>,
    searcher: Arc<NonceSearcher>,
    running: Arc<AtomicBool>,
    stop_notify: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl MiningSession {
    pub fn new(identity: impl Into<String>, ledger: Arc<MiningLedger>) -> Self {
        Self::with_search_config(identity, ledger, SearchConfig::default())
    }

    pub fn with_search_config(
        identity: impl Into<String>,
        ledger: Arc<MiningLedger>,
        config: SearchConfig,
    ) -> Self {
        Self {
            identity: identity.into(),
            ledger,
            searcher: Arc::new(NonceSearcher::new(config)),
            running: Arc::new(AtomicBool::new(false)),
            stop_notify: Arc::new(Notify::new()),
            handle: Mutex::new(None),
        }
    }

    /// Start the mining loop. A no-op if the session is already running.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Mining session for {} already running", self.identity);
            return;
        }

        // a cancel latched by a previous stop would abort every round
        self.searcher.reset();

        info!("Mining session started for {}", self.identity);
        let session = Arc::clone(self);
        let task = tokio::spawn(async move { session.run().await });
        *self.handle.lock().await = Some(task);
    }

    /// Stop the session: cancel the in-flight search round, wake any
    /// backoff sleep, and wait for the loop to exit.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.searcher.cancel();
        self.stop_notify.notify_waiters();

        if let Some(task) = self.handle.lock().await.take() {
            if let Err(e) = task.await {
                error!("Mining task for {} panicked: {}", self.identity, e);
            }
        }
        info!("Mining session stopped for {}", self.identity);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Attempts consumed in the current search round.
    pub fn attempts(&self) -> u64 {
        self.searcher.attempts()
    }

    /// Fraction of the attempt cap consumed in the current search round.
    pub fn progress(&self) -> f64 {
        self.searcher.progress()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    async fn run(&self) {
        while self.running.load(Ordering::SeqCst) {
            let difficulty = self.ledger.difficulty().await;

            let Some(submission) = self.searcher.search(&self.identity, difficulty).await else {
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }
                debug!(
                    "No valid nonce for {} this round, retrying",
                    self.identity
                );
                self.pause(NOT_FOUND_RETRY).await;
                continue;
            };

            match self.ledger.submit(&submission).await {
                Ok(reward) => {
                    info!(
                        "Submission accepted for {}: reward={}, nonce={}",
                        self.identity,
                        reward,
                        submission.nonce_hex()
                    );
                    self.pause(SUCCESS_PAUSE).await;
                }
                Err(MiningError::TooFast { retry_after_secs }) => {
                    debug!(
                        "Rate limited for {}: waiting {}s",
                        self.identity, retry_after_secs
                    );
                    // wait out exactly the remaining cooldown
                    self.pause(Duration::from_secs(retry_after_secs)).await;
                }
                Err(e @ MiningError::InsufficientPool { .. }) => {
                    // Surfaced to the operator; retrying cannot help until
                    // the pool is refunded
                    warn!("Stopping session for {}: {}", self.identity, e);
                    break;
                }
                Err(e) => {
                    warn!("Submission rejected for {}: {}", self.identity, e);
                    self.pause(HARD_ERROR_RETRY).await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        debug!("Mining loop exited for {}", self.identity);
    }

    /// Sleep that a `stop` call can interrupt, even when the stop lands
    /// just before the sleep begins.
    async fn pause(&self, duration: Duration) {
        let notified = self.stop_notify.notified();
        tokio::pin!(notified);
        // register for the wakeup before re-reading the flag, so a
        // notify_waiters between the two cannot be lost
        notified.as_mut().enable();
        if !self.running.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            _ = notified => {}
            _ = tokio::time::sleep(duration) => {}
        }
    }
}
