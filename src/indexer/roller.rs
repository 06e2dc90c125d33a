//! Background idf roll loop
//!
//! The loop drains the pending-term list one term at a time while the index
//! queue is quiet. It sleeps when there is nothing to do, when indexing is in
//! progress or when another roller holds the lock, and wakes on the next
//! index event or after the quiescence interval.

use super::Indexer;
use crate::config::IndexerConfig;
use crate::queue::JobQueue;
use crate::store::DocumentId;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Result of one roll step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollOutcome {
    /// The index queue had active jobs; nothing was touched
    Busy,
    /// No term was pending
    Idle,
    /// Another roller held the lock; the popped term was dropped
    Contended(String),
    /// The term's staged idf was already consumed
    NothingStaged(String),
    /// The staged idf was written to `updated` vector entries
    Rolled { term: String, updated: usize },
}

impl RollOutcome {
    /// Whether the loop should continue without waiting
    fn made_progress(&self) -> bool {
        matches!(self, Self::Rolled { .. } | Self::NothingStaged(_))
    }
}

pub struct IdfRoller {
    indexer: Arc<Indexer>,
    index_queue: Arc<JobQueue<DocumentId>>,
    wake: Arc<Notify>,
    quiescence: Duration,
    lock_ttl: Duration,
}

impl IdfRoller {
    pub fn new(
        indexer: Arc<Indexer>,
        index_queue: Arc<JobQueue<DocumentId>>,
        config: &IndexerConfig,
    ) -> Self {
        Self {
            indexer,
            index_queue,
            wake: Arc::new(Notify::new()),
            quiescence: config.quiescence(),
            lock_ttl: config.lock_ttl(),
        }
    }

    /// Handle used to wake the loop after an index event
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Runs one roll step, logging and swallowing errors
    pub fn roll_cycle(&self) -> Option<RollOutcome> {
        let active = self.index_queue.active_count();

        match self.indexer.roll_once(active, self.lock_ttl) {
            Ok(outcome) => {
                match &outcome {
                    RollOutcome::Busy => {
                        debug!("Skipping idf roll, {} index jobs active", active)
                    }
                    RollOutcome::Contended(term) => {
                        debug!("idf roll lock held elsewhere, dropping '{}'", term)
                    }
                    _ => {}
                }
                Some(outcome)
            }
            Err(e) => {
                warn!("idf roll failed: {}", e);
                None
            }
        }
    }

    /// Spawns the loop; it exits when `shutdown` turns true or its sender drops
    pub fn spawn(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("idf roller started");
            let mut rolled = 0usize;

            loop {
                if *shutdown.borrow() {
                    break;
                }

                let outcome = self.roll_cycle();
                if outcome.as_ref().is_some_and(RollOutcome::made_progress) {
                    rolled += 1;
                    tokio::task::yield_now().await;
                    continue;
                }

                if rolled > 0 {
                    info!("idf roll cycle finished ({} terms)", rolled);
                    rolled = 0;
                }

                tokio::select! {
                    _ = self.wake.notified() => {}
                    _ = tokio::time::sleep(self.quiescence) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }

            info!("idf roller stopped");
        })
    }
}
