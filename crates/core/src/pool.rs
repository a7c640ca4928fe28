//! Bounded worker pool draining a fixed piece queue
//!
//! All pieces are enqueued up front. `concurrency` workers pull from the
//! queue until it is exhausted. A worker that fails a piece records the
//! error and exits; what its siblings do next is governed by
//! [`FailurePolicy`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::plan::Piece;
use crate::progress::{PieceState, ProgressTracker};

/// Behavior of the remaining workers after one piece fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Surviving workers keep draining the queue; the first error is
    /// reported once every worker has finished.
    #[default]
    Drain,
    /// Workers stop taking new pieces once any piece has failed.
    /// Pieces already in flight run to completion.
    AbortAll,
}

/// Moves the bytes of one piece
#[async_trait]
pub trait PieceWorker: Send + Sync {
    /// Transfer `piece`, returning the number of bytes moved
    async fn transfer(&self, piece: Piece) -> Result<u64>;
}

/// A piece that failed, with its error
#[derive(Debug)]
pub struct PieceFailure {
    pub index: usize,
    pub error: Error,
}

/// Pre-populated, closed queue of pieces
#[derive(Debug)]
struct PieceQueue {
    pieces: Vec<Piece>,
    next: AtomicUsize,
}

impl PieceQueue {
    fn new(pieces: Vec<Piece>) -> Self {
        Self {
            pieces,
            next: AtomicUsize::new(0),
        }
    }

    fn pop(&self) -> Option<Piece> {
        let index = self.next.fetch_add(1, Ordering::AcqRel);
        self.pieces.get(index).copied()
    }
}

/// Bounded-concurrency executor for a piece list
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
    policy: FailurePolicy,
}

impl WorkerPool {
    /// Create a pool with at least one worker
    pub fn new(concurrency: usize, policy: FailurePolicy) -> Self {
        Self {
            concurrency: concurrency.max(1),
            policy,
        }
    }

    /// Run every piece through `worker` and wait for all workers to exit
    ///
    /// Returns the failures in the order they were recorded.
    pub async fn run<W>(
        &self,
        pieces: Vec<Piece>,
        tracker: Arc<ProgressTracker>,
        worker: Arc<W>,
    ) -> Vec<PieceFailure>
    where
        W: PieceWorker + 'static,
    {
        let workers = self.concurrency.min(pieces.len());
        let queue = Arc::new(PieceQueue::new(pieces));
        let failures = Arc::new(Mutex::new(Vec::new()));
        let halted = Arc::new(AtomicBool::new(false));

        let mut set = JoinSet::new();
        for id in 0..workers {
            let ctx = WorkerContext {
                id,
                policy: self.policy,
                queue: Arc::clone(&queue),
                tracker: Arc::clone(&tracker),
                failures: Arc::clone(&failures),
                halted: Arc::clone(&halted),
            };
            let worker = Arc::clone(&worker);
            set.spawn(async move { ctx.drain(worker.as_ref()).await });
        }

        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("transfer worker terminated abnormally: {e}");
                lock(&failures).push(PieceFailure {
                    index: usize::MAX,
                    error: Error::General(format!("transfer worker terminated abnormally: {e}")),
                });
            }
        }

        std::mem::take(&mut *lock(&failures))
    }
}

struct WorkerContext {
    id: usize,
    policy: FailurePolicy,
    queue: Arc<PieceQueue>,
    tracker: Arc<ProgressTracker>,
    failures: Arc<Mutex<Vec<PieceFailure>>>,
    halted: Arc<AtomicBool>,
}

impl WorkerContext {
    async fn drain<W: PieceWorker + ?Sized>(&self, worker: &W) {
        loop {
            if self.policy == FailurePolicy::AbortAll && self.halted.load(Ordering::Acquire) {
                debug!(worker = self.id, "stopping after sibling failure");
                return;
            }
            let Some(piece) = self.queue.pop() else {
                return;
            };

            self.tracker.set_state(piece.index, PieceState::Active);
            debug!(
                worker = self.id,
                piece = piece.index,
                start = piece.start,
                end = piece.end,
                "piece started"
            );

            match worker.transfer(piece).await {
                Ok(bytes) => {
                    self.tracker.add_transferred(bytes);
                    self.tracker.set_state(piece.index, PieceState::Done);
                }
                Err(error) => {
                    self.tracker.set_state(piece.index, PieceState::Failed);
                    warn!(worker = self.id, piece = piece.index, "piece failed: {error}");
                    lock(&self.failures).push(PieceFailure {
                        index: piece.index,
                        error,
                    });
                    self.halted.store(true, Ordering::Release);
                    return;
                }
            }
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
