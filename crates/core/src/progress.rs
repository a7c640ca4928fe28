//! Transfer progress tracking
//!
//! [`ProgressTracker`] is shared by every worker of a transfer. Piece states
//! and the transferred-byte counter are atomics so workers never contend on
//! a lock; only the speed window used by the sampler sits behind a mutex.
//!
//! [`ProgressSampler`] is a background task that periodically turns the
//! tracker into a [`ProgressSnapshot`] and hands it to a callback. It only
//! reads shared state.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Cadence at which the sampler produces snapshots
pub const SAMPLE_INTERVAL: Duration = Duration::from_millis(150);

/// Minimum time between two speed recomputations
pub const SPEED_WINDOW: Duration = Duration::from_millis(500);

/// Callback receiving progress snapshots
pub type ProgressCallback = Arc<dyn Fn(ProgressSnapshot) + Send + Sync>;

/// Lifecycle state of one piece
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PieceState {
    Waiting = 0,
    Active = 1,
    Done = 2,
    Failed = 3,
}

impl PieceState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => PieceState::Active,
            2 => PieceState::Done,
            3 => PieceState::Failed,
            _ => PieceState::Waiting,
        }
    }
}

/// Number of pieces in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateHistogram {
    pub waiting: usize,
    pub active: usize,
    pub done: usize,
    pub failed: usize,
}

impl StateHistogram {
    /// Total number of pieces counted
    pub fn total(&self) -> usize {
        self.waiting + self.active + self.done + self.failed
    }
}

/// Point-in-time view of a transfer
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSnapshot {
    pub transferred_bytes: u64,
    pub total_bytes: u64,
    /// Completion percentage in `[0, 100]`
    pub percent: f64,
    /// Bytes per second over the last speed window
    pub speed_bytes_per_sec: f64,
    /// Remaining time, unknown until a non-zero speed has been observed
    pub eta: Option<Duration>,
    pub elapsed: Duration,
    pub histogram: StateHistogram,
}

#[derive(Debug)]
struct SpeedWindow {
    last_bytes: u64,
    last_at: Instant,
    speed: f64,
}

/// Shared per-transfer progress state
#[derive(Debug)]
pub struct ProgressTracker {
    states: Box<[AtomicU8]>,
    transferred: AtomicU64,
    total_bytes: u64,
    started: Instant,
    window: Mutex<SpeedWindow>,
}

impl ProgressTracker {
    /// Create a tracker with every piece in the `Waiting` state
    pub fn new(piece_count: usize, total_bytes: u64) -> Self {
        let started = Instant::now();
        Self {
            states: (0..piece_count)
                .map(|_| AtomicU8::new(PieceState::Waiting as u8))
                .collect(),
            transferred: AtomicU64::new(0),
            total_bytes,
            started,
            window: Mutex::new(SpeedWindow {
                last_bytes: 0,
                last_at: started,
                speed: 0.0,
            }),
        }
    }

    /// Number of tracked pieces
    pub fn piece_count(&self) -> usize {
        self.states.len()
    }

    /// Total bytes of the transfer
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Instant the tracker was created
    pub fn started_at(&self) -> Instant {
        self.started
    }

    /// Record a state transition for one piece
    ///
    /// Each piece is owned by exactly one worker, so stores never race on the
    /// same entry.
    pub fn set_state(&self, index: usize, state: PieceState) {
        self.states[index].store(state as u8, Ordering::Release);
    }

    /// Current state of one piece
    pub fn state(&self, index: usize) -> PieceState {
        PieceState::from_u8(self.states[index].load(Ordering::Acquire))
    }

    /// Copy of every piece state, by index
    pub fn states(&self) -> Vec<PieceState> {
        (0..self.states.len()).map(|i| self.state(i)).collect()
    }

    /// Add completed bytes, returning the new total
    pub fn add_transferred(&self, bytes: u64) -> u64 {
        let total = self.transferred.fetch_add(bytes, Ordering::AcqRel) + bytes;
        debug_assert!(total <= self.total_bytes, "transferred bytes exceed object size");
        total
    }

    /// Bytes transferred so far
    pub fn transferred(&self) -> u64 {
        self.transferred.load(Ordering::Acquire)
    }

    /// Count pieces per state
    pub fn histogram(&self) -> StateHistogram {
        let mut histogram = StateHistogram::default();
        for state in &self.states {
            match PieceState::from_u8(state.load(Ordering::Acquire)) {
                PieceState::Waiting => histogram.waiting += 1,
                PieceState::Active => histogram.active += 1,
                PieceState::Done => histogram.done += 1,
                PieceState::Failed => histogram.failed += 1,
            }
        }
        histogram
    }

    /// Snapshot the transfer as of now
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.snapshot_at(Instant::now())
    }

    /// Snapshot the transfer as of `now`
    ///
    /// Speed is only recomputed once at least [`SPEED_WINDOW`] has passed
    /// since the previous recomputation; otherwise the last value is reused.
    pub fn snapshot_at(&self, now: Instant) -> ProgressSnapshot {
        let transferred = self.transferred();

        let speed = {
            let mut window = match self.window.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let elapsed = now.saturating_duration_since(window.last_at);
            if elapsed >= SPEED_WINDOW {
                let delta = transferred.saturating_sub(window.last_bytes);
                window.speed = delta as f64 / elapsed.as_secs_f64();
                window.last_bytes = transferred;
                window.last_at = now;
            }
            window.speed
        };

        let percent = if self.total_bytes == 0 {
            100.0
        } else {
            (transferred as f64 / self.total_bytes as f64 * 100.0).clamp(0.0, 100.0)
        };

        let eta = (speed > 0.0).then(|| {
            let remaining = self.total_bytes.saturating_sub(transferred);
            Duration::from_secs_f64(remaining as f64 / speed)
        });

        ProgressSnapshot {
            transferred_bytes: transferred,
            total_bytes: self.total_bytes,
            percent,
            speed_bytes_per_sec: speed,
            eta,
            elapsed: now.saturating_duration_since(self.started),
            histogram: self.histogram(),
        }
    }
}

/// Background task feeding snapshots to a callback
#[derive(Debug)]
pub struct ProgressSampler {
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl ProgressSampler {
    /// Start sampling `tracker` every `interval`
    pub fn start(
        tracker: Arc<ProgressTracker>,
        callback: ProgressCallback,
        interval: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => callback(tracker.snapshot()),
                    _ = &mut stopped => {
                        callback(tracker.snapshot());
                        break;
                    }
                }
            }
        });

        Self {
            stop: Some(stop),
            handle,
        }
    }

    /// Stop sampling after emitting one final snapshot
    pub async fn finish(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!("progress sampler task failed: {e}");
        }
    }
}
