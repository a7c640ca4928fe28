//! Progress rendering for transfers
//!
//! The engine samples its own progress and hands snapshots to a callback.
//! This module turns those snapshots into an indicatif bar whose message
//! shows speed, ETA and how many pieces are waiting, active, done or failed.

use std::sync::Arc;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use sc_core::{ProgressCallback, ProgressSnapshot, StateHistogram};

use super::OutputConfig;

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";

/// Progress bar driven by engine snapshots
///
/// Hidden in quiet, JSON or no-progress mode.
#[derive(Debug)]
pub struct TransferProgress {
    bar: Option<ProgressBar>,
}

impl TransferProgress {
    /// Create a bar for a transfer of `total` bytes
    pub fn new(config: &OutputConfig, total: u64, label: &str) -> Self {
        let bar = config.show_progress().then(|| {
            let style = ProgressStyle::default_bar()
                .template(BAR_TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-");
            let bar = ProgressBar::new(total);
            bar.set_style(style);
            bar.set_prefix(label.to_string());
            bar
        });

        Self { bar }
    }

    /// Check if progress bar is visible
    pub fn is_visible(&self) -> bool {
        self.bar.is_some()
    }

    /// Callback to hand to the engine, if the bar is visible
    pub fn callback(&self) -> Option<ProgressCallback> {
        let bar = self.bar.clone()?;
        let callback: ProgressCallback = Arc::new(move |snapshot: ProgressSnapshot| {
            bar.set_length(snapshot.total_bytes);
            bar.set_position(snapshot.transferred_bytes);
            bar.set_message(snapshot_message(&snapshot));
        });
        Some(callback)
    }

    /// Finish and clear the progress bar
    pub fn finish_and_clear(&self) {
        if let Some(bar) = &self.bar {
            bar.finish_and_clear();
        }
    }
}

/// Human-readable binary size, e.g. `1.50 MiB`
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

/// Compact duration: `1h02m03s`, `4m05s` or `7s`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs % 3600 / 60, secs % 60);
    if hours > 0 {
        format!("{hours}h{minutes:02}m{seconds:02}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}

/// Mean throughput of a finished transfer in bytes per second
pub fn average_speed(bytes: u64, elapsed: Duration) -> u64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        (bytes as f64 / secs) as u64
    } else {
        0
    }
}

/// Piece state counts, e.g. `waiting 3, active 2, done 5, failed 0`
pub fn histogram_message(histogram: &StateHistogram) -> String {
    format!(
        "waiting {}, active {}, done {}, failed {}",
        histogram.waiting, histogram.active, histogram.done, histogram.failed
    )
}

fn snapshot_message(snapshot: &ProgressSnapshot) -> String {
    let eta = snapshot
        .eta
        .map(format_duration)
        .unwrap_or_else(|| "--".to_string());
    format!(
        "{}/s ETA {eta} ({})",
        format_size(snapshot.speed_bytes_per_sec as u64),
        histogram_message(&snapshot.histogram)
    )
}
