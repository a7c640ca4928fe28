//! Output formatting utilities
//!
//! This module provides formatters for CLI output in both human-readable
//! and JSON formats, and renders transfer progress.

mod formatter;
mod progress;

pub use formatter::Formatter;
pub use progress::{
    TransferProgress, average_speed, format_duration, format_size, histogram_message,
};

/// Output configuration derived from CLI flags and the config file
#[derive(Debug, Clone, Default)]
pub struct OutputConfig {
    /// Use JSON output format
    pub json: bool,
    /// Disable colored output
    pub no_color: bool,
    /// Disable progress bar
    pub no_progress: bool,
    /// Suppress non-error output
    pub quiet: bool,
}

impl OutputConfig {
    /// Whether a live progress bar may be drawn
    pub fn show_progress(&self) -> bool {
        !(self.quiet || self.json || self.no_progress)
    }
}
