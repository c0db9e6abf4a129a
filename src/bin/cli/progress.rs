//! Progress display for CLI operations.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use gzchunk::progress::{ProgressReporter, format_bytes_iec, format_duration};
use gzchunk::{Error, RetrySite};

/// Spinner showing decompressed bytes and the last committed chunk
pub struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    /// Creates a new progress display
    pub fn new(quiet: bool) -> Self {
        let bar = if quiet {
            ProgressBar::hidden()
        } else {
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::with_template(
                "{spinner:.green} [{elapsed_precise}] {bytes} decompressed ({bytes_per_sec}) {wide_msg}",
            ) {
                pb.set_style(style);
            }
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        };

        Self { bar }
    }

    /// Finishes and removes the display
    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }

    /// Stops the display, leaving a message
    pub fn abandon_with_message(&self, msg: impl Into<String>) {
        self.bar.abandon_with_message(msg.into());
    }
}

impl ProgressReporter for CliProgress {
    fn on_bytes_decompressed(&self, total_bytes: u64, _compressed_bytes: u64) {
        self.bar.set_position(total_bytes);
    }

    fn on_chunk_committed(&self, chunk: &str, blocks: u32, bytes: u64) {
        self.bar.set_message(format!(
            "committed {} ({} blocks, {})",
            chunk,
            blocks,
            format_bytes_iec(bytes)
        ));
    }

    fn on_retry(&self, site: RetrySite, _error: &Error, delay: Duration) {
        self.bar
            .set_message(format!("{} throttled, retrying in {}", site, format_duration(delay)));
    }

    fn on_session_restart(&self, restart: u32, _error: &Error, delay: Duration) {
        self.bar.set_position(0);
        self.bar.set_message(format!(
            "restart {} from the first byte in {}",
            restart,
            format_duration(delay)
        ));
    }
}
