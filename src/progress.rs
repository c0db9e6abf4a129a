//! Progress reporting for extractions.
//!
//! An extraction reports what it does through a [`ProgressReporter`]. Hooks
//! take `&self` because block uploads run on concurrent tasks and share one
//! reporter; implementations use interior mutability.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gzchunk::progress::{AtomicProgress, ProgressReporter};
//!
//! let progress = AtomicProgress::shared();
//! let reporter: Arc<dyn ProgressReporter> = progress.clone();
//! reporter.on_block_uploaded("part000000.csv", 0, 4096);
//! assert_eq!(progress.blocks_uploaded(), 1);
//! assert_eq!(progress.uploaded_bytes(), 4096);
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::Error;
use crate::retry::RetrySite;

const BYTES_KB: f64 = 1024.0;
const BYTES_MB: f64 = BYTES_KB * 1024.0;
const BYTES_GB: f64 = BYTES_MB * 1024.0;

/// Observer of extraction progress.
///
/// All hooks have empty default implementations.
pub trait ProgressReporter: Send + Sync {
    /// Called after every read from the decompressed stream with running
    /// totals for the current session.
    fn on_bytes_decompressed(&self, total_bytes: u64, compressed_bytes: u64) {
        let _ = (total_bytes, compressed_bytes);
    }

    /// Called when block `index` of `chunk` has been staged.
    fn on_block_uploaded(&self, chunk: &str, index: u32, bytes: u64) {
        let _ = (chunk, index, bytes);
    }

    /// Called when `chunk` has been committed with `blocks` blocks.
    fn on_chunk_committed(&self, chunk: &str, blocks: u32, bytes: u64) {
        let _ = (chunk, blocks, bytes);
    }

    /// Called when a transient error is about to be retried at `site`.
    fn on_retry(&self, site: RetrySite, error: &Error, delay: Duration) {
        let _ = (site, error, delay);
    }

    /// Called when the whole session is thrown away and will restart from the
    /// first source byte after `delay`. `restart` counts from 1.
    fn on_session_restart(&self, restart: u32, error: &Error, delay: Duration) {
        let _ = (restart, error, delay);
    }
}

/// A progress reporter that does nothing (null object pattern).
#[derive(Debug, Default, Clone)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {}

/// A thread-safe progress reporter using atomics.
///
/// Allows progress to be monitored from another task or thread.
#[derive(Debug)]
pub struct AtomicProgress {
    decompressed_bytes: AtomicU64,
    compressed_bytes: AtomicU64,
    blocks_uploaded: AtomicU64,
    uploaded_bytes: AtomicU64,
    chunks_committed: AtomicU64,
    retries: AtomicU64,
    restarts: AtomicU64,
}

impl Default for AtomicProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomicProgress {
    /// Creates a new atomic progress reporter.
    pub fn new() -> Self {
        Self {
            decompressed_bytes: AtomicU64::new(0),
            compressed_bytes: AtomicU64::new(0),
            blocks_uploaded: AtomicU64::new(0),
            uploaded_bytes: AtomicU64::new(0),
            chunks_committed: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
        }
    }

    /// Creates a shared atomic progress reporter.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Decompressed bytes read in the current session.
    pub fn decompressed_bytes(&self) -> u64 {
        self.decompressed_bytes.load(Ordering::Relaxed)
    }

    /// Compressed bytes consumed in the current session.
    pub fn compressed_bytes(&self) -> u64 {
        self.compressed_bytes.load(Ordering::Relaxed)
    }

    /// Blocks staged, counting re-uploads after a restart.
    pub fn blocks_uploaded(&self) -> u64 {
        self.blocks_uploaded.load(Ordering::Relaxed)
    }

    /// Bytes staged, counting re-uploads after a restart.
    pub fn uploaded_bytes(&self) -> u64 {
        self.uploaded_bytes.load(Ordering::Relaxed)
    }

    /// Chunks committed.
    pub fn chunks_committed(&self) -> u64 {
        self.chunks_committed.load(Ordering::Relaxed)
    }

    /// Retries of individual operations.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Whole-session restarts.
    pub fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }
}

impl ProgressReporter for AtomicProgress {
    fn on_bytes_decompressed(&self, total_bytes: u64, compressed_bytes: u64) {
        self.decompressed_bytes.store(total_bytes, Ordering::Relaxed);
        self.compressed_bytes
            .store(compressed_bytes, Ordering::Relaxed);
    }

    fn on_block_uploaded(&self, _chunk: &str, _index: u32, bytes: u64) {
        self.blocks_uploaded.fetch_add(1, Ordering::Relaxed);
        self.uploaded_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    fn on_chunk_committed(&self, _chunk: &str, _blocks: u32, _bytes: u64) {
        self.chunks_committed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_retry(&self, _site: RetrySite, _error: &Error, _delay: Duration) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    fn on_session_restart(&self, _restart: u32, _error: &Error, _delay: Duration) {
        self.restarts.fetch_add(1, Ordering::Relaxed);
    }
}

/// Formats a duration as a human-readable string.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Formats bytes as a human-readable string using IEC units (KiB, MiB, GiB).
///
/// ```rust
/// use gzchunk::progress::format_bytes_iec;
///
/// assert_eq!(format_bytes_iec(512), "512 B");
/// assert_eq!(format_bytes_iec(1536), "1.5 KiB");
/// assert_eq!(format_bytes_iec(100 * 1024 * 1024), "100.0 MiB");
/// ```
pub fn format_bytes_iec(bytes: u64) -> String {
    let bytes_f64 = bytes as f64;
    if bytes_f64 < BYTES_KB {
        format!("{} B", bytes)
    } else if bytes_f64 < BYTES_MB {
        format!("{:.1} KiB", bytes_f64 / BYTES_KB)
    } else if bytes_f64 < BYTES_GB {
        format!("{:.1} MiB", bytes_f64 / BYTES_MB)
    } else {
        format!("{:.1} GiB", bytes_f64 / BYTES_GB)
    }
}
