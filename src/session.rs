//! Extraction sessions.
//!
//! [`Extractor::run`] streams one compressed source blob into a sequence of
//! destination chunks. The work of one pass over the source happens in an
//! [`ExtractionSession`]:
//!
//! 1. open the source and wrap it in a decompressor
//! 2. fill a fixed-capacity buffer until it is full or the source ends
//! 3. cut the buffer after its last delimiter and upload the ready region as
//!    the next block of the current chunk, carrying the tail over
//! 4. once the chunk is full, wait for its blocks and commit it
//!
//! A transient error during the pass (a throttled read, a timed out stream)
//! discards the session with everything it has counted, and a new session
//! starts again from the first source byte. Block identifiers depend only on
//! the chunk name and block index, so the new session overwrites what the old
//! one staged.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use gzchunk::config::ExtractConfig;
//! use gzchunk::session::Extractor;
//! use gzchunk::store::BlobRef;
//! use gzchunk::store::memory::MemoryStore;
//! use gzchunk::codec::Compression;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> gzchunk::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let source = BlobRef::new("in", "data.csv");
//! store.insert(&source, b"a,1\nb,2\nc,3\n".to_vec());
//!
//! let config = ExtractConfig::new("out", "part-", ".csv", 8)
//!     .compression(Compression::None);
//! let summary = Extractor::new(store.clone(), store.clone(), config)?
//!     .run(&source)
//!     .await?;
//!
//! assert_eq!(summary.total_bytes, 12);
//! assert_eq!(summary.chunks.len(), 2);
//! assert_eq!(store.get(&BlobRef::new("out", "part-000000.csv")).unwrap(), b"a,1\nb,2\n");
//! assert_eq!(store.get(&BlobRef::new("out", "part-000001.csv")).unwrap(), b"c,3\n");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Semaphore;

use crate::buffer::{OutputBuffer, at_end_of_stream};
use crate::chunk::{ChunkWriter, CommittedChunk, chunk_name};
use crate::codec;
use crate::config::{ExtractConfig, NoDelimiterPolicy};
use crate::progress::{NoProgress, ProgressReporter};
use crate::retry::{RetrySite, with_retry_notify};
use crate::store::{BlobRef, ObjectStore};
use crate::{Error, Result};

/// Outcome of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    /// Decompressed bytes written.
    pub total_bytes: u64,
    /// Compressed bytes read.
    pub compressed_bytes: u64,
    /// Committed chunks in index order.
    pub chunks: Vec<CommittedChunk>,
    /// Number of whole-session restarts.
    pub restarts: u32,
}

impl ExtractSummary {
    /// Total number of blocks in the committed chunks.
    pub fn blocks(&self) -> u64 {
        self.chunks.iter().map(|c| u64::from(c.blocks)).sum()
    }

    /// Names of the committed chunks in index order.
    pub fn chunk_names(&self) -> impl Iterator<Item = &str> {
        self.chunks.iter().map(|c| c.name.as_str())
    }
}

/// Splits compressed source blobs into line-aligned destination chunks.
pub struct Extractor {
    source: Arc<dyn ObjectStore>,
    dest: Arc<dyn ObjectStore>,
    config: ExtractConfig,
    progress: Arc<dyn ProgressReporter>,
}

impl Extractor {
    /// Creates an extractor reading from `source` and writing to `dest`.
    ///
    /// Fails if `config` does not validate.
    pub fn new(
        source: Arc<dyn ObjectStore>,
        dest: Arc<dyn ObjectStore>,
        config: ExtractConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            dest,
            config,
            progress: Arc::new(NoProgress),
        })
    }

    /// Sets the progress reporter.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    /// Extracts `source_blob`, restarting the whole session on transient
    /// errors as allowed by the configured restart policy.
    pub async fn run(&self, source_blob: &BlobRef) -> Result<ExtractSummary> {
        let uploads = Arc::new(Semaphore::new(self.config.client.max_concurrent_uploads));
        let mut restarts = 0u32;

        let result = with_retry_notify(
            RetrySite::ReadLoop,
            &self.config.restart_retry,
            || ExtractionSession::new(self, Arc::clone(&uploads)).run(source_blob),
            |err, delay| {
                restarts += 1;
                log::info!(
                    "discarding session for '{}', restart {} from the first byte in {:?}: {}",
                    source_blob,
                    restarts,
                    delay,
                    err
                );
                self.progress.on_session_restart(restarts, err, delay);
            },
        )
        .await;

        match result {
            Ok(mut summary) => {
                summary.restarts = restarts;
                log::info!(
                    "extracted '{}': {} bytes into {} chunks ({} restarts)",
                    source_blob,
                    summary.total_bytes,
                    summary.chunks.len(),
                    summary.restarts
                );
                Ok(summary)
            }
            Err(err) => {
                log::error!("extraction of '{}' failed: {}", source_blob, err);
                Err(err)
            }
        }
    }
}

/// One pass over the source.
///
/// Owns the counters that a restart throws away. Created and consumed by
/// [`Extractor::run`].
pub struct ExtractionSession<'a> {
    extractor: &'a Extractor,
    uploads: Arc<Semaphore>,
    total_bytes: u64,
    chunk_index: u32,
    chunks: Vec<CommittedChunk>,
}

impl<'a> ExtractionSession<'a> {
    /// Creates a session with zeroed counters.
    pub fn new(extractor: &'a Extractor, uploads: Arc<Semaphore>) -> Self {
        Self {
            extractor,
            uploads,
            total_bytes: 0,
            chunk_index: 0,
            chunks: Vec::new(),
        }
    }

    /// Runs the pass to completion.
    pub async fn run(mut self, source_blob: &BlobRef) -> Result<ExtractSummary> {
        let extractor = self.extractor;
        let config = &extractor.config;
        let capacity = config.buffer_capacity();
        log::info!(
            "extracting {} '{}' into '{}/{}NNNNNN{}' (limit {} bytes, buffer {} bytes)",
            config.compression.name(),
            source_blob,
            config.container,
            config.prefix,
            config.suffix,
            config.chunk_size_limit,
            capacity
        );

        let raw = extractor.source.open_read(source_blob).await?;
        let compressed = Arc::new(AtomicU64::new(0));
        let mut reader = codec::decompress(raw, config.compression, Arc::clone(&compressed));

        let mut buffer = OutputBuffer::new(capacity);
        let mut writer = self.open_chunk();

        loop {
            let outcome = buffer.fill(&mut reader).await?;
            self.total_bytes += outcome.bytes_read as u64;
            extractor
                .progress
                .on_bytes_decompressed(self.total_bytes, compressed.load(Ordering::Relaxed));
            writer.reap()?;

            if outcome.eof {
                let ready = buffer.into_ready();
                if !ready.is_empty() {
                    self.flush(&mut writer, ready).await?;
                }
                if !writer.is_empty() {
                    self.chunks.push(writer.commit(&config.commit_retry).await?);
                }
                break;
            }

            let ready = match buffer.split(config.delimiter) {
                Ok((ready, carry_over)) => {
                    buffer = carry_over;
                    ready
                }
                Err(full) => match config.no_delimiter {
                    NoDelimiterPolicy::Fail => {
                        if !at_end_of_stream(&mut reader).await? {
                            return Err(Error::DelimiterNotFound {
                                chunk: writer.name().to_string(),
                                block_index: writer.next_block_index(),
                                capacity,
                                delimiter: config.delimiter,
                            });
                        }
                        // unterminated last line of exactly `capacity` bytes
                        self.flush(&mut writer, full.into_ready()).await?;
                        self.chunks.push(writer.commit(&config.commit_retry).await?);
                        break;
                    }
                    NoDelimiterPolicy::SplitAtCapacity => {
                        log::warn!(
                            "no delimiter in {} bytes, splitting a line at block {} of '{}'",
                            capacity,
                            writer.next_block_index(),
                            writer.name()
                        );
                        buffer = OutputBuffer::new(capacity);
                        full.into_ready()
                    }
                },
            };

            self.flush(&mut writer, ready).await?;
            if writer.should_rollover(capacity, config.chunk_size_limit) {
                let next = self.open_chunk();
                let full = std::mem::replace(&mut writer, next);
                self.chunks.push(full.commit(&config.commit_retry).await?);
            }
        }

        Ok(ExtractSummary {
            total_bytes: self.total_bytes,
            compressed_bytes: compressed.load(Ordering::Relaxed),
            chunks: self.chunks,
            restarts: 0,
        })
    }

    fn open_chunk(&mut self) -> ChunkWriter {
        let config = &self.extractor.config;
        let index = self.chunk_index;
        self.chunk_index += 1;
        let name = chunk_name(&config.prefix, index, &config.suffix);
        log::debug!("starting chunk '{}'", name);
        ChunkWriter::new(
            Arc::clone(&self.extractor.dest),
            BlobRef::new(config.container.clone(), name),
            index,
            Arc::clone(&self.extractor.progress),
        )
    }

    async fn flush(&self, writer: &mut ChunkWriter, ready: Vec<u8>) -> Result<()> {
        let permit = Arc::clone(&self.uploads)
            .acquire_owned()
            .await
            .map_err(|_| Error::UploadTask {
                chunk: writer.name().to_string(),
                block_index: writer.next_block_index(),
                reason: "upload slots were closed".to_string(),
            })?;
        writer.schedule_block(ready, permit, &self.extractor.config.upload_retry);
        Ok(())
    }
}
