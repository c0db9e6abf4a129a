//! Destination chunks.
//!
//! A [`ChunkWriter`] owns one destination chunk while it is being written. The
//! read loop hands it one ready region per flush; each region is uploaded as
//! a block on its own tokio task. When the chunk is full (or the source is
//! exhausted) [`ChunkWriter::commit`] waits for every block, then commits the
//! block list in block-index order.
//!
//! Dropping a writer aborts its outstanding uploads, so a discarded session
//! leaves no tasks behind.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::OwnedSemaphorePermit;
use tokio::task::{JoinError, JoinHandle};

use crate::block::{BlockId, upload_block};
use crate::config::MAX_BLOCKS_PER_BLOB;
use crate::progress::ProgressReporter;
use crate::retry::{RetryPolicy, RetrySite, with_retry_notify};
use crate::store::{BlobRef, ObjectStore};
use crate::{Error, Result};

/// Returns the name of chunk `index`: `prefix`, the index zero-padded to six
/// digits, then `suffix`.
///
/// ```rust
/// use gzchunk::chunk::chunk_name;
///
/// assert_eq!(chunk_name("out/part-", 7, ".csv"), "out/part-000007.csv");
/// assert_eq!(chunk_name("", 1234567, ""), "1234567");
/// ```
pub fn chunk_name(prefix: &str, index: u32, suffix: &str) -> String {
    format!("{}{:06}{}", prefix, index, suffix)
}

/// A committed destination chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedChunk {
    /// Chunk index within the extraction.
    pub index: u32,
    /// Blob name.
    pub name: String,
    /// Number of blocks in the committed list.
    pub blocks: u32,
    /// Size in bytes.
    pub bytes: u64,
}

enum PendingBlock {
    Running(JoinHandle<Result<BlockId>>),
    Done(BlockId),
}

/// Writer for one destination chunk.
pub struct ChunkWriter {
    store: Arc<dyn ObjectStore>,
    blob: BlobRef,
    index: u32,
    bytes: u64,
    pending: Vec<PendingBlock>,
    progress: Arc<dyn ProgressReporter>,
}

impl ChunkWriter {
    /// Starts chunk `index` stored as `blob`.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        blob: BlobRef,
        index: u32,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            store,
            blob,
            index,
            bytes: 0,
            pending: Vec::new(),
            progress,
        }
    }

    /// The chunk's blob name.
    pub fn name(&self) -> &str {
        self.blob.name()
    }

    /// The chunk index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Index the next scheduled block will get.
    pub fn next_block_index(&self) -> u32 {
        // at most MAX_BLOCKS_PER_BLOB, see should_rollover
        self.pending.len() as u32
    }

    /// Bytes flushed into this chunk so far.
    pub fn bytes_in_chunk(&self) -> u64 {
        self.bytes
    }

    /// Returns `true` if no block has been scheduled.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Returns `true` once another buffer of `capacity` bytes could reach
    /// `limit`, or the chunk holds as many blocks as one blob may commit,
    /// meaning the chunk must be committed now.
    pub fn should_rollover(&self, capacity: usize, limit: u64) -> bool {
        self.bytes.saturating_add(capacity as u64) >= limit
            || self.pending.len() >= MAX_BLOCKS_PER_BLOB
    }

    /// Spawns the upload of `data` as the next block and returns its index.
    ///
    /// `permit` is held until the upload finishes, bounding the number of
    /// uploads (and buffers) in flight.
    pub fn schedule_block(
        &mut self,
        data: Vec<u8>,
        permit: OwnedSemaphorePermit,
        policy: &RetryPolicy,
    ) -> u32 {
        let index = self.next_block_index();
        self.bytes += data.len() as u64;

        let store = Arc::clone(&self.store);
        let blob = self.blob.clone();
        let policy = policy.clone();
        let progress = Arc::clone(&self.progress);
        let handle = tokio::spawn(async move {
            let _permit = permit;
            upload_block(store.as_ref(), &blob, index, &data, &policy, &progress).await
        });

        log::trace!("scheduled block {} of '{}'", index, self.blob);
        self.pending.push(PendingBlock::Running(handle));
        index
    }

    /// Collects finished uploads, returning the first failure.
    ///
    /// Lets the read loop stop early instead of discovering a failed block
    /// only at commit time.
    pub fn reap(&mut self) -> Result<()> {
        for (index, slot) in self.pending.iter_mut().enumerate() {
            let PendingBlock::Running(handle) = slot else {
                continue;
            };
            if !handle.is_finished() {
                continue;
            }
            let Some(joined) = handle.now_or_never() else {
                continue;
            };
            let id = finished_block(&self.blob, index as u32, joined)?;
            *slot = PendingBlock::Done(id);
        }
        Ok(())
    }

    /// Waits for every block, then commits the block list.
    pub async fn commit(mut self, policy: &RetryPolicy) -> Result<CommittedChunk> {
        for index in 0..self.pending.len() {
            if let PendingBlock::Running(handle) = &mut self.pending[index] {
                let joined = handle.await;
                let id = finished_block(&self.blob, index as u32, joined)?;
                self.pending[index] = PendingBlock::Done(id);
            }
        }

        let ids: Vec<BlockId> = self
            .pending
            .iter()
            .filter_map(|slot| match slot {
                PendingBlock::Done(id) => Some(id.clone()),
                PendingBlock::Running(_) => None,
            })
            .collect();

        let store = &self.store;
        let blob = &self.blob;
        let progress = &self.progress;
        with_retry_notify(
            RetrySite::PutBlockList,
            policy,
            || async {
                store
                    .put_block_list(blob, &ids)
                    .await
                    .map_err(Error::from)
            },
            |err, delay| progress.on_retry(RetrySite::PutBlockList, err, delay),
        )
        .await?;

        let committed = CommittedChunk {
            index: self.index,
            name: self.blob.name().to_string(),
            blocks: self.next_block_index(),
            bytes: self.bytes,
        };
        log::info!(
            "committed chunk '{}' ({} blocks, {} bytes)",
            self.blob,
            committed.blocks,
            committed.bytes
        );
        self.progress
            .on_chunk_committed(&committed.name, committed.blocks, committed.bytes);
        Ok(committed)
    }
}

impl Drop for ChunkWriter {
    fn drop(&mut self) {
        for slot in &self.pending {
            if let PendingBlock::Running(handle) = slot {
                handle.abort();
            }
        }
    }
}

fn finished_block(
    blob: &BlobRef,
    index: u32,
    joined: std::result::Result<Result<BlockId>, JoinError>,
) -> Result<BlockId> {
    match joined {
        Ok(result) => result,
        Err(err) => Err(Error::UploadTask {
            chunk: blob.name().to_string(),
            block_index: index,
            reason: if err.is_panic() {
                "upload task panicked".to_string()
            } else {
                "upload task was cancelled".to_string()
            },
        }),
    }
}
