//! In-memory object store.
//!
//! [`MemoryStore`] keeps committed blobs and staged blocks in hash maps. It
//! enforces the same rules a block-blob service does (checksum verification on
//! upload, staged-only block lists, staged blocks discarded on commit) and can
//! be scripted to fail specific operations, which makes it the backbone of
//! the crate's tests.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, ReadBuf};

use super::{BlobRef, ByteSource, ObjectStore, StoreOp, StoreResult};
use crate::block::{BlockId, ContentMd5};
use crate::config::MAX_BLOCKS_PER_BLOB;
use crate::error::{ErrorCode, StorageError};

/// Acquires a mutex lock, recovering from poisoned state if necessary.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("MemoryStore mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Call counters of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Number of `open_read` calls.
    pub open_read_calls: u64,
    /// Number of `put_block` calls.
    pub put_block_calls: u64,
    /// Number of `put_block_list` calls.
    pub put_block_list_calls: u64,
    /// Number of calls failed by injection.
    pub injected_failures: u64,
}

#[derive(Default)]
struct State {
    committed: HashMap<BlobRef, Arc<Vec<u8>>>,
    committed_blocks: HashMap<BlobRef, Vec<(BlockId, Vec<u8>)>>,
    staged: HashMap<BlobRef, HashMap<BlockId, Vec<u8>>>,
}

#[derive(Default)]
struct Faults {
    next: HashMap<StoreOp, VecDeque<ErrorCode>>,
    read_after: VecDeque<(usize, ErrorCode)>,
}

/// An in-memory block-blob store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    faults: Mutex<Faults>,
    stats: Mutex<MemoryStoreStats>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` as the committed content of `blob`.
    pub fn insert(&self, blob: &BlobRef, data: impl Into<Vec<u8>>) {
        let mut state = lock_or_recover(&self.state);
        state.committed.insert(blob.clone(), Arc::new(data.into()));
        state.committed_blocks.remove(blob);
    }

    /// Returns the committed content of `blob`.
    pub fn get(&self, blob: &BlobRef) -> Option<Vec<u8>> {
        lock_or_recover(&self.state)
            .committed
            .get(blob)
            .map(|data| data.as_ref().clone())
    }

    /// Returns the committed blocks of `blob` in list order.
    pub fn committed_blocks(&self, blob: &BlobRef) -> Option<Vec<(BlockId, Vec<u8>)>> {
        lock_or_recover(&self.state)
            .committed_blocks
            .get(blob)
            .cloned()
    }

    /// Returns the bytes of a staged, not yet committed, block.
    pub fn staged_block(&self, blob: &BlobRef, block_id: &BlockId) -> Option<Vec<u8>> {
        lock_or_recover(&self.state)
            .staged
            .get(blob)
            .and_then(|blocks| blocks.get(block_id))
            .cloned()
    }

    /// Returns the number of staged blocks of `blob`.
    pub fn staged_block_count(&self, blob: &BlobRef) -> usize {
        lock_or_recover(&self.state)
            .staged
            .get(blob)
            .map_or(0, HashMap::len)
    }

    /// Lists committed blobs of `container` whose names start with `prefix`,
    /// sorted by name.
    pub fn list(&self, container: &str, prefix: &str) -> Vec<(String, Vec<u8>)> {
        let state = lock_or_recover(&self.state);
        let mut blobs: Vec<_> = state
            .committed
            .iter()
            .filter(|(blob, _)| blob.container() == container && blob.name().starts_with(prefix))
            .map(|(blob, data)| (blob.name().to_string(), data.as_ref().clone()))
            .collect();
        blobs.sort_by(|a, b| a.0.cmp(&b.0));
        blobs
    }

    /// Makes the next call of `op` fail with `code`. Calls queue up.
    pub fn fail_next(&self, op: StoreOp, code: ErrorCode) {
        lock_or_recover(&self.faults)
            .next
            .entry(op)
            .or_default()
            .push_back(code);
    }

    /// Makes the next opened read stream fail with `code` after delivering
    /// `bytes` bytes.
    pub fn fail_read_after(&self, bytes: usize, code: ErrorCode) {
        lock_or_recover(&self.faults)
            .read_after
            .push_back((bytes, code));
    }

    /// Returns the call counters.
    pub fn stats(&self) -> MemoryStoreStats {
        lock_or_recover(&self.stats).clone()
    }

    fn record(&self, op: StoreOp) -> StoreResult<()> {
        let injected = lock_or_recover(&self.faults)
            .next
            .get_mut(&op)
            .and_then(VecDeque::pop_front);

        let mut stats = lock_or_recover(&self.stats);
        match op {
            StoreOp::OpenRead => stats.open_read_calls += 1,
            StoreOp::PutBlock => stats.put_block_calls += 1,
            StoreOp::PutBlockList => stats.put_block_list_calls += 1,
        }

        match injected {
            Some(code) => {
                stats.injected_failures += 1;
                Err(StorageError::new(code, format!("injected {:?} failure", op)))
            }
            None => Ok(()),
        }
    }

    fn open(&self, blob: &BlobRef) -> StoreResult<ByteSource> {
        self.record(StoreOp::OpenRead)?;
        let data = lock_or_recover(&self.state)
            .committed
            .get(blob)
            .cloned()
            .ok_or_else(|| StorageError::new(ErrorCode::BlobNotFound, format!("{} not found", blob)))?;
        let fail_at = lock_or_recover(&self.faults).read_after.pop_front();
        Ok(Box::new(MemoryReader {
            data,
            pos: 0,
            fail_at,
        }))
    }

    fn stage(
        &self,
        blob: &BlobRef,
        block_id: &BlockId,
        data: &[u8],
        checksum: &ContentMd5,
    ) -> StoreResult<()> {
        self.record(StoreOp::PutBlock)?;
        if ContentMd5::compute(data) != *checksum {
            return Err(StorageError::new(
                ErrorCode::Md5Mismatch,
                format!("checksum mismatch for block {} of {}", block_id, blob),
            ));
        }
        lock_or_recover(&self.state)
            .staged
            .entry(blob.clone())
            .or_default()
            .insert(block_id.clone(), data.to_vec());
        Ok(())
    }

    fn commit(&self, blob: &BlobRef, block_ids: &[BlockId]) -> StoreResult<()> {
        self.record(StoreOp::PutBlockList)?;
        if block_ids.len() > MAX_BLOCKS_PER_BLOB {
            return Err(StorageError::new(
                ErrorCode::Other("BlockCountExceedsLimit".to_string()),
                format!("{} blocks listed for {}", block_ids.len(), blob),
            ));
        }
        let mut state = lock_or_recover(&self.state);

        let staged = state.staged.get(blob);
        let mut blocks = Vec::with_capacity(block_ids.len());
        for id in block_ids {
            let data = staged.and_then(|s| s.get(id)).ok_or_else(|| {
                StorageError::new(
                    ErrorCode::InvalidBlockList,
                    format!("block {} of {} was never staged", id, blob),
                )
            })?;
            blocks.push((id.clone(), data.clone()));
        }

        let content: Vec<u8> = blocks.iter().flat_map(|(_, data)| data.iter().copied()).collect();
        state.staged.remove(blob);
        state.committed.insert(blob.clone(), Arc::new(content));
        state.committed_blocks.insert(blob.clone(), blocks);
        Ok(())
    }
}

impl ObjectStore for MemoryStore {
    fn open_read<'a>(&'a self, blob: &'a BlobRef) -> BoxFuture<'a, StoreResult<ByteSource>> {
        Box::pin(async move { self.open(blob) })
    }

    fn put_block<'a>(
        &'a self,
        blob: &'a BlobRef,
        block_id: &'a BlockId,
        data: &'a [u8],
        checksum: &'a ContentMd5,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.stage(blob, block_id, data, checksum) })
    }

    fn put_block_list<'a>(
        &'a self,
        blob: &'a BlobRef,
        block_ids: &'a [BlockId],
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.commit(blob, block_ids) })
    }
}

/// Read stream over a committed blob, optionally failing part way.
struct MemoryReader {
    data: Arc<Vec<u8>>,
    pos: usize,
    fail_at: Option<(usize, ErrorCode)>,
}

impl AsyncRead for MemoryReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut end = self.data.len();
        if let Some((at, code)) = &self.fail_at {
            if self.pos >= *at {
                let err = StorageError::new(code.clone(), "injected read failure");
                return Poll::Ready(Err(err.into_io()));
            }
            end = end.min(*at);
        }

        let n = (end - self.pos).min(buf.remaining());
        let start = self.pos;
        buf.put_slice(&self.data[start..start + n]);
        self.pos += n;
        Poll::Ready(Ok(()))
    }
}
