//! Block addressing, integrity checksums and block upload.
//!
//! A block is identified by a [`BlockId`] derived only from the chunk name and
//! the block's index within the chunk. Uploading the same block twice (after a
//! transient failure, or after a whole-session restart) therefore overwrites
//! the staged block in place instead of creating a new one.

use std::fmt;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::Md5;
use sha2::{Digest, Sha384};

use crate::progress::ProgressReporter;
use crate::retry::{RetryPolicy, RetrySite, with_retry_notify};
use crate::store::{BlobRef, ObjectStore};
use crate::{Error, Result};

/// Deterministic identifier of a block within a chunk.
///
/// The identifier is the base64 encoding of the SHA-384 digest of the chunk
/// name followed by the decimal block index. All identifiers have the same
/// length (64 characters), as block-blob services require.
///
/// ```rust
/// use gzchunk::block::BlockId;
///
/// let a = BlockId::derive("part-000000.csv", 3);
/// let b = BlockId::derive("part-000000.csv", 3);
/// assert_eq!(a, b);
/// assert_ne!(a, BlockId::derive("part-000000.csv", 4));
/// assert_eq!(a.as_str().len(), 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(String);

impl BlockId {
    /// Derives the identifier for block `index` of `chunk_name`.
    pub fn derive(chunk_name: &str, index: u32) -> Self {
        let mut hasher = Sha384::new();
        hasher.update(chunk_name.as_bytes());
        hasher.update(index.to_string().as_bytes());
        Self(STANDARD.encode(hasher.finalize()))
    }

    /// Returns the base64 text of the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Base64-encoded MD5 digest of a block's bytes, sent with the upload so the
/// service can verify what it received.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentMd5(String);

impl ContentMd5 {
    /// Computes the checksum of `data`.
    pub fn compute(data: &[u8]) -> Self {
        Self(STANDARD.encode(Md5::digest(data)))
    }

    /// Returns the base64 text of the checksum.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentMd5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Uploads `data` as block `index` of `blob`, retrying transient failures.
///
/// Returns the block's identifier. Errors other than transient storage
/// errors, and exhaustion of a bounded `policy`, are returned to the caller.
pub async fn upload_block(
    store: &dyn ObjectStore,
    blob: &BlobRef,
    index: u32,
    data: &[u8],
    policy: &RetryPolicy,
    progress: &Arc<dyn ProgressReporter>,
) -> Result<BlockId> {
    let block_id = BlockId::derive(blob.name(), index);
    let checksum = ContentMd5::compute(data);

    with_retry_notify(
        RetrySite::PutBlock,
        policy,
        || async {
            store
                .put_block(blob, &block_id, data, &checksum)
                .await
                .map_err(Error::from)
        },
        |err, delay| {
            log::debug!(
                "block {} of '{}' ({} bytes) will be re-sent",
                index,
                blob,
                data.len()
            );
            progress.on_retry(RetrySite::PutBlock, err, delay);
        },
    )
    .await?;

    log::debug!("put block {} ({}) of '{}'", index, block_id, blob);
    progress.on_block_uploaded(blob.name(), index, data.len() as u64);
    Ok(block_id)
}
