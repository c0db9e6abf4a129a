//! Object store collaborator interface.
//!
//! The extraction engine talks to storage only through [`ObjectStore`]:
//! opening a read stream over the compressed source, staging blocks, and
//! committing a block list. Account, credential and container handling belong
//! to the implementation.
//!
//! Two implementations ship with the crate:
//!
//! - [`memory::MemoryStore`]: in-memory, with scripted fault injection
//! - [`local::LocalStore`]: a directory tree emulating storage accounts

pub mod local;
pub mod memory;

use std::fmt;

use futures::future::BoxFuture;
use tokio::io::AsyncRead;

use crate::block::{BlockId, ContentMd5};
use crate::error::StorageError;

/// A readable byte stream.
pub type ByteSource = Box<dyn AsyncRead + Send + Unpin>;

/// Result type of object store operations.
pub type StoreResult<T> = std::result::Result<T, StorageError>;

/// Reference to a blob: a container and a name within it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlobRef {
    container: String,
    name: String,
}

impl BlobRef {
    /// Creates a reference to `name` in `container`.
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Returns the container name.
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Returns the blob name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// Operations of an [`ObjectStore`]. Used for fault injection and statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// Opening a read stream.
    OpenRead,
    /// Staging a block.
    PutBlock,
    /// Committing a block list.
    PutBlockList,
}

/// Trait for block-blob object stores.
///
/// Failures are reported as [`StorageError`]s; the engine decides from the
/// error code whether to retry. Errors that occur while the returned
/// [`ByteSource`] is being read must be wrapped with
/// [`StorageError::into_io`] so the engine can classify them.
pub trait ObjectStore: Send + Sync {
    /// Opens a read stream over the whole blob.
    fn open_read<'a>(&'a self, blob: &'a BlobRef) -> BoxFuture<'a, StoreResult<ByteSource>>;

    /// Stages `data` as block `block_id` of `blob`.
    ///
    /// The store must reject the block when `checksum` does not match `data`.
    /// Staging the same id twice replaces the earlier bytes.
    fn put_block<'a>(
        &'a self,
        blob: &'a BlobRef,
        block_id: &'a BlockId,
        data: &'a [u8],
        checksum: &'a ContentMd5,
    ) -> BoxFuture<'a, StoreResult<()>>;

    /// Atomically replaces the content of `blob` with the staged blocks in
    /// `block_ids`, in order.
    fn put_block_list<'a>(
        &'a self,
        blob: &'a BlobRef,
        block_ids: &'a [BlockId],
    ) -> BoxFuture<'a, StoreResult<()>>;
}
