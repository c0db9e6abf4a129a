//! # gzchunk
//!
//! Streams a compressed blob out of an object store, decompresses it on the
//! fly, and writes the result back as a sequence of line-aligned destination
//! blobs ("chunks").
//!
//! Each chunk is assembled from blocks that are uploaded concurrently with an
//! MD5 checksum and then committed atomically as an ordered block list. Chunks
//! and blocks only ever end right after a line delimiter, so every chunk can
//! be processed on its own by line-oriented tools.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use gzchunk::{ExtractConfig, Extractor, Result};
//! use gzchunk::store::BlobRef;
//! use gzchunk::store::memory::MemoryStore;
//!
//! # fn gzip(data: &[u8]) -> Vec<u8> {
//! #     use std::io::Write;
//! #     let mut e = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
//! #     e.write_all(data).unwrap();
//! #     e.finish().unwrap()
//! # }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! let source = BlobRef::new("raw", "events.csv.gz");
//! store.insert(&source, gzip(b"id,event\n1,open\n2,close\n"));
//!
//! let config = ExtractConfig::new("raw", "events/part-", ".csv", 100 * 1024 * 1024);
//! let summary = Extractor::new(store.clone(), store.clone(), config)?
//!     .run(&source)
//!     .await?;
//!
//! assert_eq!(summary.chunk_names().collect::<Vec<_>>(), ["events/part-000000.csv"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## How an Extraction Works
//!
//! 1. The source is opened through an [`ObjectStore`](store::ObjectStore) and
//!    wrapped in a decompressor ([`codec`]).
//! 2. Decompressed bytes fill a fixed-capacity buffer ([`buffer`]); when it is
//!    full the buffer is cut after its last delimiter and the tail carried over.
//! 3. The ready region is uploaded as the next block of the current chunk on
//!    its own task ([`block`], [`chunk`]).
//! 4. When one more buffer could push the chunk past the size limit, the
//!    chunk's uploads are awaited and its block list committed.
//! 5. Transient storage errors are retried with exponential backoff
//!    ([`retry`]) per block, per commit, and for the session as a whole
//!    ([`session`]).
//!
//! ## Storage Backends
//!
//! | Backend | Description |
//! |---------|-------------|
//! | [`MemoryStore`](store::memory::MemoryStore) | In-memory, with fault injection for tests |
//! | [`LocalStore`](store::local::LocalStore) | Directory tree, one folder per account and container |
//!
//! Other services plug in by implementing [`ObjectStore`](store::ObjectStore).
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli` | No | Command-line interface tool |
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`]. [`Error::is_transient`] tells which
//! failures the retry loops absorb:
//!
//! ```rust
//! use gzchunk::Error;
//! use gzchunk::error::{ErrorCode, StorageError};
//!
//! fn describe(err: &Error) -> &'static str {
//!     match err {
//!         e if e.is_transient() => "will be retried",
//!         Error::DelimiterNotFound { .. } => "line longer than the buffer",
//!         Error::Storage(_) => "rejected by the store",
//!         _ => "fatal",
//!     }
//! }
//!
//! let busy = Error::from(StorageError::new(ErrorCode::ServerBusy, "throttled"));
//! assert_eq!(describe(&busy), "will be retried");
//! ```
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod block;
pub mod buffer;
pub mod chunk;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod progress;
pub mod retry;
pub mod session;
pub mod store;

pub use error::{Error, Result};

// Re-export the extraction API at crate root for convenience
pub use config::{ClientOptions, ExtractConfig, NoDelimiterPolicy};
pub use session::{ExtractSummary, Extractor};

pub use codec::Compression;
pub use connection::{Credential, StorageAccount};
pub use retry::{RetryPolicy, RetrySite};

// Re-export progress API
pub use progress::{AtomicProgress, NoProgress, ProgressReporter};
