//! Error types for chunked extraction.
//!
//! This module provides the [`Error`] enum which represents all possible
//! failure modes of an extraction, the [`StorageError`] reported by object
//! store backends, and a convenient [`Result<T>`] type alias.
//!
//! # Transient vs. Fatal
//!
//! Storage errors carry an [`ErrorCode`]. A small set of codes (server busy,
//! internal error, operation timed out) is transient: the operation that
//! produced it is retried with exponential backoff. Everything else aborts
//! the extraction.
//!
//! ```rust
//! use gzchunk::error::{Error, ErrorCode, StorageError};
//!
//! let err = Error::from(StorageError::new(ErrorCode::ServerBusy, "throttled"));
//! assert!(err.is_transient());
//!
//! let err = Error::from(StorageError::new(ErrorCode::BlobNotFound, "missing"));
//! assert!(!err.is_transient());
//! ```

use std::fmt;
use std::io;

/// Error code reported by an object store operation.
///
/// Codes print as the wire strings used by block-blob services. Codes this
/// crate does not classify are kept in [`ErrorCode::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorCode {
    /// The server is overloaded and asked the client to back off.
    ServerBusy,
    /// The server hit an internal error.
    InternalError,
    /// The operation did not finish within the server's time limit.
    OperationTimedOut,
    /// The referenced blob does not exist.
    BlobNotFound,
    /// A committed block list referenced a block that was never staged.
    InvalidBlockList,
    /// The content checksum supplied with a block did not match its bytes.
    Md5Mismatch,
    /// The request was rejected for lack of authorization.
    AuthenticationFailed,
    /// Any other code, kept as reported.
    Other(String),
}

impl ErrorCode {
    /// Returns the wire representation of this code.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ServerBusy => "ServerBusy",
            Self::InternalError => "InternalError",
            Self::OperationTimedOut => "OperationTimedOut",
            Self::BlobNotFound => "BlobNotFound",
            Self::InvalidBlockList => "InvalidBlockList",
            Self::Md5Mismatch => "Md5Mismatch",
            Self::AuthenticationFailed => "AuthenticationFailed",
            Self::Other(code) => code,
        }
    }

    /// Returns `true` if an operation failing with this code may be retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ServerBusy | Self::InternalError | Self::OperationTimedOut
        )
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by an [`ObjectStore`](crate::store::ObjectStore) operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("storage error {code}: {message}")]
pub struct StorageError {
    /// The service error code.
    pub code: ErrorCode,
    /// Human readable detail.
    pub message: String,
}

impl StorageError {
    /// Creates a new storage error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Returns `true` if the error code is transient.
    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// Wraps this error in an [`io::Error`] so it can travel through a byte stream.
    ///
    /// [`Error::from`] recovers the storage error from the I/O error.
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }
}

/// The main error type for extraction operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | Reading or decompressing the source |
/// | Storage | [`Storage`][Self::Storage] | Object store rejected an operation |
/// | Input | [`DelimiterNotFound`][Self::DelimiterNotFound] | A buffer holds no line delimiter |
/// | Retry | [`RetriesExhausted`][Self::RetriesExhausted] | A configured retry bound was hit |
/// | Setup | [`InvalidConfig`][Self::InvalidConfig], [`InvalidDelimiter`][Self::InvalidDelimiter], [`InvalidCredentials`][Self::InvalidCredentials] | Bad caller input |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred while reading or decompressing the source.
    #[error("I/O error: {0}")]
    Io(io::Error),

    /// An object store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A full buffer contained no delimiter byte.
    ///
    /// Returned under [`NoDelimiterPolicy::Fail`](crate::config::NoDelimiterPolicy::Fail)
    /// when a line is longer than the buffer capacity.
    #[error(
        "no delimiter {delimiter:#04x} found in a full {capacity}-byte buffer (chunk '{chunk}', block {block_index})"
    )]
    DelimiterNotFound {
        /// The chunk being written.
        chunk: String,
        /// The block index that would have been assigned.
        block_index: u32,
        /// The buffer capacity in bytes.
        capacity: usize,
        /// The delimiter byte searched for.
        delimiter: u8,
    },

    /// A bounded retry policy gave up.
    #[error("{site} gave up after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Where the retries happened.
        site: crate::retry::RetrySite,
        /// Number of attempts made.
        attempts: u32,
        /// The last transient error.
        last: Box<Error>,
    },

    /// An upload task panicked or was cancelled.
    #[error("upload task for block {block_index} of '{chunk}' failed: {reason}")]
    UploadTask {
        /// The chunk the block belongs to.
        chunk: String,
        /// The block index.
        block_index: u32,
        /// Description of the failure.
        reason: String,
    },

    /// The extraction configuration is invalid.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The delimiter specification is not a single byte.
    #[error("Invalid line delimiter '{input}': {reason}")]
    InvalidDelimiter {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Storage account credentials are missing or ambiguous.
    #[error("Invalid credentials for account '{account}': {reason}")]
    InvalidCredentials {
        /// The account name.
        account: String,
        /// Why the credentials were rejected.
        reason: &'static str,
    },
}

impl From<io::Error> for Error {
    /// Converts an I/O error, unwrapping a [`StorageError`] carried inside it.
    fn from(err: io::Error) -> Self {
        if err
            .get_ref()
            .is_some_and(|inner| inner.is::<StorageError>())
        {
            if let Some(inner) = err.into_inner() {
                if let Ok(storage) = inner.downcast::<StorageError>() {
                    return Error::Storage(*storage);
                }
            }
            return Error::Io(io::Error::other("storage error lost during unwrap"));
        }
        Error::Io(err)
    }
}

impl Error {
    /// Returns `true` if the failed operation may succeed when retried.
    ///
    /// Only storage errors with a transient [`ErrorCode`] qualify. I/O errors
    /// of kind `TimedOut`, `ConnectionReset`, `ConnectionAborted` and
    /// `Interrupted` are treated as transient read failures of the source.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(e) => e.is_transient(),
            Error::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::TimedOut
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// Returns the storage error code, if this is a storage error.
    pub fn error_code(&self) -> Option<&ErrorCode> {
        match self {
            Error::Storage(e) => Some(&e.code),
            Error::RetriesExhausted { last, .. } => last.error_code(),
            _ => None,
        }
    }

    /// Convenience constructor for [`Error::InvalidConfig`].
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig(reason.into())
    }
}

/// A specialized `Result` type for extraction operations.
pub type Result<T> = std::result::Result<T, Error>;
