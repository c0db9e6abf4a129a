//! Configuration for chunked extraction.
//!
//! [`ExtractConfig`] describes where decompressed data goes and how it is cut
//! into chunks and blocks. [`ClientOptions`] bounds upload parallelism.
//!
//! # Example
//!
//! ```rust
//! use gzchunk::config::{ExtractConfig, NoDelimiterPolicy};
//!
//! let config = ExtractConfig::new("output", "part-", ".csv", 256 * 1024 * 1024)
//!     .delimiter(b'\n')
//!     .no_delimiter_policy(NoDelimiterPolicy::Fail);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.buffer_capacity(), 100 * 1024 * 1024);
//! ```

use crate::codec::Compression;
use crate::retry::RetryPolicy;
use crate::{Error, Result};

/// Largest block the block-blob protocol accepts in one upload (100 MiB).
pub const MAX_BLOCK_SIZE: usize = 100 * 1024 * 1024;

/// Most blocks a committed block list may name.
pub const MAX_BLOCKS_PER_BLOB: usize = 50_000;

/// Largest blob that can be committed from [`MAX_BLOCK_SIZE`] blocks. Chunk
/// size limits above it only bound chunks by block count.
pub const MAX_BLOB_SIZE: u64 = MAX_BLOCK_SIZE as u64 * MAX_BLOCKS_PER_BLOB as u64;

/// Default destination chunk size threshold (100 MiB).
pub const DEFAULT_CHUNK_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// What to do when a full buffer contains no delimiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoDelimiterPolicy {
    /// Abort with [`Error::DelimiterNotFound`].
    #[default]
    Fail,
    /// Flush the whole buffer as one block, splitting the overlong line
    /// across blocks (and possibly across chunks).
    SplitAtCapacity,
}

/// Upload parallelism settings passed to an extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Maximum number of block uploads in flight at once.
    ///
    /// Every in-flight upload owns one buffer, so this also bounds memory to
    /// roughly `(max_concurrent_uploads + 1) * buffer_capacity`.
    pub max_concurrent_uploads: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_concurrent_uploads: cpus * 8,
        }
    }
}

impl ClientOptions {
    /// Creates options with the default parallelism.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the upload concurrency (minimum 1).
    pub fn max_concurrent_uploads(mut self, n: usize) -> Self {
        self.max_concurrent_uploads = n.max(1);
        self
    }
}

/// Configuration of one extraction.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Destination container.
    pub container: String,
    /// Chunk name prefix.
    pub prefix: String,
    /// Chunk name suffix.
    pub suffix: String,
    /// Size threshold at which the current chunk is committed and a new one started.
    pub chunk_size_limit: u64,
    /// Line delimiter byte.
    pub delimiter: u8,
    /// Buffer capacity override. `None` uses [`MAX_BLOCK_SIZE`].
    pub buffer_capacity: Option<usize>,
    /// Behavior when a buffer holds no delimiter.
    pub no_delimiter: NoDelimiterPolicy,
    /// Compression of the source object.
    pub compression: Compression,
    /// Backoff for block uploads.
    pub upload_retry: RetryPolicy,
    /// Backoff for chunk commits.
    pub commit_retry: RetryPolicy,
    /// Backoff for whole-session restarts.
    pub restart_retry: RetryPolicy,
    /// Upload parallelism.
    pub client: ClientOptions,
}

impl ExtractConfig {
    /// Creates a configuration with newline delimiter, gzip source and
    /// unbounded retries.
    pub fn new(
        container: impl Into<String>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        chunk_size_limit: u64,
    ) -> Self {
        Self {
            container: container.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            chunk_size_limit,
            delimiter: b'\n',
            buffer_capacity: None,
            no_delimiter: NoDelimiterPolicy::default(),
            compression: Compression::default(),
            upload_retry: RetryPolicy::default(),
            commit_retry: RetryPolicy::default(),
            restart_retry: RetryPolicy::default(),
            client: ClientOptions::default(),
        }
    }

    /// Sets the line delimiter.
    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Overrides the buffer capacity (still capped by the chunk size limit).
    pub fn buffer_size(mut self, capacity: usize) -> Self {
        self.buffer_capacity = Some(capacity);
        self
    }

    /// Sets the no-delimiter policy.
    pub fn no_delimiter_policy(mut self, policy: NoDelimiterPolicy) -> Self {
        self.no_delimiter = policy;
        self
    }

    /// Sets the source compression.
    pub fn compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Uses `policy` at all three retry sites.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.upload_retry = policy.clone();
        self.commit_retry = policy.clone();
        self.restart_retry = policy;
        self
    }

    /// Sets the upload parallelism options.
    pub fn client_options(mut self, client: ClientOptions) -> Self {
        self.client = client;
        self
    }

    /// Effective buffer capacity: the lesser of the block size bound (or
    /// override) and the chunk size limit.
    pub fn buffer_capacity(&self) -> usize {
        let requested = self.buffer_capacity.unwrap_or(MAX_BLOCK_SIZE);
        let limit = usize::try_from(self.chunk_size_limit).unwrap_or(usize::MAX);
        requested.min(limit)
    }

    /// Checks the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.container.is_empty() {
            return Err(Error::invalid_config("destination container is empty"));
        }
        if self.chunk_size_limit == 0 {
            return Err(Error::invalid_config("chunk size limit must be positive"));
        }
        if self.buffer_capacity == Some(0) {
            return Err(Error::invalid_config("buffer capacity must be positive"));
        }
        if self.buffer_capacity.is_some_and(|c| c > MAX_BLOCK_SIZE) {
            return Err(Error::invalid_config(format!(
                "buffer capacity exceeds the {} byte block limit",
                MAX_BLOCK_SIZE
            )));
        }
        if self.client.max_concurrent_uploads == 0 {
            return Err(Error::invalid_config("upload concurrency must be positive"));
        }
        let capacity = self.buffer_capacity() as u64;
        if self.chunk_size_limit <= MAX_BLOB_SIZE
            && self.chunk_size_limit.div_ceil(capacity) > MAX_BLOCKS_PER_BLOB as u64
        {
            return Err(Error::invalid_config(format!(
                "a {} byte chunk needs more than {} blocks of {} bytes, raise the buffer size",
                self.chunk_size_limit, MAX_BLOCKS_PER_BLOB, capacity
            )));
        }
        Ok(())
    }
}

/// Parses a delimiter given as one character or an escape sequence.
///
/// Accepted escapes: `\n`, `\r`, `\t`, `\0`, `\\`, `\'`, `\"`, `\xHH` and
/// `\u{H..}`. The result must be a single byte, so non-ASCII characters are
/// rejected.
///
/// ```rust
/// use gzchunk::config::parse_delimiter;
///
/// assert_eq!(parse_delimiter("\\n").unwrap(), b'\n');
/// assert_eq!(parse_delimiter("|").unwrap(), b'|');
/// assert_eq!(parse_delimiter("\\x1e").unwrap(), 0x1e);
/// assert!(parse_delimiter("ab").is_err());
/// ```
pub fn parse_delimiter(input: &str) -> Result<u8> {
    let invalid = |reason: &str| Error::InvalidDelimiter {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let value = match input.strip_prefix('\\') {
        None => {
            let mut chars = input.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => c as u32,
                (None, _) => return Err(invalid("empty delimiter")),
                _ => return Err(invalid("expected a single character")),
            }
        }
        Some(escape) => match escape {
            "n" => u32::from(b'\n'),
            "r" => u32::from(b'\r'),
            "t" => u32::from(b'\t'),
            "0" => 0,
            "\\" => u32::from(b'\\'),
            "'" => u32::from(b'\''),
            "\"" => u32::from(b'"'),
            _ => {
                if let Some(hex) = escape.strip_prefix('x') {
                    if hex.len() != 2 {
                        return Err(invalid("\\x takes exactly two hex digits"));
                    }
                    u32::from_str_radix(hex, 16).map_err(|_| invalid("bad hex digits"))?
                } else if let Some(code) = escape
                    .strip_prefix("u{")
                    .and_then(|rest| rest.strip_suffix('}'))
                {
                    u32::from_str_radix(code, 16).map_err(|_| invalid("bad unicode escape"))?
                } else {
                    return Err(invalid("unknown escape sequence"));
                }
            }
        },
    };

    u8::try_from(value)
        .ok()
        .filter(|b| b.is_ascii() || input.starts_with("\\x"))
        .ok_or_else(|| invalid("delimiter must be a single byte"))
}
