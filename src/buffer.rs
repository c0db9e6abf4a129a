//! Fixed-capacity output buffer.
//!
//! The read loop fills an [`OutputBuffer`] from the decompressed stream until
//! it is full or the stream ends, then cuts it at the last delimiter. The
//! bytes up to and including that delimiter become a block; the tail after it
//! is carried over to the start of the next buffer, so no line is ever split
//! across two blocks.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

/// Result of [`OutputBuffer::fill`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillOutcome {
    /// Bytes added by this call.
    pub bytes_read: usize,
    /// The source returned end of stream.
    pub eof: bool,
}

/// A buffer of fixed capacity holding a prefix of valid bytes.
#[derive(Debug)]
pub struct OutputBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl OutputBuffer {
    /// Creates an empty buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity],
            filled: 0,
        }
    }

    /// Creates a buffer of `capacity` bytes starting with `carry_over`.
    ///
    /// `carry_over` must be shorter than `capacity`.
    pub fn with_carry_over(capacity: usize, carry_over: &[u8]) -> Self {
        debug_assert!(carry_over.len() < capacity);
        let mut buffer = Self::new(capacity);
        buffer.data[..carry_over.len()].copy_from_slice(carry_over);
        buffer.filled = carry_over.len();
        buffer
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.filled
    }

    /// Returns `true` if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Returns `true` if the buffer is at capacity.
    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// The valid bytes.
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Reads from `reader` until the buffer is full or the reader reports end
    /// of stream.
    pub async fn fill<R>(&mut self, reader: &mut R) -> io::Result<FillOutcome>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let start = self.filled;
        while self.filled < self.data.len() {
            let n = reader.read(&mut self.data[self.filled..]).await?;
            if n == 0 {
                return Ok(FillOutcome {
                    bytes_read: self.filled - start,
                    eof: true,
                });
            }
            self.filled += n;
        }
        Ok(FillOutcome {
            bytes_read: self.filled - start,
            eof: false,
        })
    }

    /// Position of the last `delimiter` among the valid bytes.
    pub fn find_last_delimiter(&self, delimiter: u8) -> Option<usize> {
        self.as_slice().iter().rposition(|&b| b == delimiter)
    }

    /// Splits the buffer after its last `delimiter`.
    ///
    /// Returns the ready bytes (ending with the delimiter) and a new buffer of
    /// the same capacity holding the carry-over. If no delimiter is present
    /// the buffer is handed back unchanged.
    pub fn split(self, delimiter: u8) -> Result<(Vec<u8>, OutputBuffer), OutputBuffer> {
        let Some(pos) = self.find_last_delimiter(delimiter) else {
            return Err(self);
        };
        let capacity = self.capacity();
        let mut ready = self.data;
        ready.truncate(self.filled);
        let next = OutputBuffer::with_carry_over(capacity, &ready[pos + 1..]);
        ready.truncate(pos + 1);
        Ok((ready, next))
    }

    /// Consumes the buffer, returning all valid bytes.
    pub fn into_ready(self) -> Vec<u8> {
        let mut data = self.data;
        data.truncate(self.filled);
        data
    }
}

/// Returns `true` if `reader` has no bytes left.
///
/// [`OutputBuffer::fill`] stops as soon as the buffer is full, so a source
/// A byte consumed here is lost, so only call this when remaining data aborts.
/// A byte consumed here is lost; callers only check when they abort on data.
pub async fn at_end_of_stream<R>(reader: &mut R) -> io::Result<bool>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut byte = [0u8; 1];
    Ok(reader.read(&mut byte).await? == 0)
}
