//! Decompressor adapter.
//!
//! Wraps the raw compressed byte source opened from the object store into an
//! incremental decompressed byte stream, using `async-compression` decoders.
//! The adapter also counts compressed bytes consumed so progress can report
//! the compression ratio.

use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use async_compression::tokio::bufread::{DeflateDecoder, GzipDecoder, ZlibDecoder};
use pin_project_lite::pin_project;
use tokio::io::{AsyncRead, BufReader, ReadBuf};

use crate::store::ByteSource;

/// Compression format of the source object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// gzip (RFC 1952). Concatenated members are decoded as one stream.
    #[default]
    Gzip,
    /// zlib (RFC 1950).
    Zlib,
    /// Raw deflate (RFC 1951).
    Deflate,
    /// Uncompressed pass-through.
    None,
}

impl Compression {
    /// Returns the canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Zlib => "zlib",
            Self::Deflate => "deflate",
            Self::None => "none",
        }
    }
}

impl FromStr for Compression {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Self::Gzip),
            "zlib" => Ok(Self::Zlib),
            "deflate" => Ok(Self::Deflate),
            "none" | "copy" => Ok(Self::None),
            other => Err(crate::Error::invalid_config(format!(
                "unknown compression '{}'",
                other
            ))),
        }
    }
}

pin_project! {
    /// Counts bytes read through an inner reader.
    pub struct CountingReader<R> {
        #[pin]
        inner: R,
        count: Arc<AtomicU64>,
    }
}

impl<R> CountingReader<R> {
    /// Wraps `inner`, adding every byte read to `count`.
    pub fn new(inner: R, count: Arc<AtomicU64>) -> Self {
        Self { inner, count }
    }
}

impl<R: AsyncRead> AsyncRead for CountingReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.project();
        let before = buf.filled().len();
        let result = this.inner.poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &result {
            let n = buf.filled().len() - before;
            this.count.fetch_add(n as u64, Ordering::Relaxed);
        }
        result
    }
}

/// Wraps a compressed byte source into a decompressed byte source.
///
/// `compressed_bytes` is incremented with every compressed byte consumed.
pub fn decompress(
    source: ByteSource,
    compression: Compression,
    compressed_bytes: Arc<AtomicU64>,
) -> ByteSource {
    let counted = BufReader::new(CountingReader::new(source, compressed_bytes));
    match compression {
        Compression::Gzip => {
            let mut decoder = GzipDecoder::new(counted);
            decoder.multiple_members(true);
            Box::new(decoder)
        }
        Compression::Zlib => Box::new(ZlibDecoder::new(counted)),
        Compression::Deflate => Box::new(DeflateDecoder::new(counted)),
        Compression::None => Box::new(counted),
    }
}
