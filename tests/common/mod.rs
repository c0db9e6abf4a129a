//! Shared test utilities for integration tests.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use gzchunk::store::BlobRef;
use gzchunk::store::memory::MemoryStore;
use gzchunk::{ExtractConfig, ExtractSummary, Extractor, ProgressReporter};

/// Destination container used by the fixtures.
pub const OUT: &str = "out";

/// Gzip-compresses `data` as a single member.
pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// A memory store holding one compressed source blob.
pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub source: BlobRef,
}

impl Fixture {
    /// Stores `data` gzip-compressed as `in/source.gz`.
    pub fn gzipped(data: &[u8]) -> Self {
        let store = Arc::new(MemoryStore::new());
        let source = BlobRef::new("in", "source.gz");
        store.insert(&source, gzip(data));
        Self { store, source }
    }

    /// Runs an extraction with the store as both source and destination.
    pub async fn extract(&self, config: ExtractConfig) -> gzchunk::Result<ExtractSummary> {
        Extractor::new(self.store.clone(), self.store.clone(), config)?
            .run(&self.source)
            .await
    }

    /// Runs an extraction reporting to `progress`.
    pub async fn extract_with(
        &self,
        config: ExtractConfig,
        progress: Arc<dyn ProgressReporter>,
    ) -> gzchunk::Result<ExtractSummary> {
        Extractor::new(self.store.clone(), self.store.clone(), config)?
            .with_progress(progress)
            .run(&self.source)
            .await
    }

    /// Committed chunks under `prefix` in the output container, in name order.
    pub fn chunks(&self, prefix: &str) -> Vec<(String, Vec<u8>)> {
        self.store.list(OUT, prefix)
    }

    /// Concatenation of all committed chunks under `prefix`.
    pub fn joined(&self, prefix: &str) -> Vec<u8> {
        self.chunks(prefix)
            .into_iter()
            .flat_map(|(_, data)| data)
            .collect()
    }

    /// Block contents of a committed chunk, in list order.
    pub fn blocks(&self, name: &str) -> Vec<Vec<u8>> {
        self.store
            .committed_blocks(&BlobRef::new(OUT, name))
            .unwrap_or_else(|| panic!("chunk '{}' was not committed", name))
            .into_iter()
            .map(|(_, data)| data)
            .collect()
    }
}

/// Configuration writing `p{index}s` chunks into [`OUT`].
pub fn config(limit: u64) -> ExtractConfig {
    ExtractConfig::new(OUT, "p", "s", limit)
}
