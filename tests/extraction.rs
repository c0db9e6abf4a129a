//! End-to-end extraction tests against the in-memory store.

use std::sync::Arc;
use std::time::Duration;

use gzchunk::error::ErrorCode;
use gzchunk::store::StoreOp;
use gzchunk::{AtomicProgress, ClientOptions, Error, NoDelimiterPolicy, RetryPolicy, RetrySite};

mod common;

use common::{Fixture, config};

const INPUT: &[u8] = b"aaaa\nbbbb\nccccc\n";

// =============================================================================
// Splitting
// =============================================================================

#[tokio::test]
async fn test_single_chunk_split_on_last_delimiter() {
    let fixture = Fixture::gzipped(INPUT);
    let summary = fixture
        .extract(config(u64::MAX).buffer_size(6))
        .await
        .unwrap();

    assert_eq!(summary.total_bytes, 16);
    assert_eq!(summary.chunk_names().collect::<Vec<_>>(), ["p000000s"]);
    assert_eq!(
        fixture.blocks("p000000s"),
        [&b"aaaa\n"[..], b"bbbb\n", b"ccccc\n"]
    );
    assert_eq!(fixture.joined("p"), INPUT);
}

#[tokio::test]
async fn test_limit_equal_to_capacity_commits_every_flush() {
    // C = min(100 MiB, L) = 6; every flush satisfies bytesInChunk + C >= L
    let fixture = Fixture::gzipped(INPUT);
    let summary = fixture.extract(config(6)).await.unwrap();

    let chunks = fixture.chunks("p");
    let names: Vec<_> = chunks.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, ["p000000s", "p000001s", "p000002s"]);
    assert_eq!(chunks[0].1, b"aaaa\n");
    assert_eq!(chunks[1].1, b"bbbb\n");
    assert_eq!(chunks[2].1, b"ccccc\n");

    for chunk in &summary.chunks {
        assert_eq!(chunk.blocks, 1);
    }
    assert_eq!(fixture.joined("p"), INPUT);
}

#[tokio::test]
async fn test_rollover_restarts_block_index() {
    let data = b"11\n22\n33\n44\n55\n66\n";
    let fixture = Fixture::gzipped(data);
    // C = 3, L = 7: a chunk takes flushes while bytes + 3 < 7
    let summary = fixture.extract(config(7).buffer_size(3)).await.unwrap();

    let blocks: Vec<_> = summary.chunks.iter().map(|c| c.blocks).collect();
    assert_eq!(blocks, [2, 2, 2]);
    assert_eq!(fixture.blocks("p000001s"), [&b"33\n"[..], b"44\n"]);

    let ids: Vec<_> = fixture
        .store
        .committed_blocks(&gzchunk::store::BlobRef::new("out", "p000001s"))
        .unwrap()
        .into_iter()
        .map(|(id, _)| id)
        .collect();
    assert_eq!(ids[0], gzchunk::block::BlockId::derive("p000001s", 0));
    assert_eq!(ids[1], gzchunk::block::BlockId::derive("p000001s", 1));
}

#[tokio::test]
async fn test_custom_delimiter_and_multi_member_gzip() {
    let mut compressed = common::gzip(b"a|b|");
    compressed.extend(common::gzip(b"c|d"));
    let fixture = Fixture::gzipped(b"");
    fixture.store.insert(&fixture.source, compressed);

    fixture
        .extract(config(u64::MAX).buffer_size(3).delimiter(b'|'))
        .await
        .unwrap();

    assert_eq!(fixture.joined("p"), b"a|b|c|d");
    assert_eq!(fixture.blocks("p000000s"), [&b"a|"[..], b"b|", b"c|", b"d"]);
}

// =============================================================================
// Missing delimiter
// =============================================================================

#[tokio::test]
async fn test_missing_delimiter_fails_by_default() {
    let fixture = Fixture::gzipped(b"xxxxxxxxxx");
    let err = fixture
        .extract(config(u64::MAX).buffer_size(4))
        .await
        .unwrap_err();

    match err {
        Error::DelimiterNotFound {
            chunk,
            block_index,
            capacity,
            delimiter,
        } => {
            assert_eq!(chunk, "p000000s");
            assert_eq!(block_index, 0);
            assert_eq!(capacity, 4);
            assert_eq!(delimiter, b'\n');
        }
        other => panic!("expected DelimiterNotFound, got {:?}", other),
    }
    assert_eq!(fixture.store.stats().put_block_list_calls, 0);
}

#[tokio::test]
async fn test_unterminated_last_line_filling_buffer_is_kept() {
    let fixture = Fixture::gzipped(b"ab\nxxxx");
    let summary = fixture
        .extract(config(u64::MAX).buffer_size(4))
        .await
        .unwrap();

    assert_eq!(summary.total_bytes, 7);
    assert_eq!(fixture.blocks("p000000s"), [&b"ab\n"[..], b"xxxx"]);
    assert_eq!(fixture.joined("p"), b"ab\nxxxx");
}

#[tokio::test]
async fn test_line_longer_than_buffer_still_fails() {
    let fixture = Fixture::gzipped(b"ab\nxxxxx");
    let err = fixture
        .extract(config(u64::MAX).buffer_size(4))
        .await
        .unwrap_err();

    assert!(
        matches!(err, Error::DelimiterNotFound { block_index: 1, .. }),
        "got {:?}",
        err
    );
    assert!(fixture.chunks("p").is_empty());
}

#[tokio::test]
async fn test_missing_delimiter_split_at_capacity() {
    let fixture = Fixture::gzipped(b"xxxxxxxxxx");
    fixture
        .extract(
            config(u64::MAX)
                .buffer_size(4)
                .no_delimiter_policy(NoDelimiterPolicy::SplitAtCapacity),
        )
        .await
        .unwrap();

    assert_eq!(
        fixture.blocks("p000000s"),
        [&b"xxxx"[..], b"xxxx", b"xx"]
    );
}

// =============================================================================
// Retries
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_upload_error_retried_after_one_second() {
    let fixture = Fixture::gzipped(INPUT);
    fixture
        .store
        .fail_next(StoreOp::PutBlock, ErrorCode::ServerBusy);
    let progress = AtomicProgress::shared();

    let start = tokio::time::Instant::now();
    let summary = fixture
        .extract_with(config(u64::MAX).buffer_size(6), progress.clone())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(1));
    assert_eq!(progress.retries(), 1);
    assert_eq!(fixture.store.stats().put_block_calls, 4);
    assert_eq!(summary.restarts, 0);
    assert_eq!(
        fixture.blocks("p000000s"),
        [&b"aaaa\n"[..], b"bbbb\n", b"ccccc\n"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_transient_commit_error_retried() {
    let fixture = Fixture::gzipped(INPUT);
    fixture
        .store
        .fail_next(StoreOp::PutBlockList, ErrorCode::OperationTimedOut);

    let summary = fixture.extract(config(6)).await.unwrap();

    assert_eq!(summary.chunks.len(), 3);
    assert_eq!(fixture.store.stats().put_block_list_calls, 4);
    assert_eq!(fixture.joined("p"), INPUT);
}

#[tokio::test]
async fn test_fatal_upload_error_aborts() {
    let fixture = Fixture::gzipped(INPUT);
    fixture
        .store
        .fail_next(StoreOp::PutBlock, ErrorCode::AuthenticationFailed);

    let err = fixture.extract(config(u64::MAX).buffer_size(6)).await.unwrap_err();
    assert_eq!(err.error_code(), Some(&ErrorCode::AuthenticationFailed));
    assert!(!err.is_transient());
    assert!(fixture.chunks("p").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_bounded_upload_retries_give_up() {
    let fixture = Fixture::gzipped(INPUT);
    for _ in 0..3 {
        fixture
            .store
            .fail_next(StoreOp::PutBlock, ErrorCode::ServerBusy);
    }

    let err = fixture
        .extract(
            config(u64::MAX)
                .buffer_size(6)
                .client_options(ClientOptions::new().max_concurrent_uploads(1))
                .retry_policy(RetryPolicy::default().max_attempts(3)),
        )
        .await
        .unwrap_err();

    match err {
        Error::RetriesExhausted { site, attempts, .. } => {
            assert_eq!(site, RetrySite::PutBlock);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

// =============================================================================
// Session restart
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_read_fault_restarts_session_from_first_byte() {
    let data: Vec<u8> = (0..2000)
        .flat_map(|i| format!("row {},{}\n", i, i * 7).into_bytes())
        .collect();
    let fixture = Fixture::gzipped(&data);
    let compressed_len = fixture.store.get(&fixture.source).unwrap().len();
    fixture
        .store
        .fail_read_after(compressed_len / 2, ErrorCode::OperationTimedOut);
    let progress = AtomicProgress::shared();

    let summary = fixture
        .extract_with(config(4096).buffer_size(512), progress.clone())
        .await
        .unwrap();

    assert_eq!(summary.restarts, 1);
    assert_eq!(progress.restarts(), 1);
    assert_eq!(fixture.store.stats().open_read_calls, 2);
    assert_eq!(summary.total_bytes, data.len() as u64);
    assert_eq!(fixture.joined("p"), data);
    for (name, _) in fixture.chunks("p") {
        let blob = gzchunk::store::BlobRef::new("out", name);
        assert_eq!(fixture.store.staged_block_count(&blob), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn test_restart_policy_bounds_session_restarts() {
    let fixture = Fixture::gzipped(INPUT);
    fixture.store.fail_read_after(0, ErrorCode::ServerBusy);
    fixture.store.fail_read_after(0, ErrorCode::ServerBusy);

    let mut cfg = config(u64::MAX);
    cfg.restart_retry = RetryPolicy::default().max_attempts(2);
    let err = fixture.extract(cfg).await.unwrap_err();

    match err {
        Error::RetriesExhausted { site, attempts, ref last } => {
            assert_eq!(site, RetrySite::ReadLoop);
            assert_eq!(attempts, 2);
            assert!(last.is_transient());
        }
        other => panic!("expected RetriesExhausted, got {:?}", other),
    }
}

#[tokio::test]
async fn test_progress_counts_blocks_and_chunks() {
    let fixture = Fixture::gzipped(INPUT);
    let progress = AtomicProgress::shared();
    let progress_dyn: Arc<dyn gzchunk::ProgressReporter> = progress.clone();

    fixture.extract_with(config(6), progress_dyn).await.unwrap();

    assert_eq!(progress.blocks_uploaded(), 3);
    assert_eq!(progress.uploaded_bytes(), 16);
    assert_eq!(progress.chunks_committed(), 3);
    assert_eq!(progress.decompressed_bytes(), 16);
}
