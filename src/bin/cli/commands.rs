//! Command implementations for the CLI tool.

use std::sync::Arc;
use std::time::Duration;

use gzchunk::config::parse_delimiter;
use gzchunk::store::BlobRef;
use gzchunk::store::local::LocalStore;
use gzchunk::{ClientOptions, ExtractConfig, Extractor, RetryPolicy, StorageAccount};

use crate::exit_codes::ExitCode;
use crate::output::create_formatter;
use crate::progress::CliProgress;
use crate::{GunzipArgs, OutputFormat};

/// Everything the gunzip command needs, checked and resolved.
struct GunzipRequest {
    source: BlobRef,
    extractor: Extractor,
}

fn retry_policy(args: &GunzipArgs) -> RetryPolicy {
    let mut policy = RetryPolicy::default();
    if let Some(retries) = args.max_retries {
        policy = policy.max_attempts(retries.saturating_add(1));
    }
    if let Some(seconds) = args.max_retry_seconds {
        policy = policy.max_elapsed(Duration::from_secs(seconds));
    }
    policy
}

fn storage_account(
    connection_string: Option<&str>,
    name: Option<&str>,
    key: Option<&str>,
    sas: Option<&str>,
) -> gzchunk::Result<StorageAccount> {
    match connection_string {
        Some(input) => StorageAccount::parse_connection_string(input),
        None => StorageAccount::new(
            name.unwrap_or_default(),
            key.map(str::to_string),
            sas.map(str::to_string),
        ),
    }
}

fn build_request(args: &GunzipArgs) -> gzchunk::Result<GunzipRequest> {
    let source_account = storage_account(
        args.source_connection_string.as_deref(),
        args.source_account.as_deref(),
        args.source_key.as_deref(),
        args.source_sas.as_deref(),
    )?;
    let dest_account = storage_account(
        args.dest_connection_string.as_deref(),
        args.dest_account.as_deref(),
        args.dest_key.as_deref(),
        args.dest_sas.as_deref(),
    )?;
    log::debug!("source {:?} at {}", source_account, source_account.blob_endpoint());
    log::debug!("destination {:?} at {}", dest_account, dest_account.blob_endpoint());

    let delimiter = parse_delimiter(&args.line_delimiter)?;
    let dest_container = args
        .dest_container
        .clone()
        .unwrap_or_else(|| args.source_container.clone());

    let mut config = ExtractConfig::new(
        dest_container,
        args.dest_prefix.as_str(),
        args.dest_suffix.as_str(),
        args.dest_size,
    )
    .delimiter(delimiter)
    .compression(args.compression)
    .no_delimiter_policy(args.on_missing_delimiter.into())
    .retry_policy(retry_policy(args));
    if let Some(size) = args.buffer_size {
        config = config.buffer_size(size);
    }
    if let Some(n) = args.max_concurrency {
        config = config.client_options(ClientOptions::new().max_concurrent_uploads(n));
    }

    let source_store = LocalStore::new(&args.store_root, source_account.name());
    let dest_store = LocalStore::new(&args.store_root, dest_account.name());
    let extractor = Extractor::new(Arc::new(source_store), Arc::new(dest_store), config)?;

    Ok(GunzipRequest {
        source: BlobRef::new(args.source_container.as_str(), args.source_file.as_str()),
        extractor,
    })
}

/// Gunzip command implementation
pub fn gunzip(args: &GunzipArgs, format: OutputFormat, quiet: bool) -> ExitCode {
    let formatter = create_formatter(format);

    let request = match build_request(args) {
        Ok(r) => r,
        Err(e) => {
            eprint!("{}", formatter.format_error(&e));
            return ExitCode::Failure;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to start async runtime: {}", e);
            return ExitCode::Failure;
        }
    };

    let progress = Arc::new(CliProgress::new(quiet || format == OutputFormat::Json));
    let extractor = request.extractor.with_progress(progress.clone());
    let result = runtime.block_on(extractor.run(&request.source));

    match result {
        Ok(summary) => {
            progress.finish();
            print!("{}", formatter.format_summary(&request.source, &summary));
            ExitCode::Success
        }
        Err(e) => {
            progress.abandon_with_message("Failed");
            eprint!("{}", formatter.format_error(&e));
            ExitCode::Failure
        }
    }
}
