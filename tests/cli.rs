//! CLI integration tests.
//!
//! These tests run the `gzchunk` binary against a temporary store root.

#![cfg(feature = "cli")]

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

mod common;

fn gzchunk(store_root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_gzchunk"))
        .env("GZCHUNK_STORE_ROOT", store_root)
        .env_remove("RUST_LOG")
        .env_remove("GZCHUNK_SOURCE_CONNECTION_STRING")
        .env_remove("GZCHUNK_DEST_CONNECTION_STRING")
        .args(args)
        .output()
        .expect("Failed to run gzchunk")
}

/// Creates a store root with `acct/in/data.gz` holding `data` gzip-compressed.
fn store_with_source(data: &[u8]) -> TempDir {
    let root = TempDir::new().expect("Failed to create temp dir");
    let dir = root.path().join("acct").join("in");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("data.gz"), common::gzip(data)).unwrap();
    root
}

const GUNZIP: &[&str] = &[
    "gunzip",
    "--source-account",
    "acct",
    "--source-container",
    "in",
    "--source-key",
    "a2V5",
    "--source-file",
    "data.gz",
    "--dest-account",
    "acct",
    "--dest-container",
    "out",
    "--dest-sas",
    "sv=2021&sig=abc",
    "--dest-prefix",
    "part-",
    "--dest-suffix",
    ".txt",
];

#[test]
fn test_gunzip_writes_chunks() {
    let root = store_with_source(b"alpha\nbeta\ngamma\ndelta\n");
    let mut args = GUNZIP.to_vec();
    args.extend(["--dest-size", "12", "-q"]);

    let output = gzchunk(root.path(), &args);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let out = root.path().join("acct").join("out");
    let mut joined = Vec::new();
    for i in 0.. {
        let path = out.join(format!("part-{:06}.txt", i));
        if !path.exists() {
            break;
        }
        joined.extend(std::fs::read(path).unwrap());
    }
    assert_eq!(joined, b"alpha\nbeta\ngamma\ndelta\n");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("part-000000.txt"));
}

#[test]
fn test_gunzip_json_summary() {
    let root = store_with_source(b"a,1\nb,2\n");
    let mut args = vec!["--format", "json"];
    args.extend(GUNZIP);

    let output = gzchunk(root.path(), &args);
    assert_eq!(output.status.code(), Some(0));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["success"], true);
    assert_eq!(summary["total_bytes"], 8);
    assert_eq!(summary["chunks"][0]["name"], "part-000000.txt");
    assert_eq!(summary["chunks"].as_array().map(Vec::len), Some(1));
}

#[test]
fn test_pascal_case_aliases() {
    let root = store_with_source(b"x\ny\n");
    let output = gzchunk(
        root.path(),
        &[
            "gunzip",
            "--SourceAccount",
            "acct",
            "--SourceContainer",
            "in",
            "--SourceSAS",
            "?sig=abc",
            "--SourceFile",
            "data.gz",
            "--DestAccount",
            "acct",
            "--DestKey",
            "a2V5",
            "--DestBlobPrefix",
            "p",
            "--DestBlobSuffix",
            "",
            "--LineDelimiter",
            "\\n",
            "-q",
        ],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    // the destination container defaults to the source container
    assert!(root.path().join("acct/in/p000000").is_file());
}

#[test]
fn test_connection_strings_and_compression_name() {
    let root = TempDir::new().unwrap();
    let dir = root.path().join("acct").join("in");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("data.txt"), b"plain\ntext\n").unwrap();

    let output = gzchunk(
        root.path(),
        &[
            "gunzip",
            "--source-connection-string",
            "DefaultEndpointsProtocol=https;AccountName=acct;AccountKey=a2V5==;EndpointSuffix=core.windows.net",
            "--source-container",
            "in",
            "--source-file",
            "data.txt",
            "--dest-connection-string",
            "AccountName=acct;SharedAccessSignature=sv=2021&sig=abc",
            "--dest-container",
            "out",
            "--dest-prefix",
            "c",
            "--dest-suffix",
            "",
            "--compression",
            "NONE",
            "-q",
        ],
    );
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let chunk = std::fs::read(root.path().join("acct/out/c000000")).unwrap();
    assert_eq!(chunk, b"plain\ntext\n");
}

#[test]
fn test_connection_string_conflicts_with_account() {
    let root = store_with_source(b"x\n");
    let mut args = GUNZIP.to_vec();
    args.extend(["--source-connection-string", "AccountName=acct;AccountKey=a2V5"]);

    let output = gzchunk(root.path(), &args);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_unknown_compression_rejected() {
    let root = store_with_source(b"x\n");
    let mut args = GUNZIP.to_vec();
    args.extend(["--compression", "lzma"]);

    let output = gzchunk(root.path(), &args);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("unknown compression"));
}

#[test]
fn test_missing_credentials_fail() {
    let root = store_with_source(b"x\n");
    let args: Vec<&str> = GUNZIP
        .iter()
        .copied()
        .filter(|a| *a != "--source-key" && *a != "a2V5")
        .collect();

    let output = gzchunk(root.path(), &args);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Error:"), "stderr: {}", stderr);
}

#[test]
fn test_missing_delimiter_reports_error() {
    let root = store_with_source(b"0123456789abcdef");
    let mut args = vec!["-f", "json"];
    args.extend(GUNZIP);
    args.extend(["--buffer-size", "4", "--dest-size", "4096", "-q"]);

    let output = gzchunk(root.path(), &args);
    assert_eq!(output.status.code(), Some(1));
    // log lines may precede the JSON document on stderr
    let stderr = String::from_utf8_lossy(&output.stderr);
    let start = stderr.find("{\n").expect("JSON error on stderr");
    let error: serde_json::Value = serde_json::from_str(&stderr[start..]).unwrap();
    assert_eq!(error["success"], false);
    assert_eq!(error["kind"], "delimiter_not_found");
    assert!(!root.path().join("acct/out/part-000000.txt").exists());
}

#[test]
fn test_missing_delimiter_split() {
    let root = store_with_source(b"0123456789");
    let mut args = GUNZIP.to_vec();
    args.extend(["--buffer-size", "4", "--dest-size", "4096", "--on-missing-delimiter", "split", "-q"]);

    let output = gzchunk(root.path(), &args);
    assert!(output.status.success());
    let chunk = std::fs::read(root.path().join("acct/out/part-000000.txt")).unwrap();
    assert_eq!(chunk, b"0123456789");
}

#[test]
fn test_missing_required_argument() {
    let root = TempDir::new().unwrap();
    let output = gzchunk(root.path(), &["gunzip", "--source-account", "acct"]);
    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_help_exits_zero() {
    let root = TempDir::new().unwrap();
    let output = gzchunk(root.path(), &["--help"]);
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("gunzip"));
}
