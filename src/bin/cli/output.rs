//! Output formatting for CLI operations.

use serde_json::json;

use gzchunk::progress::format_bytes_iec;
use gzchunk::store::BlobRef;
use gzchunk::{Error, ExtractSummary};

use crate::exit_codes::error_kind;

/// Trait for output formatting
pub trait OutputFormatter {
    /// Formats the result of a successful extraction
    fn format_summary(&self, source: &BlobRef, summary: &ExtractSummary) -> String;

    /// Formats a failure
    fn format_error(&self, error: &Error) -> String;
}

/// Human-readable output formatter
pub struct HumanFormatter;

impl OutputFormatter for HumanFormatter {
    fn format_summary(&self, source: &BlobRef, summary: &ExtractSummary) -> String {
        let mut output = String::new();

        output.push_str(&format!(
            "Extracted '{}': {} compressed, {} decompressed\n",
            source,
            format_bytes_iec(summary.compressed_bytes),
            format_bytes_iec(summary.total_bytes)
        ));

        if summary.chunks.is_empty() {
            output.push_str("Source is empty, no chunks written\n");
            return output;
        }

        let width = summary
            .chunks
            .iter()
            .map(|c| c.name.len())
            .max()
            .unwrap_or(0);
        output.push_str(&format!(
            "{:<width$} {:>8} {:>12}\n",
            "Chunk",
            "Blocks",
            "Size",
            width = width
        ));
        output.push_str(&"-".repeat(width + 22));
        output.push('\n');
        for chunk in &summary.chunks {
            output.push_str(&format!(
                "{:<width$} {:>8} {:>12}\n",
                chunk.name,
                chunk.blocks,
                format_bytes_iec(chunk.bytes),
                width = width
            ));
        }
        output.push_str(&"-".repeat(width + 22));
        output.push('\n');
        output.push_str(&format!(
            "{} chunks, {} blocks\n",
            summary.chunks.len(),
            summary.blocks()
        ));

        if summary.restarts > 0 {
            output.push_str(&format!(
                "Restarted {} times after transient errors\n",
                summary.restarts
            ));
        }

        output
    }

    fn format_error(&self, error: &Error) -> String {
        let mut output = format!("Error: {}\n", error);
        if let Error::DelimiterNotFound { .. } = error {
            output.push_str(
                "Hint: raise --buffer-size or pass --on-missing-delimiter split to cut long lines\n",
            );
        }
        output
    }
}

/// JSON output formatter
pub struct JsonFormatter;

impl OutputFormatter for JsonFormatter {
    fn format_summary(&self, source: &BlobRef, summary: &ExtractSummary) -> String {
        let obj = json!({
            "success": true,
            "source": {
                "container": source.container(),
                "name": source.name(),
            },
            "compressed_bytes": summary.compressed_bytes,
            "total_bytes": summary.total_bytes,
            "restarts": summary.restarts,
            "blocks": summary.blocks(),
            "chunks": summary.chunks.iter().map(|c| json!({
                "index": c.index,
                "name": c.name,
                "blocks": c.blocks,
                "bytes": c.bytes,
            })).collect::<Vec<_>>(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }

    fn format_error(&self, error: &Error) -> String {
        let obj = json!({
            "success": false,
            "kind": error_kind(error),
            "code": error.error_code().map(|c| c.as_str()),
            "transient": error.is_transient(),
            "error": error.to_string(),
        });

        serde_json::to_string_pretty(&obj).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Creates the appropriate formatter based on output format
pub fn create_formatter(format: super::OutputFormat) -> Box<dyn OutputFormatter> {
    match format {
        super::OutputFormat::Human => Box::new(HumanFormatter),
        super::OutputFormat::Json => Box::new(JsonFormatter),
    }
}
