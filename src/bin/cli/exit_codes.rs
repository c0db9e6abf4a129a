//! Exit codes for the CLI tool.

use gzchunk::Error;

/// Exit code constants
pub const SUCCESS: i32 = 0;
/// Any unrecoverable failure, including bad arguments
pub const FAILURE: i32 = 1;

/// Exit code enum for structured handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
}

impl ExitCode {
    /// Returns the numeric exit code
    pub fn code(self) -> i32 {
        match self {
            Self::Success => SUCCESS,
            Self::Failure => FAILURE,
        }
    }
}

/// Short machine-readable category of an error, used in JSON output
pub fn error_kind(error: &Error) -> &'static str {
    match error {
        Error::Io(_) => "io",
        Error::Storage(_) => "storage",
        Error::DelimiterNotFound { .. } => "delimiter_not_found",
        Error::RetriesExhausted { .. } => "retries_exhausted",
        Error::UploadTask { .. } => "upload_task",
        Error::InvalidConfig(_) | Error::InvalidDelimiter { .. } => "invalid_arguments",
        Error::InvalidCredentials { .. } => "invalid_credentials",
        // Future error variants - required by #[non_exhaustive]
        _ => "other",
    }
}
