//! CLI tool for gzchunk extractions.

mod commands;
mod exit_codes;
mod output;
mod progress;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use exit_codes::ExitCode;

/// Split compressed blobs into line-aligned chunks
#[derive(Parser)]
#[command(name = "gzchunk")]
#[command(author, version, about = "Split compressed blobs into line-aligned chunks", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "human", global = true)]
    format: OutputFormat,

    /// Suppress progress output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Decompress a blob into chunks split on a line delimiter
    Gunzip(Box<GunzipArgs>),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments of the `gunzip` command.
#[derive(Args)]
pub struct GunzipArgs {
    /// Source storage account name
    #[arg(
        long,
        alias = "SourceAccount",
        required_unless_present = "source_connection_string"
    )]
    pub source_account: Option<String>,

    /// Source container name
    #[arg(long, alias = "SourceContainer")]
    pub source_container: String,

    /// Source storage account key
    #[arg(long, alias = "SourceKey")]
    pub source_key: Option<String>,

    /// Source shared access signature
    #[arg(long, alias = "SourceSAS")]
    pub source_sas: Option<String>,

    /// Source connection string, instead of account name and credential
    #[arg(
        long,
        env = "GZCHUNK_SOURCE_CONNECTION_STRING",
        conflicts_with_all = ["source_account", "source_key", "source_sas"]
    )]
    pub source_connection_string: Option<String>,

    /// Source blob name, including its folder if any
    #[arg(long, alias = "SourceFile")]
    pub source_file: String,

    /// Destination storage account name
    #[arg(
        long,
        alias = "DestAccount",
        required_unless_present = "dest_connection_string"
    )]
    pub dest_account: Option<String>,

    /// Destination container name (defaults to the source container)
    #[arg(long, alias = "DestContainer")]
    pub dest_container: Option<String>,

    /// Destination storage account key
    #[arg(long, alias = "DestKey")]
    pub dest_key: Option<String>,

    /// Destination shared access signature
    #[arg(long, alias = "DestSAS")]
    pub dest_sas: Option<String>,

    /// Destination connection string, instead of account name and credential
    #[arg(
        long,
        env = "GZCHUNK_DEST_CONNECTION_STRING",
        conflicts_with_all = ["dest_account", "dest_key", "dest_sas"]
    )]
    pub dest_connection_string: Option<String>,

    /// Prefix of the destination chunk names
    #[arg(long, alias = "DestBlobPrefix")]
    pub dest_prefix: String,

    /// Suffix of the destination chunk names
    #[arg(long, alias = "DestBlobSuffix")]
    pub dest_suffix: String,

    /// Chunk size threshold in bytes beyond which a new chunk is started
    #[arg(long, alias = "DestBlobSize", default_value_t = gzchunk::config::DEFAULT_CHUNK_SIZE_LIMIT)]
    pub dest_size: u64,

    /// Line delimiter: one character or an escape such as \n, \t or \x1e
    #[arg(long, alias = "LineDelimiter", default_value = "\\n")]
    pub line_delimiter: String,

    /// What to do when a full buffer holds no delimiter
    #[arg(long, value_enum, default_value = "fail")]
    pub on_missing_delimiter: MissingDelimiter,

    /// Directory holding one folder per storage account
    #[arg(long, env = "GZCHUNK_STORE_ROOT")]
    pub store_root: PathBuf,

    /// Compression of the source blob: gzip, zlib, deflate or none
    #[arg(long, short = 'c', default_value = "gzip", value_parser = parse_compression)]
    pub compression: gzchunk::Compression,

    /// Buffer (and maximum block) size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Maximum number of block uploads in flight
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Give up after this many retries of one operation (default: never)
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Give up retrying one operation after this many seconds (default: never)
    #[arg(long)]
    pub max_retry_seconds: Option<u64>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

fn parse_compression(value: &str) -> Result<gzchunk::Compression, String> {
    value.parse().map_err(|e: gzchunk::Error| e.to_string())
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum MissingDelimiter {
    /// Abort the extraction
    Fail,
    /// Cut the line at the buffer boundary
    Split,
}

impl From<MissingDelimiter> for gzchunk::NoDelimiterPolicy {
    fn from(arg: MissingDelimiter) -> Self {
        match arg {
            MissingDelimiter::Fail => gzchunk::NoDelimiterPolicy::Fail,
            MissingDelimiter::Split => gzchunk::NoDelimiterPolicy::SplitAtCapacity,
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "gzchunk=info,warn",
        (false, 2) => "gzchunk=debug,info",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .try_init();
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // help and version requests are not failures
            let code = if err.use_stderr() {
                ExitCode::Failure
            } else {
                ExitCode::Success
            };
            let _ = err.print();
            std::process::exit(code.code());
        }
    };

    init_logging(cli.verbose, cli.quiet);

    let exit_code = match cli.command {
        Commands::Gunzip(args) => commands::gunzip(&args, cli.format, cli.quiet),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
