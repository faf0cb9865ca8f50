//! CLI command definitions using clap

use crate::config::ColorChoice;
use crate::output::OutputFormat;
use clap::{Parser, Subcommand, ValueEnum};
use conformo::Level;
use std::path::PathBuf;

/// Conformo: run and list conformance-suite queries
#[derive(Parser, Debug)]
#[command(name = "conformo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every case selected by the queries
    Run(RunArgs),

    /// List the cases selected by the queries
    List(ListArgs),
}

/// Arguments for the run command
#[derive(Parser, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct RunArgs {
    /// Queries such as `suite:*` or `suite:file:test:*`
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Print each case result (-vv also enables engine diagnostics)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Record debug log lines in case results
    #[arg(long)]
    pub debug: bool,

    /// Number of worker threads (0 = serial)
    #[arg(short = 'j', long, default_value = "0")]
    pub jobs: usize,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: FormatArg,

    /// Per-case timeout in milliseconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// JSON list of `{"query": ..., "expectation": "pass"|"fail"|"skip"}`
    #[arg(long)]
    pub expectations: Option<PathBuf>,

    /// Print every case result as a JSON line
    #[arg(long)]
    pub print_json: bool,

    /// Stop after the first failing case
    #[arg(long)]
    pub fail_fast: bool,
}

/// Arguments for the list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Queries such as `suite:*` or `suite:file:test:*`
    #[arg(required = true)]
    pub queries: Vec<String>,

    /// Print the minimal query list instead of every case
    #[arg(long)]
    pub collapse: bool,

    /// Broadest level emitted by --collapse
    #[arg(long, default_value = "multi-test", value_parser = parse_level)]
    pub expand_through: Level,

    /// Expectations file whose queries must appear in the collapsed list
    #[arg(long)]
    pub expectations: Option<PathBuf>,
}

/// Color argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum ColorArg {
    /// Automatic color detection
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}

/// Output format argument
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum FormatArg {
    /// Progress bar and summary
    #[default]
    Text,
    /// One JSON document
    Json,
    /// Test Anything Protocol
    Tap,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
            FormatArg::Tap => Self::Tap,
        }
    }
}

/// Parse a level name: `1`-`4`, `file`, `test`, `case`, `single` or `multi-*`
fn parse_level(name: &str) -> Result<Level, String> {
    Level::from_name(name).ok_or_else(|| {
        format!("unknown level '{name}' (expected multi-file, multi-test, multi-case or single)")
    })
}
