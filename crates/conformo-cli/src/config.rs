//! CLI configuration

use crate::output::OutputFormat;
use conformo::{ExecutionMode, RunnerOptions};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - failures and the final verdict only
    Quiet,
    /// Normal - progress and summary
    #[default]
    Normal,
    /// Verbose - one line per case
    Verbose,
    /// Debug - per-case lines and engine diagnostics
    Debug,
}

impl Verbosity {
    /// Verbosity for a `-v` count, overridden by `--quiet`
    #[must_use]
    pub const fn from_flags(verbose: u8, quiet: bool) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Check if debug mode
    #[must_use]
    pub const fn is_debug(self) -> bool {
        matches!(self, Self::Debug)
    }

    /// Default `tracing` filter directive when `CONFORMO_LOG` is unset
    #[must_use]
    pub const fn default_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Verbose => "info",
            Self::Quiet | Self::Normal => "warn",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => std::io::IsTerminal::is_terminal(&std::io::stderr()),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Number of worker threads (0 or 1 = serial)
    pub jobs: usize,
    /// How results are printed
    pub format: OutputFormat,
    /// Per-case timeout in milliseconds
    pub timeout_ms: Option<u64>,
    /// Record debug log lines in case results
    pub debug: bool,
    /// Stop after the first failing case
    pub fail_fast: bool,
    /// Print every case result as a JSON line
    pub print_json: bool,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set worker count
    #[must_use]
    pub const fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Set output format
    #[must_use]
    pub const fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    /// Set per-case timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, timeout_ms: Option<u64>) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Record debug log lines
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set fail fast
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Print per-case JSON lines
    #[must_use]
    pub const fn with_print_json(mut self, print_json: bool) -> Self {
        self.print_json = print_json;
        self
    }

    /// Runner options for this configuration (expectations not included)
    #[must_use]
    pub fn runner_options(&self) -> RunnerOptions {
        let mut options = RunnerOptions::new()
            .with_mode(ExecutionMode::from_jobs(self.jobs))
            .with_debug(self.debug)
            .with_fail_fast(self.fail_fast);
        if let Some(ms) = self.timeout_ms {
            options = options.with_case_timeout(Duration::from_millis(ms));
        }
        options
    }
}
