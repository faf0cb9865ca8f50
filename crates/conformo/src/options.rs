//! Runner configuration.

use crate::runner::ExpectationEntry;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How cases are distributed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// One case after another on the calling task
    #[default]
    Serial,
    /// Spread cases over this many worker threads
    Workers(usize),
}

impl ExecutionMode {
    /// Mode for a `--jobs` count; 0 and 1 run serially
    #[must_use]
    pub const fn from_jobs(jobs: usize) -> Self {
        if jobs <= 1 {
            Self::Serial
        } else {
            Self::Workers(jobs)
        }
    }

    /// Number of threads executing cases
    #[must_use]
    pub const fn parallelism(&self) -> usize {
        match self {
            Self::Serial => 1,
            Self::Workers(n) => *n,
        }
    }
}

/// Configuration of a [`crate::Runner`]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Serial or worker threads
    pub mode: ExecutionMode,
    /// Per-case limit; a case exceeding it fails
    pub case_timeout: Option<Duration>,
    /// Record debug log lines
    pub debug: bool,
    /// Stop scheduling after the first failing case
    pub fail_fast: bool,
    /// Expected outcomes by query
    pub expectations: Vec<ExpectationEntry>,
}

impl RunnerOptions {
    /// Default options: serial, no timeout
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution mode
    #[must_use]
    pub const fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the per-case timeout
    #[must_use]
    pub const fn with_case_timeout(mut self, timeout: Duration) -> Self {
        self.case_timeout = Some(timeout);
        self
    }

    /// Enable debug log lines
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Stop after the first failure
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Attach expectations
    #[must_use]
    pub fn with_expectations(mut self, expectations: Vec<ExpectationEntry>) -> Self {
        self.expectations = expectations;
        self
    }
}
