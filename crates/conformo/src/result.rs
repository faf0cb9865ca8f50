//! Result and error types for Conformo.

use thiserror::Error;

/// Result type for Conformo operations
pub type CtsResult<T> = Result<T, CtsError>;

/// Errors that can occur in Conformo
///
/// Configuration errors (names, params, queries, registry state) indicate a bug
/// in the suite itself and abort the run. The remaining variants are raised while
/// running a case and are converted into case results by the runner.
#[derive(Debug, Error)]
pub enum CtsError {
    /// A test name was registered twice in one group
    #[error("Duplicate test name: {name}")]
    DuplicateTest {
        /// Test name (parts joined with `,`)
        name: String,
    },

    /// Two cases of one test share the same public params
    #[error("Duplicate test case params in {test}: {params}")]
    DuplicateCase {
        /// Test name
        test: String,
        /// Serialized public params
        params: String,
    },

    /// A param axis was declared twice in one combinator chain
    #[error("Duplicate param key: {key}")]
    DuplicateParamKey {
        /// Axis name
        key: String,
    },

    /// A combinator stage read an axis that no earlier stage declared
    #[error("Unknown param axis '{axis}' (declared axes: {declared})")]
    UnknownAxis {
        /// Axis that was read
        axis: String,
        /// Axes available at that point, comma separated
        declared: String,
    },

    /// A param value had the wrong type for the accessor used
    #[error("Param '{axis}' is not a {expected}: {value}")]
    ParamType {
        /// Axis name
        axis: String,
        /// Expected JSON type
        expected: &'static str,
        /// Actual value
        value: String,
    },

    /// A suite, file, test or param name contains illegal characters
    #[error("Invalid name part '{name}'; must match {pattern}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Pattern names must match
        pattern: &'static str,
    },

    /// A query string could not be parsed
    #[error("Invalid query: {message}\n  on: {query}")]
    QueryParse {
        /// Original query string
        query: String,
        /// What was wrong
        message: String,
    },

    /// A spec file or readme was registered twice
    #[error("Duplicate file registration: {file}")]
    DuplicateFile {
        /// File query string
        file: String,
    },

    /// Registration attempted after the registry was sealed
    #[error("Registry is sealed; cannot register {what}")]
    RegistrySealed {
        /// What was being registered
        what: String,
    },

    /// A query referenced a suite that is not registered
    #[error("Unknown suite: {suite}")]
    UnknownSuite {
        /// Suite name
        suite: String,
    },

    /// A query matched nothing in the registry
    #[error("No tests found for {query}")]
    NoTestsFound {
        /// Query string
        query: String,
    },

    /// An expectation query did not match any loaded node
    #[error("Expectation had no effect: {query}")]
    ExpectationUnused {
        /// Expectation query string
        query: String,
    },

    /// Loading a spec file failed or panicked
    #[error("Failed to load {file}: {message}")]
    LoadFailed {
        /// File query string
        file: String,
        /// Failure message
        message: String,
    },

    /// The test case asked to be skipped
    #[error("Skipped: {reason}")]
    SkipTestCase {
        /// Why the case was skipped
        reason: String,
    },

    /// A fixture method was called after its case had finished
    #[error("Fixture used after case finished: {operation}")]
    FixtureFinished {
        /// Method that was called
        operation: &'static str,
    },

    /// The backend device was lost
    #[error("Device was lost: {reason}")]
    DeviceLost {
        /// Loss reason reported by the backend
        reason: String,
    },

    /// A test body reported an error
    #[error("{message}")]
    TestFailure {
        /// Error message
        message: String,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// A worker thread went away before delivering all results
    #[error("Worker {worker} disconnected: {message}")]
    WorkerDisconnected {
        /// Worker index
        worker: usize,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CtsError {
    /// Create a skip request
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::SkipTestCase {
            reason: reason.into(),
        }
    }

    /// Create a test failure
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::TestFailure {
            message: message.into(),
        }
    }

    /// Create a query parse error
    #[must_use]
    pub fn query_parse(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueryParse {
            query: query.into(),
            message: message.into(),
        }
    }

    /// Whether this error is a skip request rather than a failure
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::SkipTestCase { .. })
    }

    /// Whether this error is a suite configuration error (fatal to a run)
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::DuplicateTest { .. }
                | Self::DuplicateCase { .. }
                | Self::DuplicateParamKey { .. }
                | Self::UnknownAxis { .. }
                | Self::InvalidName { .. }
                | Self::QueryParse { .. }
                | Self::DuplicateFile { .. }
                | Self::RegistrySealed { .. }
                | Self::UnknownSuite { .. }
                | Self::NoTestsFound { .. }
                | Self::ExpectationUnused { .. }
        )
    }
}

/// Message carried by a caught panic payload
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}
