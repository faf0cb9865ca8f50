//! Log records and case results.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Level of a single log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational or passing record
    Pass,
    /// Non-fatal warning
    Warn,
    /// Failure
    Fail,
}

/// One structured log entry of a case
///
/// `extra` is shared through an `Arc`; cloning a record never deep-copies it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record level
    pub level: LogLevel,
    /// Short label such as `EXPECTATION FAILED` or `INFO`
    pub label: String,
    /// Human readable message
    pub message: String,
    /// Serialized params of the subcase that produced this record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcase: Option<String>,
    /// Debugging context (error chain, expected/actual values)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Arc<Value>>,
    /// Whether `extra` is suppressed when rendering
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub extra_hidden: bool,
}

impl LogRecord {
    /// Create a record without extra context
    #[must_use]
    pub fn new(level: LogLevel, label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            label: label.into(),
            message: message.into(),
            subcase: None,
            extra: None,
            extra_hidden: false,
        }
    }

    /// Attach extra context
    #[must_use]
    pub fn with_extra(mut self, extra: Arc<Value>) -> Self {
        self.extra = Some(extra);
        self
    }

    /// Tag with the producing subcase
    #[must_use]
    pub fn with_subcase(mut self, subcase: Option<String>) -> Self {
        self.subcase = subcase;
        self
    }

    /// Extra context if it is not hidden
    #[must_use]
    pub fn visible_extra(&self) -> Option<&Value> {
        if self.extra_hidden {
            None
        } else {
            self.extra.as_deref()
        }
    }
}

/// Final (or in-flight) status of one case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    /// All expectations held
    Pass,
    /// At least one failure was recorded
    Fail,
    /// The case was skipped
    Skip,
    /// Passed with warnings
    Warn,
    /// Currently executing
    Running,
    /// Registered without a body
    Unimplemented,
}

impl CaseStatus {
    /// Whether this status lets a run succeed
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(
            self,
            Self::Pass | Self::Warn | Self::Skip | Self::Unimplemented
        )
    }

    /// Lowercase name used in reports
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "pass",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Warn => "warn",
            Self::Running => "running",
            Self::Unimplemented => "unimplemented",
        }
    }
}

impl std::fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one executed case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Case status
    pub status: CaseStatus,
    /// Wall time in milliseconds, rounded up to the microsecond
    pub timems: f64,
    /// Records in the order they were logged
    pub logs: Vec<LogRecord>,
}

impl CaseResult {
    /// A result with no logs
    #[must_use]
    pub const fn new(status: CaseStatus) -> Self {
        Self {
            status,
            timems: 0.0,
            logs: Vec::new(),
        }
    }

    /// A result still executing
    #[must_use]
    pub const fn running() -> Self {
        Self::new(CaseStatus::Running)
    }
}

/// Render one record for humans
///
/// Continuation lines are indented under the leading bullet.
#[must_use]
pub fn pretty_print_log(record: &LogRecord) -> String {
    let mut text = format!("{}: {}", record.label, record.message);
    if let Some(subcase) = &record.subcase {
        text.push_str(&format!("\n  subcase: {subcase}"));
    }
    if let Some(extra) = record.visible_extra() {
        let rendered = serde_json::to_string_pretty(extra).unwrap_or_else(|_| extra.to_string());
        text.push('\n');
        text.push_str(&rendered);
    }
    format!("  - {}", text.replace('\n', "\n    "))
}
