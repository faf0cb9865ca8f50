//! Per-case recorder.
//!
//! A `CaseRecorder` collects the log records of one case in call order and
//! tracks the worst severity seen, which becomes the final case status.
//! Only the first two records at the highest severity keep their `extra`
//! visible; everything below that severity is collapsed to its message.

use super::record::{CaseResult, CaseStatus, LogLevel, LogRecord};
use crate::result::CtsError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;

const MAX_VISIBLE_EXTRAS: usize = 2;
const MIN_SEVERITY_FOR_EXTRA: Severity = Severity::Warn;

/// Ordered severity of a record; the case status is the maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Passing or informational
    Pass,
    /// Case skipped
    Skip,
    /// Warning
    Warn,
    /// An expectation did not hold
    ExpectFailed,
    /// A backend validation error was observed
    ValidationFailed,
    /// The body returned an error or panicked
    ThrewException,
}

impl Severity {
    const fn level(self) -> LogLevel {
        match self {
            Self::Pass | Self::Skip => LogLevel::Pass,
            Self::Warn => LogLevel::Warn,
            Self::ExpectFailed | Self::ValidationFailed | Self::ThrewException => LogLevel::Fail,
        }
    }
}

/// Records the logs of a single case
#[derive(Debug)]
pub struct CaseRecorder {
    debug: bool,
    severity: Severity,
    hide_below: Severity,
    lines_at_current: usize,
    logs: Vec<LogRecord>,
    subcase: Option<String>,
    started: Option<Instant>,
    unimplemented: bool,
}

impl CaseRecorder {
    /// Create a recorder; `debug` enables debug records
    #[must_use]
    pub const fn new(debug: bool) -> Self {
        Self {
            debug,
            severity: Severity::Pass,
            hide_below: MIN_SEVERITY_FOR_EXTRA,
            lines_at_current: 0,
            logs: Vec::new(),
            subcase: None,
            started: None,
            unimplemented: false,
        }
    }

    /// Start the case clock
    pub fn start(&mut self) {
        self.started = Some(Instant::now());
    }

    /// Tag subsequent records with a subcase (or clear the tag)
    pub fn enter_subcase(&mut self, subcase: Option<String>) {
        self.subcase = subcase;
    }

    /// Worst severity recorded so far
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Whether debug records are kept
    #[must_use]
    pub const fn is_debug(&self) -> bool {
        self.debug
    }

    /// Records logged so far
    #[must_use]
    pub fn logs(&self) -> &[LogRecord] {
        &self.logs
    }

    /// Debug message; dropped unless debugging
    pub fn debug(&mut self, message: impl Into<String>) {
        if self.debug {
            self.log(Severity::Pass, "DEBUG", message.into(), None);
        }
    }

    /// Informational message
    pub fn info(&mut self, message: impl Into<String>) {
        self.log(Severity::Pass, "INFO", message.into(), None);
    }

    /// A passing expectation
    pub fn pass(&mut self, message: impl Into<String>) {
        self.log(Severity::Pass, "PASS", message.into(), None);
    }

    /// The case was skipped
    pub fn skipped(&mut self, reason: impl Into<String>) {
        self.log(Severity::Skip, "SKIP", reason.into(), None);
    }

    /// Non-fatal warning
    pub fn warn(&mut self, message: impl Into<String>, extra: Option<Arc<Value>>) {
        self.log(Severity::Warn, "WARN", message.into(), extra);
    }

    /// An expectation failed
    pub fn expectation_failed(&mut self, message: impl Into<String>, extra: Option<Arc<Value>>) {
        self.log(Severity::ExpectFailed, "EXPECTATION FAILED", message.into(), extra);
    }

    /// A backend validation error was observed
    pub fn validation_failed(&mut self, message: impl Into<String>, extra: Option<Arc<Value>>) {
        self.log(Severity::ValidationFailed, "VALIDATION FAILED", message.into(), extra);
    }

    /// The body failed with an exception-like error
    pub fn exception(&mut self, message: impl Into<String>, extra: Option<Arc<Value>>) {
        self.log(Severity::ThrewException, "EXCEPTION", message.into(), extra);
    }

    /// The device was lost mid-case; an expected loss only skips the case
    pub fn device_lost(&mut self, reason: impl Into<String>, expected: bool) {
        let error = CtsError::DeviceLost {
            reason: reason.into(),
        };
        if expected {
            self.log(Severity::Skip, "DEVICE LOST", error.to_string(), None);
        } else {
            let extra = Arc::new(json!({ "error": error.to_string() }));
            self.log(Severity::ThrewException, "DEVICE LOST", error.to_string(), Some(extra));
        }
    }

    /// Record an error returned by a body; skip requests become skips
    pub fn threw(&mut self, error: &CtsError) {
        match error {
            CtsError::SkipTestCase { reason } => self.skipped(reason.clone()),
            other => {
                let extra = Arc::new(json!({ "error": other.to_string() }));
                self.exception(other.to_string(), Some(extra));
            }
        }
    }

    /// Mark the case as registered without a body
    pub fn mark_unimplemented(&mut self) {
        self.unimplemented = true;
    }

    /// Invert the outcome of a case that is expected to fail
    ///
    /// A failing case becomes a pass; a passing one gets an
    /// `UNEXPECTED PASS` failure.
    pub fn expect_failure(&mut self) {
        if self.severity <= Severity::Warn {
            self.log(
                Severity::ExpectFailed,
                "UNEXPECTED PASS",
                "case was expected to fail but passed".to_string(),
                None,
            );
        } else {
            self.severity = Severity::Pass;
        }
    }

    /// Finish the case and produce its result
    #[must_use]
    pub fn finish(self) -> CaseResult {
        let elapsed_ms = self
            .started
            .map_or(0.0, |start| start.elapsed().as_secs_f64() * 1000.0);
        let status = if self.unimplemented {
            CaseStatus::Unimplemented
        } else {
            match self.severity {
                Severity::Pass => CaseStatus::Pass,
                Severity::Skip => CaseStatus::Skip,
                Severity::Warn => CaseStatus::Warn,
                _ => CaseStatus::Fail,
            }
        };
        CaseResult {
            status,
            timems: (elapsed_ms * 1000.0).ceil() / 1000.0,
            logs: self.logs,
        }
    }

    fn log(&mut self, severity: Severity, label: &str, message: String, extra: Option<Arc<Value>>) {
        self.severity = self.severity.max(severity);

        let mut record = LogRecord::new(severity.level(), label, message)
            .with_subcase(self.subcase.clone());
        record.extra = extra;

        if severity > self.hide_below {
            self.lines_at_current = 0;
            self.hide_below = severity;
            for earlier in &mut self.logs {
                earlier.extra_hidden = true;
            }
        }
        if severity == self.hide_below {
            self.lines_at_current += 1;
        } else {
            record.extra_hidden = true;
        }
        if self.lines_at_current > MAX_VISIBLE_EXTRAS {
            record.extra_hidden = true;
        }

        self.logs.push(record);
    }
}
