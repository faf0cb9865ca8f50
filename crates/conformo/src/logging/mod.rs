//! Structured per-case logging.
//!
//! - [`LogRecord`]: one entry with level, label, message and optional extra context
//! - [`CaseRecorder`]: collects the records of one case and derives its status
//! - [`Logger`]: the default [`ResultSink`], keyed by case query string

mod logger;
mod record;
mod recorder;

pub use logger::{Logger, ResultSink};
pub use record::{pretty_print_log, CaseResult, CaseStatus, LogLevel, LogRecord};
pub use recorder::{CaseRecorder, Severity};
