//! Output formatting and progress reporting

use conformo::logging::pretty_print_log;
use conformo::{CaseResult, CaseStatus, Logger, ResultSink, RunSummary};
use console::{style, Style, Term};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Output format for test results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// One JSON document after the run
    Json,
    /// TAP (Test Anything Protocol)
    Tap,
}

/// Result sink that prints as cases finish
///
/// Every result is also kept in an inner [`Logger`], so the whole run can be
/// rendered once it is over.
#[derive(Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct ProgressReporter {
    out: Term,
    progress_bar: Option<ProgressBar>,
    logger: Logger,
    format: OutputFormat,
    reported: AtomicUsize,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print one line per case
    pub verbose: bool,
    /// Print each result as a JSON line
    pub print_json: bool,
}

impl ProgressReporter {
    /// Create a reporter writing to stdout
    #[must_use]
    pub fn new(format: OutputFormat, use_color: bool, quiet: bool) -> Self {
        Self {
            out: Term::stdout(),
            progress_bar: None,
            logger: Logger::new(),
            format,
            reported: AtomicUsize::new(0),
            use_color,
            quiet,
            verbose: false,
            print_json: false,
        }
    }

    /// Print one line per case
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Print each result as a JSON line
    #[must_use]
    pub const fn with_print_json(mut self, print_json: bool) -> Self {
        self.print_json = print_json;
        self
    }

    /// Output format
    #[must_use]
    pub const fn format(&self) -> OutputFormat {
        self.format
    }

    /// Results received so far
    #[must_use]
    pub const fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Announce a run of `total` cases
    pub fn start(&mut self, total: usize) {
        match self.format {
            OutputFormat::Tap => {
                self.line("TAP version 13");
                self.line(&format!("1..{total}"));
            }
            OutputFormat::Text if !self.quiet && !self.verbose && !self.print_json => {
                let pb = ProgressBar::new(total as u64);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                        .unwrap_or_else(|_| ProgressStyle::default_bar())
                        .progress_chars("=>-"),
                );
                self.progress_bar = Some(pb);
            }
            OutputFormat::Text | OutputFormat::Json => {}
        }
    }

    /// Print a list of queries, one per line
    pub fn list<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.line(line.as_ref());
        }
    }

    /// Close the progress bar and print the run summary
    pub fn finish(&self, summary: &RunSummary) -> serde_json::Result<()> {
        if let Some(ref pb) = self.progress_bar {
            pb.finish_and_clear();
        }
        match self.format {
            OutputFormat::Text => self.summary(summary),
            OutputFormat::Json => {
                let document = self.json_document(summary)?;
                self.line(&serde_json::to_string_pretty(&document)?);
            }
            OutputFormat::Tap => {
                self.line(&format!(
                    "# pass {} warn {} skip {} fail {}",
                    summary.passed,
                    summary.warned,
                    summary.skipped + summary.unimplemented,
                    summary.failed
                ));
            }
        }
        Ok(())
    }

    /// The summary and every result as one JSON value
    pub fn json_document(&self, summary: &RunSummary) -> serde_json::Result<Value> {
        let mut results = Map::new();
        for (query, result) in self.logger.results() {
            results.insert(query, serde_json::to_value(result)?);
        }
        Ok(json!({
            "summary": summary,
            "results": results,
        }))
    }

    fn summary(&self, summary: &RunSummary) {
        if self.quiet && summary.is_success() {
            return;
        }
        let total = summary.total;
        let rows = [
            ("Passed  w/o warnings", summary.passed),
            ("Passed with warnings", summary.warned),
            ("Skipped             ", summary.skipped),
            ("Unimplemented       ", summary.unimplemented),
            ("Failed              ", summary.failed),
        ];
        self.line("");
        self.line("** Summary **");
        for (label, count) in rows {
            self.line(&format!(
                "{label} = {count:>5} / {total:>5} = {:>6.2}%",
                summary.percent(count)
            ));
        }

        let verdict = if summary.is_success() { "PASSED" } else { "FAILED" };
        let verdict = if !self.use_color {
            verdict.to_string()
        } else if summary.is_success() {
            Style::new().green().bold().apply_to(verdict).to_string()
        } else {
            Style::new().red().bold().apply_to(verdict).to_string()
        };
        self.line(&format!(
            "{verdict} {total} cases in {:.2}s ({})",
            summary.duration.as_secs_f64(),
            summary.aggregate
        ));
    }

    fn report_text(&self, query: &str, result: &CaseResult) {
        if result.status == CaseStatus::Fail {
            let prefix = if self.use_color {
                style("✗").red().bold().to_string()
            } else {
                "FAIL".to_string()
            };
            let mut text = format!("{prefix} {query}");
            for record in &result.logs {
                text.push('\n');
                text.push_str(&pretty_print_log(record));
            }
            self.above_bar(&text);
        } else if self.verbose && !self.quiet {
            let label = self.status_label(result.status);
            self.above_bar(&format!("{label} {query} ({:.3} ms)", result.timems));
        }
    }

    fn report_tap(&self, n: usize, query: &str, result: &CaseResult) {
        let line = match result.status {
            CaseStatus::Pass | CaseStatus::Warn => format!("ok {n} - {query}"),
            CaseStatus::Skip => format!("ok {n} - {query} # SKIP"),
            CaseStatus::Unimplemented => format!("ok {n} - {query} # TODO unimplemented"),
            CaseStatus::Fail | CaseStatus::Running => format!("not ok {n} - {query}"),
        };
        self.line(&line);
        if result.status == CaseStatus::Fail {
            for record in &result.logs {
                for diag in pretty_print_log(record).lines() {
                    self.line(&format!("# {diag}"));
                }
            }
        }
    }

    fn status_label(&self, status: CaseStatus) -> String {
        let text = status.as_str().to_uppercase();
        if !self.use_color {
            return text;
        }
        let styled = match status {
            CaseStatus::Pass => style(text).green(),
            CaseStatus::Warn => style(text).yellow(),
            CaseStatus::Skip | CaseStatus::Unimplemented => style(text).dim(),
            CaseStatus::Fail | CaseStatus::Running => style(text).red().bold(),
        };
        styled.to_string()
    }

    fn above_bar(&self, text: &str) {
        match self.progress_bar {
            Some(ref pb) => pb.suspend(|| self.line(text)),
            None => self.line(text),
        }
    }

    fn line(&self, text: &str) {
        let _ = self.out.write_line(text);
    }
}

impl ResultSink for ProgressReporter {
    fn put(&self, query: &str, result: CaseResult) {
        if result.status == CaseStatus::Running {
            self.logger.put(query, result);
            return;
        }
        let n = self.reported.fetch_add(1, Ordering::Relaxed) + 1;
        match self.format {
            OutputFormat::Text => self.report_text(query, &result),
            OutputFormat::Tap => self.report_tap(n, query, &result),
            OutputFormat::Json => {}
        }
        if self.print_json {
            let line = json!({ "query": query, "result": &result });
            self.above_bar(&line.to_string());
        }
        if let Some(ref pb) = self.progress_bar {
            pb.set_message(query.to_string());
            pb.inc(1);
        }
        self.logger.put(query, result);
    }

    fn get(&self, query: &str) -> Option<CaseResult> {
        self.logger.get(query)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use conformo::AggregateStatus;
    use std::time::Duration;

    fn summary() -> RunSummary {
        let mut summary = RunSummary::default();
        summary.record(CaseStatus::Pass);
        summary.record(CaseStatus::Skip);
        summary.duration = Duration::from_millis(12);
        summary.aggregate = AggregateStatus::Pass;
        summary
    }

    mod reporter_tests {
        use super::*;

        #[test]
        fn test_default_format() {
            assert_eq!(OutputFormat::default(), OutputFormat::Text);
        }

        #[test]
        fn test_results_are_kept() {
            let reporter = ProgressReporter::new(OutputFormat::Json, false, true);
            reporter.put("s:f:t:{}", CaseResult::new(CaseStatus::Pass));
            reporter.put("s:f:u:{}", CaseResult::new(CaseStatus::Fail));
            assert_eq!(reporter.logger().len(), 2);
            assert_eq!(
                reporter.get("s:f:u:{}").map(|r| r.status),
                Some(CaseStatus::Fail)
            );
        }

        #[test]
        fn test_running_is_not_reported() {
            let reporter = ProgressReporter::new(OutputFormat::Tap, false, true);
            reporter.put("s:f:t:{}", CaseResult::running());
            assert_eq!(reporter.reported.load(Ordering::Relaxed), 0);
            assert_eq!(
                reporter.get("s:f:t:{}").map(|r| r.status),
                Some(CaseStatus::Running)
            );
            reporter.put("s:f:t:{}", CaseResult::new(CaseStatus::Pass));
            assert_eq!(reporter.reported.load(Ordering::Relaxed), 1);
            assert_eq!(reporter.logger().len(), 1);
        }

        #[test]
        fn test_json_document() {
            let reporter = ProgressReporter::new(OutputFormat::Json, false, true);
            reporter.put("s:f:t:{}", CaseResult::new(CaseStatus::Pass));
            let doc = reporter.json_document(&summary()).unwrap();
            assert_eq!(doc["summary"]["total"], 2);
            assert_eq!(doc["summary"]["aggregate"], "pass");
            assert_eq!(doc["results"]["s:f:t:{}"]["status"], "pass");
        }

        #[test]
        fn test_plain_status_label() {
            let reporter = ProgressReporter::new(OutputFormat::Text, false, false);
            assert_eq!(reporter.status_label(CaseStatus::Warn), "WARN");
            assert_eq!(reporter.status_label(CaseStatus::Unimplemented), "UNIMPLEMENTED");
        }

        #[test]
        fn test_quiet_text_start_has_no_bar() {
            let mut reporter = ProgressReporter::new(OutputFormat::Text, false, true);
            reporter.start(3);
            assert!(reporter.progress_bar.is_none());
        }
    }
}
