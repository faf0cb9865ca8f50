//! Test runner and result aggregation.
//!
//! The runner loads one tree per query, walks the selected leaves and hands
//! every result to a [`ResultSink`]. In serial mode cases run one after
//! another on the calling task; in worker mode they are spread over OS
//! threads (see [`worker`]).

mod case;
mod expectation;
mod worker;

pub use case::CaseOptions;
pub use expectation::{Expectation, ExpectationEntry, ExpectationSet};

pub(crate) use case::execute_case;

use crate::logging::{CaseRecorder, CaseResult, CaseStatus, ResultSink};
use crate::options::{ExecutionMode, RunnerOptions};
use crate::query::TestQuery;
use crate::registry::TestFileLoader;
use crate::result::{CtsError, CtsResult};
use crate::tree::{merge_statuses, AggregateStatus, NodeId, NodeKind, StatusBoard, TestTree};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome counts of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Cases run (or skipped)
    pub total: usize,
    /// Passed without warnings
    pub passed: usize,
    /// Passed with warnings
    pub warned: usize,
    /// Skipped
    pub skipped: usize,
    /// Registered without a body
    pub unimplemented: usize,
    /// Failed
    pub failed: usize,
    /// Wall-clock time of the run
    pub duration: Duration,
    /// Aggregate status of every selected tree
    pub aggregate: AggregateStatus,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self {
            total: 0,
            passed: 0,
            warned: 0,
            skipped: 0,
            unimplemented: 0,
            failed: 0,
            duration: Duration::ZERO,
            aggregate: AggregateStatus::Pending,
        }
    }
}

impl RunSummary {
    /// Count one case result
    pub fn record(&mut self, status: CaseStatus) {
        self.total += 1;
        match status {
            CaseStatus::Pass => self.passed += 1,
            CaseStatus::Warn => self.warned += 1,
            CaseStatus::Skip => self.skipped += 1,
            CaseStatus::Unimplemented => self.unimplemented += 1,
            CaseStatus::Fail | CaseStatus::Running => self.failed += 1,
        }
    }

    /// Whether every case passed, warned, skipped or was unimplemented
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Percentage of `count` in the total
    #[must_use]
    pub fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 * 100.0 / self.total as f64
        }
    }
}

/// Runs the cases selected by queries
pub struct Runner {
    loader: Arc<dyn TestFileLoader>,
    options: RunnerOptions,
    expectations: ExpectationSet,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("options", &self.options)
            .finish()
    }
}

impl Runner {
    /// Create a runner over a loader
    #[must_use]
    pub fn new(loader: Arc<dyn TestFileLoader>, options: RunnerOptions) -> Self {
        let expectations = ExpectationSet::new(options.expectations.clone());
        Self {
            loader,
            options,
            expectations,
        }
    }

    /// Runner options
    #[must_use]
    pub const fn options(&self) -> &RunnerOptions {
        &self.options
    }

    /// Load and fully expand one tree per query
    pub async fn load(&self, queries: &[TestQuery]) -> CtsResult<Vec<TestTree>> {
        let mut trees = Vec::with_capacity(queries.len());
        for query in queries {
            let mut tree = TestTree::load(Arc::clone(&self.loader), query.clone()).await?;
            tree.load_all().await?;
            trees.push(tree);
        }
        Ok(trees)
    }

    /// Run every case selected by `queries`
    pub async fn run(
        &self,
        queries: &[TestQuery],
        sink: &dyn ResultSink,
    ) -> CtsResult<RunSummary> {
        let trees = self.load(queries).await?;
        self.run_trees(&trees, sink).await
    }

    /// Run every leaf of one loaded tree
    pub async fn run_tree(
        &self,
        tree: &TestTree,
        sink: &dyn ResultSink,
    ) -> CtsResult<RunSummary> {
        self.run_trees(std::slice::from_ref(tree), sink).await
    }

    /// Run every leaf of loaded trees
    pub async fn run_trees(
        &self,
        trees: &[TestTree],
        sink: &dyn ResultSink,
    ) -> CtsResult<RunSummary> {
        let leaves: Vec<(usize, NodeId)> = trees
            .iter()
            .enumerate()
            .flat_map(|(t, tree)| {
                tree.leaves_under(tree.root())
                    .into_iter()
                    .map(move |l| (t, l))
            })
            .collect();
        if leaves.is_empty() {
            let query = trees
                .iter()
                .map(|t| t.query().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            return Err(CtsError::NoTestsFound { query });
        }

        let started = Instant::now();
        let mut progress = Progress::new(trees, sink);
        tracing::info!(cases = leaves.len(), mode = ?self.options.mode, "starting run");

        match self.options.mode {
            ExecutionMode::Workers(n) if n > 1 => {
                let jobs = leaves
                    .iter()
                    .map(|&(t, l)| worker::Job {
                        tree: trees[t].query().to_string(),
                        case: trees[t].node(l).query().to_string(),
                    })
                    .collect();
                let pool =
                    worker::WorkerPool::new(Arc::clone(&self.loader), self.options.clone(), n);
                pool.run(jobs, |update| match update {
                    worker::JobUpdate::Started(index) => {
                        let (t, l) = leaves[index];
                        progress.start(t, l);
                        false
                    }
                    worker::JobUpdate::Finished(index, result) => {
                        let (t, l) = leaves[index];
                        progress.finish(t, l, result)
                    }
                })
                .await?;
            }
            _ => {
                for &(t, leaf) in &leaves {
                    progress.start(t, leaf);
                    let result = run_leaf(&trees[t], leaf, &self.options, &self.expectations).await;
                    if progress.finish(t, leaf, result) && self.options.fail_fast {
                        tracing::info!("stopping after first failure");
                        break;
                    }
                }
            }
        }

        let mut summary = progress.summary();
        summary.duration = started.elapsed();
        tracing::info!(
            total = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            aggregate = %summary.aggregate,
            "run finished"
        );
        Ok(summary)
    }
}

/// Results of a run as they arrive: the sink, one status board per tree and
/// the counts
struct Progress<'a> {
    trees: &'a [TestTree],
    sink: &'a dyn ResultSink,
    boards: Vec<StatusBoard>,
    summary: RunSummary,
}

impl<'a> Progress<'a> {
    fn new(trees: &'a [TestTree], sink: &'a dyn ResultSink) -> Self {
        Self {
            trees,
            sink,
            boards: trees.iter().map(StatusBoard::new).collect(),
            summary: RunSummary::default(),
        }
    }

    /// Mark a leaf as running
    fn start(&mut self, tree: usize, leaf: NodeId) {
        let tree_ref = &self.trees[tree];
        self.boards[tree].set_leaf(tree_ref, leaf, CaseStatus::Running);
        let query = tree_ref.node(leaf).query().to_string();
        self.sink.put(&query, CaseResult::running());
    }

    /// Record the final result of a leaf; returns whether it failed
    fn finish(&mut self, tree: usize, leaf: NodeId, result: CaseResult) -> bool {
        let tree_ref = &self.trees[tree];
        self.boards[tree].set_leaf(tree_ref, leaf, result.status);
        self.summary.record(result.status);
        let failed = result.status == CaseStatus::Fail;
        self.sink.put(&tree_ref.node(leaf).query().to_string(), result);
        failed
    }

    fn summary(self) -> RunSummary {
        let mut summary = self.summary;
        summary.aggregate = merge_statuses(
            self.trees
                .iter()
                .zip(&self.boards)
                .map(|(tree, board)| board.status(tree.root())),
        );
        summary
    }
}

/// Run one leaf of a loaded tree
pub(crate) async fn run_leaf(
    tree: &TestTree,
    id: NodeId,
    options: &RunnerOptions,
    expectations: &ExpectationSet,
) -> CaseResult {
    let node = tree.node(id);
    let recorder = CaseRecorder::new(options.debug);
    match node.kind() {
        NodeKind::Case(case) => {
            let case_options = CaseOptions::default()
                .with_timeout(options.case_timeout)
                .with_expectation(expectations.lookup(node.query()));
            case.run(&case_options, recorder).await
        }
        NodeKind::LoadError(message) => case::load_error_result(message, recorder),
        _ => {
            let mut recorder = recorder;
            recorder.exception(format!("{} is not a runnable case", node.query()), None);
            recorder.finish()
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::logging::Logger;
    use crate::query::parse_query;
    use crate::tree::tests::{loaded, sample_registry};

    fn queries(qs: &[&str]) -> Vec<TestQuery> {
        qs.iter().map(|q| parse_query(q).unwrap()).collect()
    }

    /// Keeps every put in arrival order
    #[derive(Default)]
    struct RecordingSink {
        puts: std::sync::Mutex<Vec<(String, CaseStatus)>>,
    }

    impl RecordingSink {
        fn puts(&self) -> Vec<(String, CaseStatus)> {
            self.puts.lock().unwrap().clone()
        }
    }

    impl ResultSink for RecordingSink {
        fn put(&self, query: &str, result: CaseResult) {
            self.puts
                .lock()
                .unwrap()
                .push((query.to_string(), result.status));
        }

        fn get(&self, query: &str) -> Option<CaseResult> {
            self.puts
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|(q, _)| q == query)
                .map(|(_, status)| CaseResult::new(*status))
        }
    }

    /// Every case is put as running before its final result
    fn assert_running_first(puts: &[(String, CaseStatus)], cases: usize) {
        let running: Vec<_> = puts
            .iter()
            .filter(|(_, s)| *s == CaseStatus::Running)
            .collect();
        assert_eq!(running.len(), cases);
        assert_eq!(puts.len(), cases * 2);
        for (query, _) in &running {
            let positions: Vec<_> = puts
                .iter()
                .enumerate()
                .filter(|(_, (q, _))| q == query)
                .map(|(i, (_, s))| (i, *s))
                .collect();
            assert_eq!(positions.len(), 2, "{query}");
            assert_eq!(positions[0].1, CaseStatus::Running, "{query}");
            assert_ne!(positions[1].1, CaseStatus::Running, "{query}");
        }
    }

    mod serial_tests {
        use super::*;

        #[tokio::test]
        async fn test_whole_suite() {
            let runner = Runner::new(sample_registry(), RunnerOptions::new());
            let logger = Logger::new();
            let summary = runner.run(&queries(&["s:*"]), &logger).await.unwrap();
            assert_eq!(summary.total, 5);
            assert_eq!(summary.passed, 2);
            assert_eq!(summary.unimplemented, 1);
            assert_eq!(summary.failed, 2);
            assert!(!summary.is_success());
            assert_eq!(summary.aggregate, AggregateStatus::PassFail);
            assert_eq!(logger.len(), 5);
            let load_error = logger.get("s:a,y:__load_error__:{}").unwrap();
            assert_eq!(load_error.status, CaseStatus::Fail);
        }

        #[tokio::test]
        async fn test_cases_reported_running_first() {
            let runner = Runner::new(sample_registry(), RunnerOptions::new());
            let sink = RecordingSink::default();
            let summary = runner.run(&queries(&["s:*"]), &sink).await.unwrap();
            assert_eq!(summary.total, 5);
            assert_running_first(&sink.puts(), 5);
        }

        #[tokio::test]
        async fn test_board_shows_running_case() {
            let tree = loaded("s:b:*").await;
            let logger = Logger::new();
            let mut progress = Progress::new(std::slice::from_ref(&tree), &logger);
            let leaf = tree.leaves_under(tree.root())[0];
            progress.start(0, leaf);
            assert_eq!(progress.boards[0].status(tree.root()), AggregateStatus::Running);
            assert_eq!(
                logger.get(&tree.node(leaf).query().to_string()).unwrap().status,
                CaseStatus::Running
            );
            progress.finish(0, leaf, CaseResult::new(CaseStatus::Pass));
            assert_eq!(progress.summary().aggregate, AggregateStatus::Pass);
        }

        #[tokio::test]
        async fn test_expectations_change_outcome() {
            let options = RunnerOptions::new().with_expectations(vec![
                ExpectationEntry::new(parse_query("s:b:*").unwrap(), Expectation::Fail),
                ExpectationEntry::new(parse_query("s:a,y:*").unwrap(), Expectation::Skip),
            ]);
            let runner = Runner::new(sample_registry(), options);
            let logger = Logger::new();
            let summary = runner
                .run(&queries(&["s:b:*", "s:a,x:*"]), &logger)
                .await
                .unwrap();
            assert!(summary.is_success());
            assert_eq!(logger.get("s:b:three:{}").unwrap().status, CaseStatus::Pass);
        }

        #[tokio::test]
        async fn test_fail_fast_stops() {
            let runner = Runner::new(
                sample_registry(),
                RunnerOptions::new().with_fail_fast(true),
            );
            let logger = Logger::new();
            let summary = runner.run(&queries(&["s:a,*"]), &logger).await.unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.total, 4);
        }

        #[tokio::test]
        async fn test_rerun_overwrites() {
            let runner = Runner::new(sample_registry(), RunnerOptions::new());
            let logger = Logger::new();
            let q = queries(&[r#"s:a,x:one:{"n":1}"#]);
            runner.run(&q, &logger).await.unwrap();
            runner.run(&q, &logger).await.unwrap();
            assert_eq!(logger.len(), 1);
        }

        #[tokio::test]
        async fn test_configuration_errors_are_fatal() {
            let runner = Runner::new(sample_registry(), RunnerOptions::new());
            let logger = Logger::new();
            let err = runner.run(&queries(&["s:nothing:*"]), &logger).await.unwrap_err();
            assert!(err.is_configuration());
            assert!(logger.is_empty());
        }
    }

    mod worker_tests {
        use super::*;

        #[tokio::test]
        async fn test_workers_match_serial() {
            let serial = Runner::new(sample_registry(), RunnerOptions::new());
            let parallel = Runner::new(
                sample_registry(),
                RunnerOptions::new().with_mode(ExecutionMode::Workers(2)),
            );
            let (serial_log, parallel_log) = (Logger::new(), Logger::new());
            let q = queries(&["s:*"]);
            let a = serial.run(&q, &serial_log).await.unwrap();
            let b = parallel.run(&q, &parallel_log).await.unwrap();
            assert_eq!(
                (a.total, a.passed, a.unimplemented, a.failed, a.aggregate),
                (b.total, b.passed, b.unimplemented, b.failed, b.aggregate)
            );
            let statuses = |log: &Logger| -> Vec<(String, CaseStatus)> {
                let mut v: Vec<_> = log
                    .results()
                    .into_iter()
                    .map(|(q, r)| (q, r.status))
                    .collect();
                v.sort_by(|a, b| a.0.cmp(&b.0));
                v
            };
            assert_eq!(statuses(&serial_log), statuses(&parallel_log));
        }

        #[tokio::test]
        async fn test_workers_report_running_first() {
            let runner = Runner::new(
                sample_registry(),
                RunnerOptions::new().with_mode(ExecutionMode::Workers(2)),
            );
            let sink = RecordingSink::default();
            runner.run(&queries(&["s:*"]), &sink).await.unwrap();
            assert_running_first(&sink.puts(), 5);
        }

        #[tokio::test]
        async fn test_workers_apply_expectations() {
            let options = RunnerOptions::new()
                .with_mode(ExecutionMode::Workers(3))
                .with_expectations(vec![ExpectationEntry::new(
                    parse_query("s:b:*").unwrap(),
                    Expectation::Fail,
                )]);
            let runner = Runner::new(sample_registry(), options);
            let logger = Logger::new();
            runner.run(&queries(&["s:b:*"]), &logger).await.unwrap();
            assert_eq!(logger.get("s:b:three:{}").unwrap().status, CaseStatus::Pass);
        }
    }

    mod summary_tests {
        use super::*;

        #[test]
        fn test_record_and_percent() {
            let mut summary = RunSummary::default();
            for status in [CaseStatus::Pass, CaseStatus::Warn, CaseStatus::Skip, CaseStatus::Pass] {
                summary.record(status);
            }
            assert_eq!(summary.total, 4);
            assert!(summary.is_success());
            assert!((summary.percent(summary.passed) - 50.0).abs() < f64::EPSILON);
            summary.record(CaseStatus::Fail);
            assert!(!summary.is_success());
        }
    }
}
