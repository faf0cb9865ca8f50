//! Test runner implementation

use crate::commands::{ListArgs, RunArgs};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::output::{OutputFormat, ProgressReporter};
use conformo::{
    parse_query, CollapseOptions, ExpectationEntry, NodeKind, RunSummary, Runner, SuiteRegistry,
    TestQuery, TestTree,
};
use std::path::Path;
use std::sync::Arc;

/// Runs and lists queries against a registry
#[derive(Debug)]
pub struct TestRunner {
    config: CliConfig,
    registry: Arc<SuiteRegistry>,
}

impl TestRunner {
    /// Create a runner over `registry`
    #[must_use]
    pub const fn new(config: CliConfig, registry: Arc<SuiteRegistry>) -> Self {
        Self { config, registry }
    }

    /// Configuration in use
    #[must_use]
    pub const fn config(&self) -> &CliConfig {
        &self.config
    }

    /// Run every case selected by the arguments' queries
    pub async fn run(&self, args: &RunArgs) -> CliResult<RunSummary> {
        let queries = parse_queries(&args.queries)?;
        let expectations = match &args.expectations {
            Some(path) => read_expectations(path)?,
            None => Vec::new(),
        };
        let options = self.config.runner_options().with_expectations(expectations);
        let runner = Runner::new(Arc::clone(&self.registry) as _, options);

        let trees = runner.load(&queries).await?;
        let total: usize = trees
            .iter()
            .map(|tree| tree.leaves_under(tree.root()).len())
            .sum();
        tracing::debug!(queries = queries.len(), total, "trees loaded");

        let mut reporter = ProgressReporter::new(
            self.config.format,
            self.config.color.should_color(),
            self.config.verbosity.is_quiet(),
        )
        .with_verbose(self.config.verbosity.is_verbose())
        .with_print_json(self.config.print_json);
        reporter.start(total);
        let summary = runner.run_trees(&trees, &reporter).await?;
        reporter.finish(&summary)?;
        Ok(summary)
    }

    /// Every case query, or the collapsed query list, selected by the arguments
    pub async fn list(&self, args: &ListArgs) -> CliResult<Vec<String>> {
        let queries = parse_queries(&args.queries)?;
        let runner = Runner::new(
            Arc::clone(&self.registry) as _,
            self.config.runner_options(),
        );
        let trees = runner.load(&queries).await?;

        let mut lines = Vec::new();
        if args.collapse {
            let expectations: Vec<TestQuery> = match &args.expectations {
                Some(path) => read_expectations(path)?
                    .into_iter()
                    .map(|e| e.query)
                    .collect(),
                None => Vec::new(),
            };
            for tree in &trees {
                let relevant = expectations
                    .iter()
                    .filter(|e| tree.query().contains(e))
                    .cloned()
                    .collect();
                let options = CollapseOptions::new()
                    .with_expand_through(args.expand_through)
                    .with_expectations(relevant);
                let collapsed = tree.iterate_collapsed_queries(&options)?;
                lines.extend(collapsed.iter().map(ToString::to_string));
            }
        } else {
            for tree in &trees {
                lines.extend(case_lines(tree));
            }
        }
        Ok(lines)
    }

    /// Print `lines`, one per line
    pub fn print_list(lines: &[String]) {
        ProgressReporter::new(OutputFormat::Text, false, false).list(lines);
    }
}

fn case_lines(tree: &TestTree) -> Vec<String> {
    tree.leaves_under(tree.root())
        .into_iter()
        .map(|id| {
            let node = tree.node(id);
            match node.kind() {
                NodeKind::Case(case) if case.is_unimplemented() => {
                    format!("{} (unimplemented)", node.query())
                }
                NodeKind::LoadError(message) => format!("{} ({message})", node.query()),
                _ => node.query().to_string(),
            }
        })
        .collect()
}

fn parse_queries(texts: &[String]) -> CliResult<Vec<TestQuery>> {
    if texts.is_empty() {
        return Err(CliError::invalid_argument("at least one query is required"));
    }
    texts
        .iter()
        .map(|text| parse_query(text).map_err(CliError::from))
        .collect()
}

fn read_expectations(path: &Path) -> CliResult<Vec<ExpectationEntry>> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        CliError::config(format!("cannot read expectations {}: {e}", path.display()))
    })?;
    serde_json::from_str(&text).map_err(|e| {
        CliError::config(format!("invalid expectations {}: {e}", path.display()))
    })
}
