//! Minimal query lists.
//!
//! Collapsing walks the loaded tree from the root and emits the shallowest
//! node that may stand for its whole subtree. A node has to be split into
//! its children when the load query only covers part of it, when it is
//! broader than the requested level, or when one of its children contains
//! an expectation query (so the expectation can appear as its own line).

use super::{NodeId, NodeKind, TestTree};
use crate::query::{Level, TestQuery};
use crate::result::{CtsError, CtsResult};

/// Options for [`TestTree::iterate_collapsed_queries`]
#[derive(Debug, Clone)]
pub struct CollapseOptions {
    /// Never emit a query broader than this level
    pub expand_through: Level,
    /// Queries that must appear verbatim in the output
    pub expectations: Vec<TestQuery>,
}

impl Default for CollapseOptions {
    fn default() -> Self {
        Self {
            expand_through: Level::MultiTest,
            expectations: Vec::new(),
        }
    }
}

impl CollapseOptions {
    /// Default options: at least one query per file
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broadest level that may be emitted
    #[must_use]
    pub const fn with_expand_through(mut self, level: Level) -> Self {
        self.expand_through = level;
        self
    }

    /// Require these queries in the output
    #[must_use]
    pub fn with_expectations(mut self, expectations: Vec<TestQuery>) -> Self {
        self.expectations = expectations;
        self
    }
}

struct Collapse<'a> {
    tree: &'a TestTree,
    options: &'a CollapseOptions,
    seen: Vec<bool>,
    out: Vec<TestQuery>,
}

impl Collapse<'_> {
    fn visit(&mut self, id: NodeId) {
        let node = self.tree.node(id);
        if node.is_leaf() {
            self.out.push(node.query.clone());
            return;
        }
        match node.counts {
            Some(counts) if counts.tests == 0 => return,
            None if matches!(node.kind, NodeKind::File) => return,
            _ => {}
        }

        let mut split = node.counts.is_none()
            || node.query.level() < self.options.expand_through
            || !self.tree.query.contains(&node.query);
        for &child in &node.children {
            let child_query = &self.tree.node(child).query;
            for (i, expectation) in self.options.expectations.iter().enumerate() {
                if child_query.contains(expectation) {
                    self.seen[i] = true;
                    split = true;
                }
            }
        }

        if split {
            for &child in &node.children {
                self.visit(child);
            }
        } else {
            self.out.push(node.query.clone());
        }
    }
}

impl TestTree {
    /// Minimal list of queries covering exactly the loaded leaves
    ///
    /// Unloaded files contribute nothing. Every expectation query appears
    /// verbatim in the result; one that matches no node, or cannot appear as
    /// its own line, is a [`CtsError::ExpectationUnused`].
    pub fn iterate_collapsed_queries(
        &self,
        options: &CollapseOptions,
    ) -> CtsResult<Vec<TestQuery>> {
        let root = &self.node(self.root()).query;
        let mut walk = Collapse {
            tree: self,
            options,
            seen: options.expectations.iter().map(|e| e == root).collect(),
            out: Vec::new(),
        };
        walk.visit(self.root());

        for (expectation, seen) in options.expectations.iter().zip(&walk.seen) {
            if !seen || !walk.out.contains(expectation) {
                return Err(CtsError::ExpectationUnused {
                    query: expectation.to_string(),
                });
            }
        }
        Ok(walk.out)
    }
}
