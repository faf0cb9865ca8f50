//! Expected outcomes attached to queries.
//!
//! The most specific expectation covering a case decides how its result is
//! interpreted. Cases without one are expected to pass.

use crate::query::TestQuery;
use crate::result::CtsResult;
use serde::{Deserialize, Serialize};

/// Expected outcome of the cases under a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expectation {
    /// Run normally
    #[default]
    Pass,
    /// The case is known to fail; a pass is reported as a failure
    Fail,
    /// Do not run the case
    Skip,
}

/// One line of an expectations file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectationEntry {
    /// Query the expectation applies to
    pub query: TestQuery,
    /// Expected outcome
    pub expectation: Expectation,
}

impl ExpectationEntry {
    /// Create an entry
    #[must_use]
    pub const fn new(query: TestQuery, expectation: Expectation) -> Self {
        Self { query, expectation }
    }
}

/// Lookup table of expectations
#[derive(Debug, Clone, Default)]
pub struct ExpectationSet {
    entries: Vec<ExpectationEntry>,
}

impl ExpectationSet {
    /// Build from entries
    #[must_use]
    pub fn new(entries: Vec<ExpectationEntry>) -> Self {
        Self { entries }
    }

    /// Parse a JSON list of `{"query": ..., "expectation": ...}`
    pub fn from_json(json: &str) -> CtsResult<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Expectation of the most specific query covering `case`
    #[must_use]
    pub fn lookup(&self, case: &TestQuery) -> Expectation {
        self.entries
            .iter()
            .filter(|e| e.query.contains(case))
            .max_by(|a, b| a.query.level().cmp(&b.query.level()).then_with(|| {
                depth(&a.query).cmp(&depth(&b.query))
            }))
            .map(|e| e.expectation)
            .unwrap_or_default()
    }

    /// Every expectation query
    pub fn queries(&self) -> impl Iterator<Item = &TestQuery> {
        self.entries.iter().map(|e| &e.query)
    }

    /// Whether there are no expectations
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn depth(q: &TestQuery) -> usize {
    q.file_parts().len()
        + q.test_parts().map_or(0, <[String]>::len)
        + q.params().map_or(0, |p| p.len())
}
