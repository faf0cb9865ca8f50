//! Status aggregation over the test tree.

use super::{NodeId, TestTree};
use crate::logging::CaseStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a subtree, in decreasing priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregateStatus {
    /// Some case is running
    Running,
    /// Some case has not produced a result yet
    Pending,
    /// Passes and failures with nothing skipped, or a mixed child
    PassFail,
    /// Every non-skipped case failed
    Fail,
    /// Every case was skipped
    Skip,
    /// Every non-skipped case passed
    Pass,
}

impl AggregateStatus {
    /// Status contributed by one case result
    ///
    /// Warnings count as passes and unimplemented cases as skips.
    #[must_use]
    pub const fn from_case(status: CaseStatus) -> Self {
        match status {
            CaseStatus::Running => Self::Running,
            CaseStatus::Pass | CaseStatus::Warn => Self::Pass,
            CaseStatus::Fail => Self::Fail,
            CaseStatus::Skip | CaseStatus::Unimplemented => Self::Skip,
        }
    }

    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Pending => "pending",
            Self::PassFail => "pass_fail",
            Self::Fail => "fail",
            Self::Skip => "skip",
            Self::Pass => "pass",
        }
    }
}

impl fmt::Display for AggregateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merge child statuses with strict priority
///
/// `Running > Pending > PassFail > Fail > Skip > Pass`. Children that are
/// only passes and failures give `PassFail`; once a skipped child sits next to
/// a failure the failure wins, so `[pass, fail, skip]` is `Fail`. A child that
/// is already `PassFail` keeps the parent mixed. No children at all is
/// `Pending`.
pub fn merge_statuses(children: impl IntoIterator<Item = AggregateStatus>) -> AggregateStatus {
    let mut any = false;
    let (mut running, mut pending, mut mixed) = (false, false, false);
    let (mut pass, mut fail, mut skip, mut all_skip) = (false, false, false, true);
    for status in children {
        any = true;
        match status {
            AggregateStatus::Running => running = true,
            AggregateStatus::Pending => pending = true,
            AggregateStatus::PassFail => mixed = true,
            AggregateStatus::Fail => fail = true,
            AggregateStatus::Pass => pass = true,
            AggregateStatus::Skip => skip = true,
        }
        all_skip &= status == AggregateStatus::Skip;
    }

    if running {
        AggregateStatus::Running
    } else if pending || !any {
        AggregateStatus::Pending
    } else if mixed || (pass && fail && !skip) {
        AggregateStatus::PassFail
    } else if fail {
        AggregateStatus::Fail
    } else if all_skip {
        AggregateStatus::Skip
    } else {
        AggregateStatus::Pass
    }
}

/// Cached aggregate status of every node of one tree
#[derive(Debug, Clone)]
pub struct StatusBoard {
    statuses: Vec<AggregateStatus>,
}

impl StatusBoard {
    /// Every node starts pending
    #[must_use]
    pub fn new(tree: &TestTree) -> Self {
        Self {
            statuses: vec![AggregateStatus::Pending; tree.len()],
        }
    }

    /// Aggregate status of `id`
    #[must_use]
    pub fn status(&self, id: NodeId) -> AggregateStatus {
        self.statuses
            .get(id)
            .copied()
            .unwrap_or(AggregateStatus::Pending)
    }

    /// Record the result of leaf `id` and recompute its ancestors
    pub fn set_leaf(&mut self, tree: &TestTree, id: NodeId, status: CaseStatus) {
        if self.statuses.len() < tree.len() {
            self.statuses.resize(tree.len(), AggregateStatus::Pending);
        }
        self.statuses[id] = AggregateStatus::from_case(status);

        let mut current = tree.node(id).parent();
        while let Some(parent) = current {
            let children = tree.node(parent).children();
            let merged = merge_statuses(children.iter().map(|c| self.statuses[*c]));
            if self.statuses[parent] == merged {
                break;
            }
            self.statuses[parent] = merged;
            current = tree.node(parent).parent();
        }
    }
}
