//! Lazily loaded, query-addressed test tree.
//!
//! The tree for one query is built in two steps. [`TestTree::load`] reads the
//! cheap suite listing and creates the suite, directory and file nodes the
//! query touches. Each file node then stays unloaded until
//! [`TestTree::load_subtree`] imports the file and materializes its test and
//! case nodes. Nodes live in an arena and are addressed by [`NodeId`].

mod collapse;
mod status;

pub use collapse::CollapseOptions;
pub use status::{merge_statuses, AggregateStatus, StatusBoard};

use crate::group::RunCase;
use crate::params::CaseParams;
use crate::query::{QueryRelation, TestQuery};
use crate::registry::TestFileLoader;
use crate::result::{CtsError, CtsResult};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

/// Index of a node in its tree
pub type NodeId = usize;

/// Test path of the synthetic leaf standing in for a file that failed to load
pub const LOAD_ERROR_TEST: &str = "__load_error__";

/// Load progress of a file node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Not imported yet
    Unloaded,
    /// Import in progress
    Loading,
    /// Children materialized
    Loaded,
}

/// Leaf and todo counts of a fully loaded subtree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SubtreeCounts {
    /// Case leaves
    pub tests: usize,
    /// Nodes lacking a description, or tests without a body
    pub nodes_with_todo: usize,
}

impl std::ops::Add for SubtreeCounts {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            tests: self.tests + rhs.tests,
            nodes_with_todo: self.nodes_with_todo + rhs.nodes_with_todo,
        }
    }
}

/// What a node stands for
#[derive(Debug, Clone)]
pub enum NodeKind {
    /// `suite:*`
    Suite,
    /// `suite:a,*`
    Directory,
    /// `suite:a,b:*`
    File,
    /// `suite:a,b:t1,*`
    TestPath,
    /// `suite:a,b:t1,t2:*`
    Test,
    /// A runnable case
    Case(RunCase),
    /// Placeholder for a file whose import failed
    LoadError(String),
}

/// One node of a [`TestTree`]
#[derive(Debug)]
pub struct TreeNode {
    query: TestQuery,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    description: Option<String>,
    unimplemented: bool,
    state: LoadState,
    counts: Option<SubtreeCounts>,
}

impl TreeNode {
    /// Query addressing this node
    #[must_use]
    pub const fn query(&self) -> &TestQuery {
        &self.query
    }

    /// Node kind
    #[must_use]
    pub const fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Parent node, `None` for the root
    #[must_use]
    pub const fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Children in insertion order
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Description from a readme, spec file or test
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Whether this is a test (or a case of a test) registered without a body
    #[must_use]
    pub const fn is_unimplemented(&self) -> bool {
        self.unimplemented
    }

    /// Whether this node is a case or load-error leaf
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Case(_) | NodeKind::LoadError(_))
    }

    /// Load state; only file nodes are ever unloaded
    #[must_use]
    pub const fn load_state(&self) -> LoadState {
        self.state
    }

    const fn counts_todo(&self) -> bool {
        match self.kind {
            NodeKind::Suite | NodeKind::Directory | NodeKind::File => self.description.is_none(),
            NodeKind::Test => self.description.is_none() || self.unimplemented,
            NodeKind::TestPath | NodeKind::Case(_) | NodeKind::LoadError(_) => false,
        }
    }
}

/// Tree of everything a query selects within one suite
pub struct TestTree {
    loader: Arc<dyn TestFileLoader>,
    query: TestQuery,
    nodes: Vec<TreeNode>,
    index: HashMap<String, NodeId>,
}

impl std::fmt::Debug for TestTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestTree")
            .field("query", &self.query.to_string())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl TestTree {
    /// Build the file-level skeleton for `query` and seal the loader
    pub async fn load(loader: Arc<dyn TestFileLoader>, query: TestQuery) -> CtsResult<Self> {
        loader.seal();
        let suite = query.suite().to_string();
        let listing = loader.listing(&suite).await?;

        let mut tree = Self {
            loader,
            query,
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        let root = tree.insert(
            None,
            TestQuery::multi_file(&suite, Vec::new()),
            NodeKind::Suite,
            None,
        );

        let mut files = 0;
        for entry in listing.iter().filter(|e| !e.is_readme) {
            let file_query = TestQuery::multi_test(&suite, entry.file.clone(), Vec::new());
            if tree.query.relation(&file_query) == QueryRelation::Unordered {
                continue;
            }
            let mut parent = root;
            for depth in 1..entry.file.len() {
                let dir = TestQuery::multi_file(&suite, entry.file[..depth].to_vec());
                parent = tree.insert(Some(parent), dir, NodeKind::Directory, None);
            }
            let id = tree.insert(
                Some(parent),
                file_query,
                NodeKind::File,
                entry.description.clone(),
            );
            tree.nodes[id].state = LoadState::Unloaded;
            files += 1;
        }
        if files == 0 {
            return Err(CtsError::NoTestsFound {
                query: tree.query.to_string(),
            });
        }

        for entry in listing.iter().filter(|e| e.is_readme) {
            let dir = TestQuery::multi_file(&suite, entry.file.clone()).to_string();
            if let Some(&id) = tree.index.get(&dir) {
                tree.nodes[id].description.clone_from(&entry.description);
            }
        }

        for id in (0..tree.nodes.len()).rev() {
            tree.nodes[id].counts = tree.compute_counts(id);
        }
        tracing::debug!(query = %tree.query, files, "tree skeleton loaded");
        Ok(tree)
    }

    /// Import file node `id` and materialize the cases the query selects
    ///
    /// Does nothing for nodes that are not unloaded files. A failing import
    /// becomes a single load-error leaf.
    pub async fn load_subtree(&mut self, id: NodeId) -> CtsResult<()> {
        let node = self.node(id);
        if !matches!(node.kind, NodeKind::File) || node.state != LoadState::Unloaded {
            return Ok(());
        }
        self.nodes[id].state = LoadState::Loading;
        let suite = self.query.suite().to_string();
        let file = self.nodes[id].query.file_parts().to_vec();
        let first_new = self.nodes.len();

        match self.loader.import(&suite, &file).await {
            Ok(source) => {
                let mut cases = 0;
                for case in source.iterate_cases() {
                    match case {
                        Ok(case) => {
                            if self.add_case(id, &suite, &file, case) {
                                cases += 1;
                            }
                        }
                        Err(e) => {
                            self.add_load_error(id, &suite, &file, e.to_string());
                            break;
                        }
                    }
                }
                tracing::debug!(file = %self.nodes[id].query, cases, "spec file loaded");
            }
            Err(e) => {
                let message = match e {
                    CtsError::LoadFailed { message, .. } => message,
                    other => other.to_string(),
                };
                self.add_load_error(id, &suite, &file, message);
            }
        }

        self.nodes[id].state = LoadState::Loaded;
        for new in (first_new..self.nodes.len()).rev() {
            self.nodes[new].counts = self.compute_counts(new);
        }
        let mut current = Some(id);
        while let Some(node) = current {
            self.nodes[node].counts = self.compute_counts(node);
            current = self.nodes[node].parent;
        }
        Ok(())
    }

    /// Load every pending file subtree
    pub async fn load_all(&mut self) -> CtsResult<()> {
        let pending: Vec<NodeId> = (0..self.nodes.len())
            .filter(|&id| self.nodes[id].state == LoadState::Unloaded)
            .collect();
        for id in pending {
            self.load_subtree(id).await?;
        }
        Ok(())
    }

    /// Whether the subtree at `id` has no unloaded file below it
    #[must_use]
    pub fn is_loaded(&self, id: NodeId) -> bool {
        self.nodes[id].counts.is_some()
    }

    /// Counts of a fully loaded subtree
    #[must_use]
    pub fn subtree_counts(&self, id: NodeId) -> Option<SubtreeCounts> {
        self.nodes[id].counts
    }

    /// The query this tree was loaded for
    #[must_use]
    pub const fn query(&self) -> &TestQuery {
        &self.query
    }

    /// The suite node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        0
    }

    /// Number of nodes
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Node by id
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this tree.
    #[must_use]
    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    /// Node addressed by a query string
    #[must_use]
    pub fn find(&self, query: &str) -> Option<NodeId> {
        self.index.get(query).copied()
    }

    /// Pre-order walk of every node with its depth
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, usize, &TreeNode)> + '_ {
        let mut stack = vec![(self.root(), 0)];
        std::iter::from_fn(move || {
            let (id, depth) = stack.pop()?;
            let node = &self.nodes[id];
            stack.extend(node.children.iter().rev().map(|&c| (c, depth + 1)));
            Some((id, depth, node))
        })
    }

    /// Leaves under `id`, in pre-order
    #[must_use]
    pub fn leaves_under(&self, id: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            if node.is_leaf() {
                leaves.push(current);
            }
            stack.extend(node.children.iter().rev());
        }
        leaves
    }

    /// Indented listing of the tree
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (_, depth, node) in self.iter() {
            let _ = write!(out, "{:indent$}{}", "", node.query, indent = depth * 2);
            if !node.is_leaf() {
                match node.counts {
                    Some(c) => {
                        let _ = write!(out, "  [{} cases, {} todo]", c.tests, c.nodes_with_todo);
                    }
                    None => out.push_str("  [not loaded]"),
                }
            }
            if let Some(description) = node.description.as_deref().and_then(|d| d.lines().next()) {
                let _ = write!(out, "  # {description}");
            }
            out.push('\n');
        }
        out
    }

    fn add_case(&mut self, file_id: NodeId, suite: &str, file: &[String], case: RunCase) -> bool {
        let leaf = case.query(suite, file);
        if !self.query.contains(&leaf) {
            return false;
        }
        let test = case.test_path();
        let mut parent = file_id;
        for depth in 1..test.len() {
            let prefix = TestQuery::multi_test(suite, file.to_vec(), test[..depth].to_vec());
            parent = self.insert(Some(parent), prefix, NodeKind::TestPath, None);
        }
        let test_query =
            TestQuery::multi_case(suite, file.to_vec(), test.to_vec(), CaseParams::new());
        let description = case.description().map(str::to_string);
        let unimplemented = case.is_unimplemented();
        parent = self.insert(Some(parent), test_query, NodeKind::Test, description);
        self.nodes[parent].unimplemented = unimplemented;

        let id = self.insert(Some(parent), leaf, NodeKind::Case(case), None);
        self.nodes[id].unimplemented = unimplemented;
        true
    }

    fn add_load_error(&mut self, file_id: NodeId, suite: &str, file: &[String], message: String) {
        tracing::warn!(file = %self.nodes[file_id].query, %message, "spec file failed to load");
        let leaf = TestQuery::single_case(
            suite,
            file.to_vec(),
            vec![LOAD_ERROR_TEST.to_string()],
            CaseParams::new(),
        );
        self.insert(Some(file_id), leaf, NodeKind::LoadError(message), None);
    }

    fn insert(
        &mut self,
        parent: Option<NodeId>,
        query: TestQuery,
        kind: NodeKind,
        description: Option<String>,
    ) -> NodeId {
        let key = query.to_string();
        if let Some(&id) = self.index.get(&key) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            query,
            kind,
            parent,
            children: Vec::new(),
            description,
            unimplemented: false,
            state: LoadState::Loaded,
            counts: None,
        });
        self.index.insert(key, id);
        if let Some(parent) = parent {
            self.nodes[parent].children.push(id);
        }
        id
    }

    fn compute_counts(&self, id: NodeId) -> Option<SubtreeCounts> {
        let node = &self.nodes[id];
        let own = SubtreeCounts {
            tests: usize::from(node.is_leaf()),
            nodes_with_todo: usize::from(node.counts_todo()),
        };
        if node.state != LoadState::Loaded {
            return None;
        }
        node.children
            .iter()
            .try_fold(own, |acc, &child| Some(acc + self.nodes[child].counts?))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
pub(crate) mod tests {
    use super::*;
    use crate::fixture::NullBackend;
    use crate::group::TestGroup;
    use crate::query::parse_query;
    use crate::registry::SuiteRegistry;

    /// Suite `s` with files `a,x` (two tests), `a,y` (one failing loader) and `b`
    pub(crate) fn sample_registry() -> Arc<SuiteRegistry> {
        let reg = SuiteRegistry::new();
        reg.register_readme("s", "", "sample suite").unwrap();
        reg.register_readme("s", "a", "directory a").unwrap();
        reg.register_file("s", "a,x", "file x", || {
            let mut g = TestGroup::new(NullBackend);
            g.test("one")
                .desc("first")
                .params(|u| u.combine("n", [1, 2]))
                .test_fn(|_, _| async { Ok(()) })?;
            g.test("grp,two").unimplemented()?;
            Ok(g)
        })
        .unwrap();
        reg.register_file("s", "a,y", "", || -> CtsResult<TestGroup<NullBackend>> {
            Err(CtsError::failure("syntax error in spec"))
        })
        .unwrap();
        reg.register_file("s", "b", "file b", || {
            let mut g = TestGroup::new(NullBackend);
            g.test("three")
                .desc("third")
                .test_fn(|t, _| async move {
                    t.fail("always fails")?;
                    Ok(())
                })?;
            Ok(g)
        })
        .unwrap();
        Arc::new(reg)
    }

    pub(crate) async fn loaded(query: &str) -> TestTree {
        let mut tree = TestTree::load(sample_registry(), parse_query(query).unwrap())
            .await
            .unwrap();
        tree.load_all().await.unwrap();
        tree
    }

    fn leaf_queries(tree: &TestTree) -> Vec<String> {
        tree.leaves_under(tree.root())
            .into_iter()
            .map(|id| tree.node(id).query().to_string())
            .collect()
    }

    mod load_tests {
        use super::*;

        #[tokio::test]
        async fn test_skeleton_then_lazy_load() {
            let reg = sample_registry();
            let mut tree = TestTree::load(reg.clone(), parse_query("s:*").unwrap())
                .await
                .unwrap();
            assert!(reg.is_sealed());
            let x = tree.find("s:a,x:*").unwrap();
            assert_eq!(tree.node(x).load_state(), LoadState::Unloaded);
            assert!(!tree.is_loaded(x));
            assert!(tree.subtree_counts(tree.root()).is_none());
            assert_eq!(tree.node(tree.find("s:a,*").unwrap()).description(), Some("directory a"));
            assert_eq!(tree.node(tree.root()).description(), Some("sample suite"));

            tree.load_subtree(x).await.unwrap();
            assert_eq!(tree.node(x).load_state(), LoadState::Loaded);
            assert_eq!(
                tree.subtree_counts(x),
                Some(SubtreeCounts {
                    tests: 3,
                    nodes_with_todo: 1
                })
            );
            assert!(tree.subtree_counts(tree.root()).is_none());

            let before = tree.len();
            tree.load_subtree(x).await.unwrap();
            assert_eq!(tree.len(), before);
        }

        #[tokio::test]
        async fn test_node_queries() {
            let tree = loaded("s:*").await;
            for q in [
                "s:*",
                "s:a,*",
                "s:a,x:*",
                "s:a,x:one:*",
                r#"s:a,x:one:{"n":1}"#,
                "s:a,x:grp,*",
                "s:a,x:grp,two:*",
                "s:a,x:grp,two:{}",
                "s:b:*",
            ] {
                assert!(tree.find(q).is_some(), "missing node {q}");
            }
            assert!(matches!(
                tree.node(tree.find("s:a,x:grp,two:{}").unwrap()).kind(),
                NodeKind::Case(_)
            ));
            assert!(tree.node(tree.find("s:a,x:grp,two:*").unwrap()).is_unimplemented());
        }

        #[tokio::test]
        async fn test_load_error_leaf() {
            let tree = loaded("s:a,*").await;
            let id = tree.find("s:a,y:__load_error__:{}").unwrap();
            match tree.node(id).kind() {
                NodeKind::LoadError(message) => assert!(message.contains("syntax error")),
                other => panic!("unexpected kind {other:?}"),
            }
            assert!(tree.find("s:b:*").is_none());
        }

        #[tokio::test]
        async fn test_query_limits_cases() {
            let tree = loaded(r#"s:a,x:one:{"n":2}"#).await;
            assert_eq!(leaf_queries(&tree), vec![r#"s:a,x:one:{"n":2}"#]);
            assert!(tree.find("s:b:*").is_none());
            assert!(tree.find("s:a,y:*").is_none());
        }

        #[tokio::test]
        async fn test_counts_when_fully_loaded() {
            let tree = loaded("s:*").await;
            let counts = tree.subtree_counts(tree.root()).unwrap();
            assert_eq!(counts.tests, 5);
            // a,y has no description and grp,two is unimplemented
            assert_eq!(counts.nodes_with_todo, 2);
        }

        #[tokio::test]
        async fn test_counts_cover_every_leaf() {
            for query in ["s:*", "s:a,*", "s:a,y:*", "s:a,x:one:*", "s:b:three:*"] {
                let tree = loaded(query).await;
                let leaves = tree.leaves_under(tree.root());
                let counts = tree.subtree_counts(tree.root()).unwrap();
                assert_eq!(counts.tests, leaves.len(), "{query}");
                let walked = tree.iter().filter(|(_, _, node)| node.is_leaf()).count();
                assert_eq!(walked, leaves.len(), "{query}");

                let per_file: usize = tree
                    .iter()
                    .filter(|(_, _, node)| matches!(node.kind(), NodeKind::File))
                    .map(|(id, _, _)| tree.subtree_counts(id).unwrap().tests)
                    .sum();
                assert_eq!(per_file, leaves.len(), "{query}");
                for leaf in leaves {
                    assert!(tree.query().contains(tree.node(leaf).query()), "{query}");
                }
            }

            let tree = loaded("s:a,y:*").await;
            assert_eq!(leaf_queries(&tree), vec!["s:a,y:__load_error__:{}"]);
            assert_eq!(tree.subtree_counts(tree.root()).unwrap().tests, 1);
        }

        #[tokio::test]
        async fn test_unknown_query_targets() {
            let err = TestTree::load(sample_registry(), parse_query("s:zzz:*").unwrap())
                .await
                .unwrap_err();
            assert!(matches!(err, CtsError::NoTestsFound { .. }));
            let err = TestTree::load(sample_registry(), parse_query("nope:*").unwrap())
                .await
                .unwrap_err();
            assert!(matches!(err, CtsError::UnknownSuite { .. }));
        }

        #[tokio::test]
        async fn test_render_lists_every_node() {
            let tree = loaded("s:b:*").await;
            let text = tree.render();
            assert!(text.contains("s:*"));
            assert!(text.contains("  s:b:*"));
            assert!(text.contains("# third"));
            assert_eq!(text.lines().count(), tree.len());
        }
    }
}
