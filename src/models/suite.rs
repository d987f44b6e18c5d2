//! Suite/test tree
//!
//! Suites own their children, so a tree built from `SuiteNode` values is
//! acyclic by construction. Trees assembled from named declarations go
//! through [`TreeBuilder`], which rejects cycles and shared nodes.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::test_result::TestResult;
use crate::fixture::{CycleError, Fixture, FixtureScope};

/// Suite tree construction errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("suite cycle: {path}")]
    Cycle { path: String },

    #[error("'{name}' is referenced more than once in the tree")]
    DuplicateReference { name: String },

    #[error("'{name}' is declared more than once")]
    DuplicateDeclaration { name: String },

    #[error("suite '{suite}' already has a child named '{name}'")]
    DuplicateName { suite: String, name: String },

    #[error("unknown suite or test '{name}'")]
    Unknown { name: String },

    #[error(transparent)]
    FixtureCycle(#[from] CycleError),
}

/// Body of a test: records its outcome in the result, or returns an error
pub type TestBody = Arc<dyn Fn(&mut TestResult, &FixtureScope) -> anyhow::Result<()> + Send + Sync>;

/// Leaf unit of execution
#[derive(Clone)]
pub struct TestNode {
    pub name: String,
    pub fixtures: FixtureScope,
    pub tags: Vec<String>,
    pub body: TestBody,
}

impl TestNode {
    pub fn new<F>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(&mut TestResult, &FixtureScope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            fixtures: FixtureScope::new(),
            tags: Vec::new(),
            body: Arc::new(body),
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_fixture(mut self, fixture: Arc<Fixture>) -> Self {
        self.fixtures = self.fixtures.with(fixture);
        self
    }

    pub fn with_fixtures(mut self, fixtures: FixtureScope) -> Self {
        self.fixtures = self.fixtures.merge(&fixtures);
        self
    }
}

impl fmt::Debug for TestNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestNode")
            .field("name", &self.name)
            .field("fixtures", &self.fixtures.names().collect::<Vec<_>>())
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Ordered container of tests and nested suites
#[derive(Clone, Debug)]
pub struct SuiteNode {
    pub name: String,
    pub items: Vec<SuiteItem>,
    pub fixtures: FixtureScope,
    /// Tags shared by every descendant test
    pub tags: Vec<String>,
    /// Stop at the first child that errors or fails
    pub failfast: bool,
    /// Declared only; children always run in order
    pub parallelizable: bool,
}

/// A child of a suite
#[derive(Clone, Debug)]
pub enum SuiteItem {
    Test(TestNode),
    Suite(SuiteNode),
}

impl SuiteItem {
    pub fn name(&self) -> &str {
        match self {
            SuiteItem::Test(test) => &test.name,
            SuiteItem::Suite(suite) => &suite.name,
        }
    }

    pub fn as_node(&self) -> NodeRef<'_> {
        match self {
            SuiteItem::Test(test) => NodeRef::Test(test),
            SuiteItem::Suite(suite) => NodeRef::Suite(suite),
        }
    }
}

impl From<TestNode> for SuiteItem {
    fn from(test: TestNode) -> Self {
        SuiteItem::Test(test)
    }
}

impl From<SuiteNode> for SuiteItem {
    fn from(suite: SuiteNode) -> Self {
        SuiteItem::Suite(suite)
    }
}

/// Borrowed view of any node, including the root suite
#[derive(Clone, Copy, Debug)]
pub enum NodeRef<'a> {
    Test(&'a TestNode),
    Suite(&'a SuiteNode),
}

impl<'a> NodeRef<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            NodeRef::Test(test) => &test.name,
            NodeRef::Suite(suite) => &suite.name,
        }
    }

    pub fn fixtures(&self) -> &'a FixtureScope {
        match self {
            NodeRef::Test(test) => &test.fixtures,
            NodeRef::Suite(suite) => &suite.fixtures,
        }
    }
}

impl SuiteNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
            fixtures: FixtureScope::new(),
            tags: Vec::new(),
            failfast: false,
            parallelizable: false,
        }
    }

    pub fn with_failfast(mut self, failfast: bool) -> Self {
        self.failfast = failfast;
        self
    }

    pub fn with_parallelizable(mut self, parallelizable: bool) -> Self {
        self.parallelizable = parallelizable;
        self
    }

    pub fn with_fixture(mut self, fixture: Arc<Fixture>) -> Self {
        self.fixtures = self.fixtures.with(fixture);
        self
    }

    pub fn with_fixtures(mut self, fixtures: FixtureScope) -> Self {
        self.fixtures = self.fixtures.merge(&fixtures);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Append children in order, rejecting names already used in this suite
    pub fn add_items<I>(&mut self, items: I) -> Result<(), TreeError>
    where
        I: IntoIterator,
        I::Item: Into<SuiteItem>,
    {
        for item in items {
            let item = item.into();
            if self.items.iter().any(|existing| existing.name() == item.name()) {
                return Err(TreeError::DuplicateName {
                    suite: self.name.clone(),
                    name: item.name().to_string(),
                });
            }
            self.items.push(item);
        }
        Ok(())
    }

    /// In-order traversal: every suite before its children, with UIDs
    pub fn walk(&self) -> Walk<'_> {
        Walk {
            root: Some(self),
            stack: Vec::new(),
        }
    }

    /// Leaves-only traversal
    pub fn tests(&self) -> impl Iterator<Item = (String, &TestNode)> {
        self.walk().filter_map(|(uid, node)| match node {
            NodeRef::Test(test) => Some((uid, test)),
            NodeRef::Suite(_) => None,
        })
    }

    pub fn suites(&self) -> impl Iterator<Item = (String, &SuiteNode)> {
        self.walk().filter_map(|(uid, node)| match node {
            NodeRef::Suite(suite) => Some((uid, suite)),
            NodeRef::Test(_) => None,
        })
    }

    pub fn find(&self, uid: &str) -> Option<NodeRef<'_>> {
        self.walk().find(|(u, _)| u == uid).map(|(_, node)| node)
    }

    /// Every fixture reachable from any node, including transitive
    /// requirements, in first-seen order
    pub fn enumerate_fixtures(&self) -> Vec<Arc<Fixture>> {
        let mut found: Vec<Arc<Fixture>> = Vec::new();
        for (_, node) in self.walk() {
            for fixture in node.fixtures().fixtures() {
                let reachable = std::iter::once(Arc::clone(fixture)).chain(fixture.transitive_requires());
                for candidate in reachable {
                    if !found.iter().any(|f| Arc::ptr_eq(f, &candidate)) {
                        found.push(candidate);
                    }
                }
            }
        }
        found
    }

    pub fn test_count(&self) -> usize {
        self.tests().count()
    }

    /// Every tag used anywhere in the tree, sorted
    pub fn tags(&self) -> BTreeSet<&str> {
        self.walk()
            .flat_map(|(_, node)| match node {
                NodeRef::Test(test) => test.tags.iter(),
                NodeRef::Suite(suite) => suite.tags.iter(),
            })
            .map(String::as_str)
            .collect()
    }

    /// UIDs of tests carrying `tag` themselves or through an ancestor suite
    pub fn tests_with_tag(&self, tag: &str) -> Vec<String> {
        let mut uids = Vec::new();
        collect_tagged(self, &self.name, tag, false, &mut uids);
        uids
    }
}

fn collect_tagged(suite: &SuiteNode, uid: &str, tag: &str, inherited: bool, out: &mut Vec<String>) {
    let tagged = inherited || suite.tags.iter().any(|t| t == tag);
    for item in &suite.items {
        let child_uid = format!("{uid}/{}", item.name());
        match item {
            SuiteItem::Test(test) => {
                if tagged || test.tags.iter().any(|t| t == tag) {
                    out.push(child_uid);
                }
            }
            SuiteItem::Suite(nested) => collect_tagged(nested, &child_uid, tag, tagged, out),
        }
    }
}

/// Iterator returned by [`SuiteNode::walk`]
pub struct Walk<'a> {
    root: Option<&'a SuiteNode>,
    stack: Vec<(String, std::slice::Iter<'a, SuiteItem>)>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = (String, NodeRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(root) = self.root.take() {
            self.stack.push((root.name.clone(), root.items.iter()));
            return Some((root.name.clone(), NodeRef::Suite(root)));
        }

        loop {
            let (prefix, items) = self.stack.last_mut()?;
            let Some(item) = items.next() else {
                self.stack.pop();
                continue;
            };
            let uid = format!("{prefix}/{}", item.name());
            if let SuiteItem::Suite(suite) = item {
                self.stack.push((uid.clone(), suite.items.iter()));
            }
            return Some((uid, item.as_node()));
        }
    }
}

struct SuiteDecl {
    node: SuiteNode,
    items: Vec<String>,
}

/// Assembles a suite tree from nodes declared and linked by name
#[derive(Default)]
pub struct TreeBuilder {
    tests: HashMap<String, TestNode>,
    suites: HashMap<String, SuiteDecl>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_free(&self, name: &str) -> Result<(), TreeError> {
        if self.tests.contains_key(name) || self.suites.contains_key(name) {
            return Err(TreeError::DuplicateDeclaration {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    pub fn test(&mut self, test: TestNode) -> Result<&mut Self, TreeError> {
        self.check_free(&test.name)?;
        self.tests.insert(test.name.clone(), test);
        Ok(self)
    }

    /// Declare a suite whose children are the named items, in order
    pub fn suite<I, S>(&mut self, suite: SuiteNode, items: I) -> Result<&mut Self, TreeError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.check_free(&suite.name)?;
        let items = items.into_iter().map(Into::into).collect();
        self.suites
            .insert(suite.name.clone(), SuiteDecl { node: suite, items });
        Ok(self)
    }

    /// Names declared but not reachable from `root`
    pub fn unreferenced(&self, root: &str) -> Vec<String> {
        let mut reachable = HashSet::new();
        let mut pending = vec![root.to_string()];
        while let Some(name) = pending.pop() {
            if !reachable.insert(name.clone()) {
                continue;
            }
            if let Some(decl) = self.suites.get(&name) {
                pending.extend(decl.items.iter().cloned());
            }
        }
        let mut names: Vec<String> = self
            .tests
            .keys()
            .chain(self.suites.keys())
            .filter(|name| !reachable.contains(*name))
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Build the owned tree rooted at the named suite
    pub fn build(&self, root: &str) -> Result<SuiteNode, TreeError> {
        let mut stack = Vec::new();
        let mut placed = HashSet::new();
        self.build_suite(root, &mut stack, &mut placed)
    }

    fn build_suite<'a>(
        &'a self,
        name: &'a str,
        stack: &mut Vec<&'a str>,
        placed: &mut HashSet<&'a str>,
    ) -> Result<SuiteNode, TreeError> {
        if stack.contains(&name) {
            let mut path: Vec<&str> = stack.clone();
            path.push(name);
            return Err(TreeError::Cycle {
                path: path.join(" -> "),
            });
        }
        let decl = self.suites.get(name).ok_or_else(|| TreeError::Unknown {
            name: name.to_string(),
        })?;
        if !placed.insert(name) {
            return Err(TreeError::DuplicateReference {
                name: name.to_string(),
            });
        }

        stack.push(name);
        let mut node = decl.node.clone();
        for child in &decl.items {
            let item = if let Some(test) = self.tests.get(child) {
                if !placed.insert(child) {
                    return Err(TreeError::DuplicateReference {
                        name: child.clone(),
                    });
                }
                SuiteItem::Test(test.clone())
            } else {
                SuiteItem::Suite(self.build_suite(child, stack, placed)?)
            };
            node.add_items([item])?;
        }
        stack.pop();

        Ok(node)
    }
}
