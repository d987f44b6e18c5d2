//! Result models for test execution
//!
//! Defines outcomes, per-test results and the suite result tree.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Outcome of a test or suite
///
/// Declaration order is the order used for tables and reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Outcome {
    /// The test passed.
    Pass,
    /// The test ran and failed as expected.
    Xfail,
    /// The test was skipped.
    Skip,
    /// Something outside the test body went wrong, usually fixture setup.
    Error,
    /// The test failed.
    Fail,
}

impl Outcome {
    /// All outcomes in table order
    pub const ALL: [Outcome; 5] = [
        Outcome::Pass,
        Outcome::Xfail,
        Outcome::Skip,
        Outcome::Error,
        Outcome::Fail,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Pass => "PASS",
            Outcome::Xfail => "XFAIL",
            Outcome::Skip => "SKIP",
            Outcome::Error => "ERROR",
            Outcome::Fail => "FAIL",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Outcome::Pass => "✓",
            Outcome::Xfail => "✓",
            Outcome::Skip => "○",
            Outcome::Error => "!",
            Outcome::Fail => "✗",
        }
    }

    /// Outcomes that halt a failfast suite
    pub fn halts_failfast(&self) -> bool {
        matches!(self, Outcome::Error | Outcome::Fail)
    }

    /// Outcomes reported as passing in flat reports
    pub fn is_passing(&self) -> bool {
        matches!(self, Outcome::Pass | Outcome::Xfail)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Aggregate child outcomes into a suite outcome.
///
/// ERROR wins as soon as it is seen. Otherwise any FAIL gives FAIL, all
/// SKIP (including no children at all) gives SKIP, and anything else is
/// PASS.
pub fn aggregate<I>(outcomes: I) -> Outcome
where
    I: IntoIterator<Item = Outcome>,
{
    let mut failed = false;
    let mut all_skipped = true;

    for outcome in outcomes {
        match outcome {
            Outcome::Error => return Outcome::Error,
            Outcome::Fail => {
                failed = true;
                all_skipped = false;
            }
            Outcome::Skip => {}
            Outcome::Pass | Outcome::Xfail => all_skipped = false,
        }
    }

    if failed {
        Outcome::Fail
    } else if all_skipped {
        Outcome::Skip
    } else {
        Outcome::Pass
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub uid: String,
    /// Unset until the test body or the runner decides
    pub outcome: Option<Outcome>,
    pub elapsed: Duration,
    pub reason: Option<String>,
}

impl TestResult {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            outcome: None,
            elapsed: Duration::ZERO,
            reason: None,
        }
    }

    pub fn skipped(name: impl Into<String>, uid: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::new(name, uid);
        result.set(Outcome::Skip, reason);
        result
    }

    pub fn errored(name: impl Into<String>, uid: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut result = Self::new(name, uid);
        result.set(Outcome::Error, reason);
        result
    }

    /// Outcome of the test, PASS when nothing was recorded
    pub fn outcome(&self) -> Outcome {
        self.outcome.unwrap_or(Outcome::Pass)
    }

    pub fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = Some(outcome);
    }

    /// Record an outcome together with its reason
    pub fn set(&mut self, outcome: Outcome, reason: impl Into<String>) {
        self.outcome = Some(outcome);
        self.reason = Some(reason.into());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.set(Outcome::Fail, reason);
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.set(Outcome::Skip, reason);
    }

    pub fn xfail(&mut self, reason: impl Into<String>) {
        self.set(Outcome::Xfail, reason);
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.outcome().symbol(),
            self.uid,
            self.elapsed.as_millis()
        )?;
        if let Some(reason) = &self.reason {
            write!(f, " - {reason}")?;
        }
        Ok(())
    }
}

/// Result of a suite, mirroring the suite's children in order
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteResult {
    pub name: String,
    pub uid: String,
    pub elapsed: Duration,
    pub children: Vec<ResultNode>,
}

impl SuiteResult {
    pub fn new(name: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            elapsed: Duration::ZERO,
            children: Vec::new(),
        }
    }

    pub fn push(&mut self, child: ResultNode) {
        self.children.push(child);
    }

    /// Outcome computed from the direct children
    pub fn outcome(&self) -> Outcome {
        aggregate(self.children.iter().map(ResultNode::outcome))
    }

    /// Test results owned directly by this suite
    pub fn direct_tests(&self) -> impl Iterator<Item = &TestResult> {
        self.children.iter().filter_map(|child| match child {
            ResultNode::Test(test) => Some(test),
            ResultNode::Suite(_) => None,
        })
    }

    /// Suite results nested directly in this suite
    pub fn direct_suites(&self) -> impl Iterator<Item = &SuiteResult> {
        self.children.iter().filter_map(|child| match child {
            ResultNode::Suite(suite) => Some(suite),
            ResultNode::Test(_) => None,
        })
    }

    /// Every test result in the tree, in order
    pub fn iter_tests(&self) -> Vec<&TestResult> {
        let mut tests = Vec::new();
        collect_tests(self, &mut tests);
        tests
    }

    /// Count of test results per outcome, in table order
    pub fn counts(&self) -> Vec<(Outcome, usize)> {
        let tests = self.iter_tests();
        Outcome::ALL
            .iter()
            .map(|outcome| {
                let count = tests.iter().filter(|t| t.outcome() == *outcome).count();
                (*outcome, count)
            })
            .collect()
    }
}

fn collect_tests<'a>(suite: &'a SuiteResult, out: &mut Vec<&'a TestResult>) {
    for child in &suite.children {
        match child {
            ResultNode::Test(test) => out.push(test),
            ResultNode::Suite(nested) => collect_tests(nested, out),
        }
    }
}

/// A node of the result tree
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultNode {
    Test(TestResult),
    Suite(SuiteResult),
}

impl ResultNode {
    pub fn outcome(&self) -> Outcome {
        match self {
            ResultNode::Test(test) => test.outcome(),
            ResultNode::Suite(suite) => suite.outcome(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ResultNode::Test(test) => &test.name,
            ResultNode::Suite(suite) => &suite.name,
        }
    }

    pub fn uid(&self) -> &str {
        match self {
            ResultNode::Test(test) => &test.uid,
            ResultNode::Suite(suite) => &suite.uid,
        }
    }
}
