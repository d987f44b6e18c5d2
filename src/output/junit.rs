//! JUnit XML reports
//!
//! JUnit has no nested suites, so the result tree is flattened first: every
//! suite that directly owns tests becomes one report suite, and pure
//! containers disappear.

use anyhow::{Context, Result};
use quick_junit::{NonSuccessKind, Report, TestCase, TestCaseStatus, TestSuite};
use std::path::Path;
use std::time::Duration;

use crate::models::{Outcome, SuiteResult, TestResult};

/// A suite of the flattened result tree
#[derive(Clone, Debug)]
pub struct FlatSuite<'a> {
    pub name: &'a str,
    pub uid: &'a str,
    pub elapsed: Duration,
    pub tests: Vec<&'a TestResult>,
}

impl FlatSuite<'_> {
    /// Aggregate outcome of the suite's own tests
    pub fn outcome(&self) -> Outcome {
        crate::models::aggregate(self.tests.iter().map(|t| t.outcome()))
    }
}

/// Flatten a result tree in pre-order.
///
/// Test count and order are preserved; suites without direct tests are
/// never emitted.
pub fn flatten(root: &SuiteResult) -> Vec<FlatSuite<'_>> {
    let mut suites = Vec::new();
    flatten_into(root, &mut suites);
    suites
}

fn flatten_into<'a>(suite: &'a SuiteResult, out: &mut Vec<FlatSuite<'a>>) {
    let tests: Vec<&TestResult> = suite.direct_tests().collect();
    if !tests.is_empty() {
        out.push(FlatSuite {
            name: &suite.name,
            uid: &suite.uid,
            elapsed: suite.elapsed,
            tests,
        });
    }
    for nested in suite.direct_suites() {
        flatten_into(nested, out);
    }
}

/// Renders results as a JUnit report
pub struct JUnitFormatter {
    translate_names: bool,
}

impl JUnitFormatter {
    pub fn new() -> Self {
        Self {
            translate_names: true,
        }
    }

    /// Keep `/` and `.` in names as they are
    pub fn with_translate_names(mut self, translate: bool) -> Self {
        self.translate_names = translate;
        self
    }

    fn report_name(&self, name: &str) -> String {
        if !self.translate_names {
            return name.to_string();
        }
        name.chars()
            .map(|c| match c {
                '/' => '.',
                '.' => '-',
                other => other,
            })
            .collect()
    }

    pub fn report(&self, root: &SuiteResult) -> Report {
        let mut report = Report::new(self.report_name(&root.name));
        report.set_time(root.elapsed);

        for flat in flatten(root) {
            let classname = self.report_name(flat.uid);
            let mut suite = TestSuite::new(self.report_name(flat.name));
            suite.set_time(flat.elapsed);
            let skipped = flat
                .tests
                .iter()
                .filter(|t| t.outcome() == Outcome::Skip)
                .count();
            suite
                .extra
                .insert("skipped".into(), skipped.to_string().into());

            for test in &flat.tests {
                let mut status = match test.outcome() {
                    Outcome::Pass | Outcome::Xfail => TestCaseStatus::success(),
                    Outcome::Skip => TestCaseStatus::skipped(),
                    Outcome::Error => TestCaseStatus::non_success(NonSuccessKind::Error),
                    Outcome::Fail => TestCaseStatus::non_success(NonSuccessKind::Failure),
                };
                if !test.outcome().is_passing() {
                    if let Some(reason) = &test.reason {
                        status.set_message(reason.as_str());
                    }
                }

                let mut case = TestCase::new(self.report_name(&test.name), status);
                case.set_classname(classname.as_str());
                case.set_time(test.elapsed);
                suite.add_test_case(case);
            }

            report.add_test_suite(suite);
        }

        report
    }

    pub fn render(&self, root: &SuiteResult) -> Result<String> {
        self.report(root)
            .to_string()
            .context("Failed to serialize JUnit report")
    }

    /// Write the report, creating parent directories as needed
    pub fn write(&self, root: &SuiteResult, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let xml = self.render(root)?;
        std::fs::write(path, xml)
            .with_context(|| format!("Failed to write JUnit report: {}", path.display()))?;
        Ok(())
    }
}

impl Default for JUnitFormatter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResultNode;

    fn test(name: &str, parent: &str, outcome: Outcome) -> ResultNode {
        let mut result = TestResult::new(name, format!("{parent}/{name}"));
        result.set_outcome(outcome);
        ResultNode::Test(result)
    }

    fn suite(name: &str, uid: &str, children: Vec<ResultNode>) -> SuiteResult {
        let mut result = SuiteResult::new(name, uid);
        for child in children {
            result.push(child);
        }
        result
    }

    fn names<'a>(flat: &[FlatSuite<'a>]) -> Vec<(&'a str, Vec<&'a str>)> {
        flat.iter()
            .map(|s| (s.name, s.tests.iter().map(|t| t.name.as_str()).collect()))
            .collect()
    }

    #[test]
    fn test_container_is_not_emitted() {
        let suite_a = suite(
            "SuiteA",
            "Root/SuiteA",
            vec![test("Test1", "Root/SuiteA", Outcome::Pass)],
        );
        let suite_b = suite(
            "SuiteB",
            "Root/Container/SuiteB",
            vec![
                test("Test2", "Root/Container/SuiteB", Outcome::Pass),
                test("Test3", "Root/Container/SuiteB", Outcome::Fail),
            ],
        );
        let container = suite("Container", "Root/Container", vec![ResultNode::Suite(suite_b)]);
        let root = suite(
            "Root",
            "Root",
            vec![ResultNode::Suite(suite_a), ResultNode::Suite(container)],
        );

        let flat = flatten(&root);
        assert_eq!(
            names(&flat),
            vec![("SuiteA", vec!["Test1"]), ("SuiteB", vec!["Test2", "Test3"])]
        );
        assert_eq!(flat[1].outcome(), Outcome::Fail);
    }

    #[test]
    fn test_flat_tree_is_unchanged() {
        let root = suite(
            "Root",
            "Root",
            vec![
                test("a", "Root", Outcome::Pass),
                test("b", "Root", Outcome::Skip),
                test("c", "Root", Outcome::Error),
            ],
        );
        let flat = flatten(&root);
        assert_eq!(names(&flat), vec![("Root", vec!["a", "b", "c"])]);
        assert_eq!(flat[0].tests.len(), root.iter_tests().len());
    }

    #[test]
    fn test_mixed_suite_keeps_direct_tests_and_nested_order() {
        let inner = suite("inner", "r/inner", vec![test("x", "r/inner", Outcome::Pass)]);
        let root = suite(
            "r",
            "r",
            vec![
                test("a", "r", Outcome::Pass),
                ResultNode::Suite(inner),
                test("b", "r", Outcome::Pass),
            ],
        );
        let flat = flatten(&root);
        assert_eq!(names(&flat), vec![("r", vec!["a", "b"]), ("inner", vec!["x"])]);
        let total: usize = flat.iter().map(|s| s.tests.len()).sum();
        assert_eq!(total, root.iter_tests().len());
    }

    #[test]
    fn test_empty_containers_vanish() {
        let empty = suite("empty", "r/empty", vec![]);
        let hollow = suite("hollow", "r/hollow", vec![ResultNode::Suite(empty)]);
        let root = suite("r", "r", vec![ResultNode::Suite(hollow)]);
        assert!(flatten(&root).is_empty());
    }

    #[test]
    fn test_report_counts_and_names() {
        let mut failed = TestResult::new("broken", "root/dir.v2/broken");
        failed.fail("exit status 1");
        let nested = suite(
            "dir.v2",
            "root/dir.v2",
            vec![
                test("ok", "root/dir.v2", Outcome::Pass),
                test("later", "root/dir.v2", Outcome::Skip),
                ResultNode::Test(failed),
                test("env", "root/dir.v2", Outcome::Error),
            ],
        );
        let root = suite("root", "root", vec![ResultNode::Suite(nested)]);

        let report = JUnitFormatter::new().report(&root);
        assert_eq!(report.test_suites.len(), 1);
        let junit_suite = &report.test_suites[0];
        assert_eq!(junit_suite.name.as_str(), "dir-v2");
        assert_eq!(
            junit_suite.test_cases[0].classname.as_ref().map(|c| c.as_str()),
            Some("root.dir-v2")
        );
        assert_eq!(junit_suite.tests, 4);
        assert_eq!(junit_suite.failures, 1);
        assert_eq!(junit_suite.errors, 1);
        assert_eq!(junit_suite.disabled, 1);

        let xml = JUnitFormatter::new().render(&root).unwrap();
        assert!(xml.contains("<testsuites"));
        assert!(xml.contains("<skipped"));
        assert!(xml.contains("skipped=\"1\""));
        assert!(xml.contains("<failure"));
        assert!(xml.contains("exit status 1"));
        assert!(xml.contains("<error"));
    }

    #[test]
    fn test_untranslated_names() {
        let root = suite("r", "r", vec![test("a.b", "r", Outcome::Pass)]);
        let report = JUnitFormatter::new()
            .with_translate_names(false)
            .report(&root);
        assert_eq!(report.test_suites[0].test_cases[0].name.as_str(), "a.b");
    }

    #[test]
    fn test_write_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/junit.xml");
        let root = suite("r", "r", vec![test("a", "r", Outcome::Pass)]);
        JUnitFormatter::new().write(&root, &path).unwrap();
        assert!(std::fs::read_to_string(path).unwrap().contains("testcase"));
    }
}
