//! Test execution runner
//!
//! Walks a suite tree depth-first, resolving fixtures per scope, and
//! builds the mirrored result tree.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::RunConfig;
use crate::fixture::{Fixture, FixtureScope, FixtureState};
use crate::models::{Outcome, ResultNode, SuiteItem, SuiteNode, SuiteResult, TestNode, TestResult};
use crate::utils::{panic_message, Timer};

/// Errors that prevent a run from starting
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("no suite or test with UID '{uid}'")]
    UnknownUid { uid: String },
}

/// Part of the tree selected for execution
#[derive(Clone, Copy, Debug)]
enum Selection<'u> {
    All,
    Only(&'u [String]),
}

impl<'u> Selection<'u> {
    /// Selection for a child, or `None` when the child is not visited
    fn child(self, uid: &str) -> Option<Selection<'u>> {
        match self {
            Selection::All => Some(Selection::All),
            Selection::Only(targets) => {
                if targets.iter().any(|t| t == uid) {
                    Some(Selection::All)
                } else if targets
                    .iter()
                    .any(|t| t.len() > uid.len() && t.starts_with(uid) && t.as_bytes()[uid.len()] == b'/')
                {
                    Some(Selection::Only(targets))
                } else {
                    None
                }
            }
        }
    }
}

/// Sequential runner for a suite tree
pub struct Runner<'a> {
    config: &'a RunConfig,
    /// `build_once` fixtures released at the end of the run, in setup order
    deferred: Vec<Arc<Fixture>>,
}

impl<'a> Runner<'a> {
    pub fn new(config: &'a RunConfig) -> Self {
        Self {
            config,
            deferred: Vec::new(),
        }
    }

    /// Run the whole tree, or only `config.uid` when it is set
    pub fn execute(&mut self, root: &SuiteNode) -> Result<SuiteResult, RunError> {
        match &self.config.uid {
            Some(uid) => self.run_uids(root, std::slice::from_ref(uid)),
            None => Ok(self.run(root)),
        }
    }

    /// Run every test in the tree
    pub fn run(&mut self, root: &SuiteNode) -> SuiteResult {
        info!("Running {} tests from {}", root.test_count(), root.name);
        self.setup_eager(root);
        let result = self.run_suite(root, &FixtureScope::new(), &root.name, Selection::All);
        self.finish();
        result
    }

    /// Run only the subtrees named by `uids`.
    ///
    /// Ancestor scopes of every target have their fixtures set up and torn
    /// down as usual. The result tree holds only the visited nodes.
    pub fn run_uids(&mut self, root: &SuiteNode, uids: &[String]) -> Result<SuiteResult, RunError> {
        if let Some(uid) = uids.iter().find(|uid| root.find(uid).is_none()) {
            return Err(RunError::UnknownUid { uid: uid.clone() });
        }

        info!("Running {} selected node(s) from {}", uids.len(), root.name);
        let selection = if uids.iter().any(|uid| *uid == root.name) {
            Selection::All
        } else {
            Selection::Only(uids)
        };

        self.setup_eager(root);
        let result = self.run_suite(root, &FixtureScope::new(), &root.name, selection);
        self.finish();
        Ok(result)
    }

    /// Set up `build_once` fixtures that are not lazily initialized
    fn setup_eager(&mut self, root: &SuiteNode) {
        for fixture in root.enumerate_fixtures() {
            if fixture.is_lazy() || !fixture.is_build_once() {
                continue;
            }
            debug!("Eager setup of fixture {}", fixture.name());
            if let Err(err) = fixture.setup(self.config) {
                debug!("Eager setup failed, dependents will report it: {}", err);
            }
            self.defer(&fixture);
        }
    }

    /// Release every deferred fixture in reverse setup order
    fn finish(&mut self) {
        for fixture in self.deferred.drain(..).rev() {
            if let Err(err) = fixture.teardown() {
                warn!("{}", err);
            }
        }
    }

    /// Remember `build_once` fixtures touched by a setup, requirements first
    fn defer(&mut self, fixture: &Arc<Fixture>) {
        for dep in fixture.requires() {
            self.defer(&dep);
        }
        if fixture.is_build_once()
            && fixture.state() != FixtureState::Uninitialized
            && !self.deferred.iter().any(|f| Arc::ptr_eq(f, fixture))
        {
            self.deferred.push(Arc::clone(fixture));
        }
    }

    /// Set up the fixtures a scope owns, stopping at the first failure
    fn acquire(&mut self, own: &FixtureScope) -> Result<(), String> {
        for fixture in own.fixtures() {
            let outcome = fixture.setup(self.config);
            self.defer(fixture);
            if let Err(err) = outcome {
                return Err(err.to_string());
            }
        }
        Ok(())
    }

    /// Tear down the fixtures a scope owns; `build_once` ones wait for the end
    fn release(&mut self, own: &FixtureScope) {
        for fixture in own.fixtures().rev() {
            if fixture.is_build_once() {
                continue;
            }
            if let Err(err) = fixture.teardown() {
                warn!("{}", err);
            }
        }
    }

    fn run_suite(
        &mut self,
        suite: &SuiteNode,
        inherited: &FixtureScope,
        uid: &str,
        selection: Selection<'_>,
    ) -> SuiteResult {
        let timer = Timer::start(uid);
        let mut result = SuiteResult::new(&suite.name, uid);
        let scope = inherited.merge(&suite.fixtures);

        debug!("Entering suite {}", uid);
        match self.acquire(&suite.fixtures) {
            Ok(()) => self.run_children(suite, &scope, uid, selection, &mut result),
            Err(reason) => {
                error!("Suite {} fixture setup failed: {}", uid, reason);
                mirror_errors(suite, uid, selection, &reason, &mut result);
            }
        }
        self.release(&suite.fixtures);

        result.elapsed = timer.stop();
        info!("Suite {} finished: {}", uid, result.outcome());
        result
    }

    fn run_children(
        &mut self,
        suite: &SuiteNode,
        scope: &FixtureScope,
        uid: &str,
        selection: Selection<'_>,
        result: &mut SuiteResult,
    ) {
        let failfast = self.config.failfast_for(suite.failfast);
        let mut halted_by: Option<String> = None;

        for item in &suite.items {
            let child_uid = format!("{uid}/{}", item.name());
            let Some(child_selection) = selection.child(&child_uid) else {
                continue;
            };

            let child = match (&halted_by, item) {
                (Some(failed), SuiteItem::Test(test)) => ResultNode::Test(TestResult::skipped(
                    &test.name,
                    &child_uid,
                    format!("skipped after failure of {failed}"),
                )),
                (Some(_), SuiteItem::Suite(nested)) => {
                    ResultNode::Suite(SuiteResult::new(&nested.name, &child_uid))
                }
                (None, SuiteItem::Test(test)) => {
                    ResultNode::Test(self.run_test(test, scope, &child_uid))
                }
                (None, SuiteItem::Suite(nested)) => {
                    ResultNode::Suite(self.run_suite(nested, scope, &child_uid, child_selection))
                }
            };

            if failfast && halted_by.is_none() && child.outcome().halts_failfast() {
                info!("Failfast: {} did not pass, skipping the rest of {}", child_uid, uid);
                halted_by = Some(child_uid);
            }
            result.push(child);
        }
    }

    fn run_test(&mut self, test: &TestNode, inherited: &FixtureScope, uid: &str) -> TestResult {
        let mut result = TestResult::new(&test.name, uid);
        let scope = inherited.merge(&test.fixtures);

        if let Err(reason) = self.acquire(&test.fixtures) {
            result.set(Outcome::Error, reason);
            self.release(&test.fixtures);
            info!("  {}", result);
            return result;
        }

        let timer = Timer::start(uid);
        let outcome = catch_unwind(AssertUnwindSafe(|| (*test.body)(&mut result, &scope)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(err)) => result.fail(format!("{err:#}")),
            Err(payload) => result.fail(panic_message(payload)),
        }
        if result.outcome.is_none() {
            result.set_outcome(Outcome::Pass);
        }
        result.elapsed = timer.stop();

        self.release(&test.fixtures);
        info!("  {}", result);
        result
    }
}

/// Fill `result` with ERROR for every selected descendant test of `suite`
fn mirror_errors(
    suite: &SuiteNode,
    uid: &str,
    selection: Selection<'_>,
    reason: &str,
    result: &mut SuiteResult,
) {
    for item in &suite.items {
        let child_uid = format!("{uid}/{}", item.name());
        let Some(child_selection) = selection.child(&child_uid) else {
            continue;
        };
        match item {
            SuiteItem::Test(test) => {
                result.push(ResultNode::Test(TestResult::errored(&test.name, &child_uid, reason)));
            }
            SuiteItem::Suite(nested) => {
                let mut nested_result = SuiteResult::new(&nested.name, &child_uid);
                mirror_errors(nested, &child_uid, child_selection, reason, &mut nested_result);
                result.push(ResultNode::Suite(nested_result));
            }
        }
    }
}
