//! Data models for test execution
//!
//! The suite/test tree that gets executed and the result tree it produces.

mod suite;
mod test_result;

pub use suite::{NodeRef, SuiteItem, SuiteNode, TestNode, TreeBuilder, TreeError};
pub use test_result::{aggregate, Outcome, ResultNode, SuiteResult, TestResult};
