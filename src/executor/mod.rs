//! Test execution engine
//!
//! Runs a suite tree sequentially, depth-first.

mod runner;

pub use runner::Runner;
