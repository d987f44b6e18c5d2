//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Hierarchical test runner with scoped fixtures
#[derive(Parser, Debug)]
#[command(name = "arbortest")]
#[command(version)]
#[command(about = "Run suites of tests declared in YAML manifests")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (repeatable)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Config file (defaults to arbortest.yaml in the root directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run discovered tests
    Run(RunArgs),

    /// Rerun the tests of suites that failed or errored in the last run
    Rerun(RerunArgs),

    /// List suites, tests and fixtures without running them
    List(ListArgs),
}

/// Output options shared by run and rerun
#[derive(ClapArgs, Debug)]
pub struct OutputArgs {
    /// Directory for reports and the result snapshot
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Console format (table, json, json-pretty, summary)
    #[arg(short, long, default_value = "table")]
    pub format: String,

    /// Disable colors
    #[arg(long)]
    pub no_color: bool,

    /// Also export results to this file (.json or .csv)
    #[arg(short, long)]
    pub export: Option<PathBuf>,
}

/// Arguments for run command
#[derive(ClapArgs, Debug)]
pub struct RunArgs {
    /// Root directory to discover tests in
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// Only run the suite or test with this UID
    #[arg(short, long)]
    pub uid: Option<String>,

    /// Stop every suite at its first failure
    #[arg(long, conflicts_with = "no_failfast")]
    pub failfast: bool,

    /// Never stop suites early
    #[arg(long)]
    pub no_failfast: bool,

    #[command(flatten)]
    pub output: OutputArgs,
}

impl RunArgs {
    /// Failfast override given on the command line
    pub fn failfast_override(&self) -> Option<bool> {
        match (self.failfast, self.no_failfast) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

/// Arguments for rerun command
#[derive(ClapArgs, Debug)]
pub struct RerunArgs {
    /// Root directory to discover tests in
    #[arg(default_value = ".")]
    pub root: PathBuf,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for list command
#[derive(ClapArgs, Debug)]
pub struct ListArgs {
    /// Root directory to discover tests in
    #[arg(default_value = ".")]
    pub root: PathBuf,

    /// List suites
    #[arg(long)]
    pub suites: bool,

    /// List tests
    #[arg(long)]
    pub tests: bool,

    /// List fixtures
    #[arg(long)]
    pub fixtures: bool,

    /// List tags
    #[arg(long)]
    pub tags: bool,

    /// Only list tests carrying this tag
    #[arg(long, value_name = "TAG")]
    pub tag: Option<String>,

    /// Print full UIDs instead of an indented tree
    #[arg(long)]
    pub uids: bool,
}

impl ListArgs {
    /// No selector means everything
    pub fn all(&self) -> bool {
        !(self.suites || self.tests || self.fixtures || self.tags)
    }
}
