//! arbortest - hierarchical test runner
//!
//! Discovers YAML test manifests under a root directory, builds a tree of
//! suites and tests with scoped fixtures, runs it with per-suite failfast,
//! and writes a JUnit report plus a result snapshot for reruns.
//!
//! ## Features
//!
//! - Fixtures with dependencies, lazy or eager setup, and build-once caching
//! - Nested suites with fixture shadowing and failfast
//! - Rerun of the tests of suites that failed last time
//! - Table, JSON and summary console output, JUnit XML and CSV export
//!
//! ## Usage
//!
//! ```bash
//! # Run everything under the current directory
//! arbortest run
//!
//! # Run one suite, never stopping early
//! arbortest run tests/ --uid tests/net --no-failfast
//!
//! # Rerun what failed in the last run
//! arbortest rerun tests/
//!
//! # Show the tree with UIDs
//! arbortest list tests/ --uids
//! ```

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing::{debug, info};

mod cli;
mod config;
mod executor;
mod fixture;
mod loader;
mod models;
mod output;
mod results;
mod utils;
mod verify;

use cli::{Args, OutputArgs};
use config::{AppConfig, EnvConfig, RunConfig};
use executor::Runner;
use models::{NodeRef, Outcome, SuiteResult};
use output::{JUnitFormatter, OutputFormat, ResultFormatter};
use results::{ExportFormat, ResultsStorage, StoredRun};
use utils::{init_logger, LogLevel};

fn main() -> ExitCode {
    let args = Args::parse();
    let env = EnvConfig::load();

    init_logger(LogLevel::select(
        args.verbose,
        env.log_level.as_deref(),
        env.verbose,
    ));

    let outcome = match &args.command {
        cli::Command::Run(run_args) => run_tests(run_args, &args, &env),
        cli::Command::Rerun(rerun_args) => rerun_tests(rerun_args, &args, &env),
        cli::Command::List(list_args) => list_tree(list_args, &args, &env),
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("✗ {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Build the run configuration: CLI flags over environment over config file
fn build_config(
    root: &Path,
    args: &Args,
    env: &EnvConfig,
    output: Option<&OutputArgs>,
) -> Result<RunConfig> {
    let config_file = args
        .config
        .clone()
        .or_else(|| env.config_file.as_ref().map(Into::into));
    let app = match config_file {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::load_default(root)?,
    };

    if env.has_any() {
        debug!("Applying ARBORTEST_* environment overrides");
    }
    let mut config = RunConfig::from_app(root, &app).with_env(env);
    if args.verbose > 0 {
        config = config.with_verbose(args.verbose);
    }
    if let Some(output) = output {
        if let Some(dir) = &output.output_dir {
            config = config.with_output_dir(dir);
        }
        if output.no_color {
            config.no_color = true;
        }
    }
    Ok(config)
}

fn run_tests(args: &cli::RunArgs, global: &Args, env: &EnvConfig) -> Result<ExitCode> {
    let mut config = build_config(&args.root, global, env, Some(&args.output))?;
    if let Some(failfast) = args.failfast_override() {
        config = config.with_failfast(failfast);
    }
    if let Some(uid) = &args.uid {
        config = config.with_uid(uid);
    }
    let format = parse_format(&args.output.format)?;

    let root = loader::load_root(&config.root_dir)?;
    let started_at = Utc::now();
    let result = Runner::new(&config).execute(&root)?;

    finish_run(&config, &args.output, format, started_at, result)
}

fn rerun_tests(args: &cli::RerunArgs, global: &Args, env: &EnvConfig) -> Result<ExitCode> {
    let config = build_config(&args.root, global, env, Some(&args.output))?;
    let format = parse_format(&args.output.format)?;

    let storage = ResultsStorage::new(config.snapshot_path());
    if !storage.exists() {
        bail!(
            "No previous run at {}; run the tests first",
            storage.path().display()
        );
    }
    let previous = storage.load()?;
    let targets = previous.rerun_targets();
    if targets.is_empty() {
        println!("Nothing to rerun: the last run ({}) had no failures.", previous.id);
        return Ok(ExitCode::SUCCESS);
    }

    info!(
        "Rerunning {} test(s) of {} failed suite(s) from run {}",
        targets.len(),
        previous.failed_suite_uids().len(),
        previous.id
    );
    let root = loader::load_root(&config.root_dir)?;
    let started_at = Utc::now();
    let result = Runner::new(&config).run_uids(&root, &targets)?;

    finish_run(&config, &args.output, format, started_at, result)
}

fn parse_format(format: &str) -> Result<OutputFormat> {
    OutputFormat::from_str(format).ok_or_else(|| anyhow!("Unknown output format: {format}"))
}

/// Write reports and the snapshot, print the console output, pick the exit code
fn finish_run(
    config: &RunConfig,
    output: &OutputArgs,
    format: OutputFormat,
    started_at: DateTime<Utc>,
    result: SuiteResult,
) -> Result<ExitCode> {
    JUnitFormatter::new()
        .with_translate_names(config.translate_names)
        .write(&result, &config.junit_path())?;
    info!("JUnit report written to {}", config.junit_path().display());

    let run = StoredRun::new(&config.root_dir, started_at, result);
    ResultsStorage::new(config.snapshot_path()).save(&run)?;

    if let Some(path) = &output.export {
        let export_format = ExportFormat::from_extension(path).unwrap_or(ExportFormat::Json);
        ResultsStorage::new(config.snapshot_path()).export(&run, path, export_format)?;
    }

    let mut formatter = ResultFormatter::new(format).with_verbose(config.verbose);
    if config.no_color {
        formatter = formatter.no_color();
    }
    println!("{}", formatter.format(&run.result));

    Ok(match run.outcome() {
        Outcome::Fail | Outcome::Error => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}

fn list_tree(args: &cli::ListArgs, global: &Args, env: &EnvConfig) -> Result<ExitCode> {
    let config = build_config(&args.root, global, env, None)?;
    let root = loader::load_root(&config.root_dir)?;

    let label = |uid: &str, name: &str| {
        if args.uids {
            uid.to_string()
        } else {
            format!("{}{}", "  ".repeat(uid.matches('/').count()), name)
        }
    };

    if args.all() || args.suites {
        println!("\nSuites:");
        for (uid, suite) in root.suites() {
            let mut flags = Vec::new();
            if config.failfast_for(suite.failfast) {
                flags.push("failfast");
            }
            if suite.parallelizable {
                flags.push("parallelizable");
            }
            if flags.is_empty() {
                println!("  {}", label(&uid, &suite.name));
            } else {
                println!("  {} [{}]", label(&uid, &suite.name), flags.join(", "));
            }
        }
    }

    if args.all() || args.tests || args.tag.is_some() {
        let tagged = args.tag.as_deref().map(|tag| root.tests_with_tag(tag));
        match &args.tag {
            Some(tag) => println!("\nTests tagged '{tag}':"),
            None => println!("\nTests:"),
        }
        for (uid, node) in root.walk() {
            if let Some(tagged) = &tagged {
                if !tagged.contains(&uid) {
                    continue;
                }
            }
            match node {
                NodeRef::Test(test) => println!("  {}", label(&uid, &test.name)),
                NodeRef::Suite(suite) if tagged.is_none() && !args.uids => {
                    println!("  {}/", label(&uid, &suite.name))
                }
                NodeRef::Suite(_) => {}
            }
        }
    }

    if args.all() || args.fixtures {
        println!("\nFixtures:");
        for fixture in root.enumerate_fixtures() {
            let mut flags = vec![if fixture.is_lazy() { "lazy" } else { "eager" }];
            if fixture.is_build_once() {
                flags.push("build-once");
            }
            let requires: Vec<String> = fixture
                .requires()
                .iter()
                .map(|dep| dep.name().to_string())
                .collect();
            if requires.is_empty() {
                println!("  {} [{}]", fixture.name(), flags.join(", "));
            } else {
                println!(
                    "  {} [{}] requires {}",
                    fixture.name(),
                    flags.join(", "),
                    requires.join(", ")
                );
            }
        }
    }

    if args.all() || args.tags {
        println!("\nTags:");
        for tag in root.tags() {
            println!("  {tag} ({})", root.tests_with_tag(tag).len());
        }
    }

    println!("\n{} test(s) in {}", root.test_count(), root.name);
    Ok(ExitCode::SUCCESS)
}
