//! Test manifests
//!
//! A manifest is a YAML file declaring fixtures, command tests and the
//! suites grouping them. Everything is referenced by name within the file.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::LoadError;
use crate::fixture::{
    env_value, fixture_env_name, CommandFixture, Fixture, FixtureScope, TempdirFixture,
    VariableFixture,
};
use crate::models::{SuiteItem, SuiteNode, TestNode, TestResult, TreeBuilder, TreeError};
use crate::utils::{log_call_capture, CommandSpec};
use crate::verify::StdoutMatcher;

/// Parsed manifest file
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Manifest {
    pub fixtures: Vec<FixtureDecl>,
    pub tests: Vec<TestDecl>,
    pub suites: Vec<SuiteDecl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixtureDecl {
    pub name: String,
    #[serde(flatten)]
    pub kind: FixtureKind,
    #[serde(default)]
    pub build_once: bool,
    #[serde(default = "default_true")]
    pub lazy_init: bool,
    #[serde(default)]
    pub requires: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FixtureKind {
    Command {
        #[serde(default)]
        setup: Option<Vec<String>>,
        #[serde(default)]
        teardown: Option<Vec<String>>,
        #[serde(default)]
        value: Value,
    },
    Tempdir,
    Variable {
        value: Value,
    },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestDecl {
    pub name: String,
    pub command: Vec<String>,
    #[serde(default)]
    pub cwd: Option<PathBuf>,
    #[serde(default)]
    pub fixtures: Vec<String>,
    #[serde(default)]
    pub xfail: bool,
    /// Skip without running, with this reason
    #[serde(default)]
    pub skip: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub stdout: Option<StdoutDecl>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StdoutDecl {
    pub reference: PathBuf,
    #[serde(default)]
    pub ignore: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteDecl {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub fixtures: Vec<String>,
    #[serde(default = "default_true")]
    pub failfast: bool,
    #[serde(default)]
    pub parallelizable: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Manifest {
    pub fn parse(path: &Path, content: &str) -> Result<Self, LoadError> {
        serde_yaml::from_str(content).map_err(|source| LoadError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Build the top-level items of this file.
    ///
    /// Suites referenced by no other suite and tests referenced by no suite
    /// are top-level, in declaration order.
    pub fn into_items(self, path: &Path) -> Result<Vec<SuiteItem>, LoadError> {
        let base_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let fixtures = self.build_fixtures(path)?;
        let tree_error = |source: TreeError| LoadError::Tree {
            path: path.to_path_buf(),
            source,
        };

        let mut builder = TreeBuilder::new();
        for decl in &self.tests {
            let test = command_test(decl, &base_dir, &fixtures, path)?;
            builder.test(test).map_err(tree_error)?;
        }
        for decl in &self.suites {
            let suite = SuiteNode::new(&decl.name)
                .with_failfast(decl.failfast)
                .with_parallelizable(decl.parallelizable)
                .with_tags(decl.tags.iter().cloned())
                .with_fixtures(resolve(&decl.fixtures, &fixtures, path)?);
            builder.suite(suite, decl.items.iter().cloned()).map_err(tree_error)?;
        }

        let referenced: HashSet<&str> = self
            .suites
            .iter()
            .flat_map(|s| s.items.iter().map(String::as_str))
            .collect();
        let top_level: Vec<String> = self
            .tests
            .iter()
            .map(|t| t.name.as_str())
            .chain(self.suites.iter().map(|s| s.name.as_str()))
            .filter(|name| !referenced.contains(name))
            .map(str::to_string)
            .collect();

        // Synthetic root; its name cannot clash with a declared one
        let root_name = format!("<{}>", path.display());
        builder
            .suite(SuiteNode::new(&root_name), top_level)
            .map_err(tree_error)?;
        let root = builder.build(&root_name).map_err(tree_error)?;

        // Suites only reachable from each other form a cycle
        if let Some(name) = builder.unreferenced(&root_name).into_iter().next() {
            return Err(tree_error(TreeError::Cycle {
                path: format!("{name} is only reachable from itself"),
            }));
        }

        Ok(root.items)
    }

    fn build_fixtures(&self, path: &Path) -> Result<FixtureScope, LoadError> {
        let mut scope = FixtureScope::new();
        for decl in &self.fixtures {
            if scope.contains(&decl.name) {
                return Err(invalid(path, format!("fixture '{}' is declared twice", decl.name)));
            }
            let fixture = match &decl.kind {
                FixtureKind::Command {
                    setup,
                    teardown,
                    value,
                } => Fixture::new(
                    &decl.name,
                    CommandFixture::new(
                        setup.clone().map(CommandSpec::new),
                        teardown.clone().map(CommandSpec::new),
                    )
                    .with_value(value.clone()),
                ),
                FixtureKind::Tempdir => Fixture::new(&decl.name, TempdirFixture::new()),
                FixtureKind::Variable { value } => {
                    Fixture::new(&decl.name, VariableFixture::new(value.clone()))
                }
            };
            scope.insert(
                decl.name.clone(),
                fixture
                    .build_once(decl.build_once)
                    .lazy_init(decl.lazy_init)
                    .shared(),
            );
        }

        for decl in &self.fixtures {
            let Some(fixture) = scope.get(&decl.name) else {
                continue;
            };
            for dep in resolve(&decl.requires, &scope, path)?.fixtures() {
                fixture.require(dep).map_err(|err| LoadError::Tree {
                    path: path.to_path_buf(),
                    source: err.into(),
                })?;
            }
        }
        Ok(scope)
    }
}

fn invalid(path: &Path, reason: String) -> LoadError {
    LoadError::Invalid {
        path: path.to_path_buf(),
        reason,
    }
}

/// Look up fixtures by name, keeping the requested order
fn resolve(names: &[String], fixtures: &FixtureScope, path: &Path) -> Result<FixtureScope, LoadError> {
    let mut scope = FixtureScope::new();
    for name in names {
        let fixture = fixtures
            .get(name)
            .ok_or_else(|| invalid(path, format!("unknown fixture '{name}'")))?;
        scope.insert(name.clone(), Arc::clone(fixture));
    }
    Ok(scope)
}

/// Test node running a command; fixture values are exported to it
fn command_test(
    decl: &TestDecl,
    base_dir: &Path,
    fixtures: &FixtureScope,
    path: &Path,
) -> Result<TestNode, LoadError> {
    if decl.command.is_empty() {
        return Err(invalid(path, format!("test '{}' has an empty command", decl.name)));
    }

    let matcher = match &decl.stdout {
        Some(stdout) => Some(
            StdoutMatcher::new(base_dir.join(&stdout.reference), &stdout.ignore)
                .map_err(|err| invalid(path, format!("{err:#}")))?,
        ),
        None => None,
    };

    let spec = CommandSpec::new(decl.command.iter().cloned())
        .with_cwd(base_dir.join(decl.cwd.as_deref().unwrap_or(Path::new("."))));
    let xfail = decl.xfail;
    let skip = decl.skip.clone();

    let test = TestNode::new(&decl.name, move |result: &mut TestResult, scope: &FixtureScope| {
        if let Some(reason) = &skip {
            result.skip(reason.as_str());
            return Ok(());
        }

        let mut spec = spec.clone();
        for (name, fixture) in scope.iter() {
            spec = spec.with_env(fixture_env_name(name), env_value(&fixture.value()));
        }
        let output = log_call_capture(&spec)?;

        let failure = if !output.status.success() {
            Some(format!("`{}` exited with {}", spec, output.status))
        } else if let Some(matcher) = &matcher {
            matcher.check(&output.stdout)?.map(|diff| {
                format!(
                    "stdout did not match {}:\n{}",
                    matcher.reference().display(),
                    diff
                )
            })
        } else {
            None
        };

        match (failure, xfail) {
            (Some(reason), true) => result.xfail(reason),
            (Some(reason), false) => result.fail(reason),
            (None, true) => result.fail("expected to fail, but passed"),
            (None, false) => {}
        }
        Ok(())
    })
    .with_tags(decl.tags.iter().cloned());

    // Skipped tests do not pay for their fixtures
    if decl.skip.is_some() {
        return Ok(test);
    }
    Ok(test.with_fixtures(resolve(&decl.fixtures, fixtures, path)?))
}
