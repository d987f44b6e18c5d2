//! Built-in fixture kinds
//!
//! The kinds the manifest loader knows how to declare, plus closure-backed
//! hooks for trees built in tests.

use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::sync::Mutex;
use tempfile::TempDir;

use super::engine::{FixtureHooks, SetupContext};
use crate::utils::{log_call, CommandSpec};

#[cfg(test)]
type SetupFn = Box<dyn Fn(&SetupContext<'_>) -> Result<Value> + Send + Sync>;
#[cfg(test)]
type TeardownFn = Box<dyn Fn(&Value) -> Result<()> + Send + Sync>;

/// Fixture hooks backed by closures
#[cfg(test)]
pub struct FnFixture {
    setup: SetupFn,
    teardown: Option<TeardownFn>,
}

#[cfg(test)]
impl FnFixture {
    pub fn new<F>(setup: F) -> Self
    where
        F: Fn(&SetupContext<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            setup: Box::new(setup),
            teardown: None,
        }
    }

    /// Hooks that do nothing and provide `null`
    pub fn noop() -> Self {
        Self::new(|_| Ok(Value::Null))
    }

    pub fn on_teardown<F>(mut self, teardown: F) -> Self
    where
        F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
    {
        self.teardown = Some(Box::new(teardown));
        self
    }
}

#[cfg(test)]
impl FixtureHooks for FnFixture {
    fn setup(&self, ctx: &SetupContext<'_>) -> Result<Value> {
        (self.setup)(ctx)
    }

    fn teardown(&self, value: &Value) -> Result<()> {
        match &self.teardown {
            Some(teardown) => teardown(value),
            None => Ok(()),
        }
    }
}

/// Provides a constant value
#[derive(Clone, Debug)]
pub struct VariableFixture {
    value: Value,
}

impl VariableFixture {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl FixtureHooks for VariableFixture {
    fn setup(&self, _ctx: &SetupContext<'_>) -> Result<Value> {
        Ok(self.value.clone())
    }
}

/// Creates a scratch directory and removes it on teardown.
///
/// The value is the directory path.
#[derive(Debug, Default)]
pub struct TempdirFixture {
    dir: Mutex<Option<TempDir>>,
}

impl TempdirFixture {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FixtureHooks for TempdirFixture {
    fn setup(&self, ctx: &SetupContext<'_>) -> Result<Value> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("{}-", ctx.name))
            .tempdir()
            .context("Failed to create temporary directory")?;
        let path = dir.path().to_string_lossy().into_owned();

        let mut slot = self.dir.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(dir);
        Ok(Value::String(path))
    }

    fn teardown(&self, _value: &Value) -> Result<()> {
        let dir = self.dir.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(dir) = dir {
            dir.close().context("Failed to remove temporary directory")?;
        }
        Ok(())
    }
}

/// Runs shell-free commands on setup and teardown.
///
/// The setup command sees the values of required fixtures as
/// `ARBORTEST_FIXTURE_<NAME>`, the run's root directory as
/// `ARBORTEST_ROOT_DIR` and the comma-separated names of dependent
/// fixtures as `ARBORTEST_REQUIRED_BY`.
#[derive(Clone, Debug, Default)]
pub struct CommandFixture {
    pub setup: Option<CommandSpec>,
    pub teardown: Option<CommandSpec>,
    pub value: Value,
}

impl CommandFixture {
    pub fn new(setup: Option<CommandSpec>, teardown: Option<CommandSpec>) -> Self {
        Self {
            setup,
            teardown,
            value: Value::Null,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = value.into();
        self
    }
}

impl FixtureHooks for CommandFixture {
    fn setup(&self, ctx: &SetupContext<'_>) -> Result<Value> {
        if let Some(spec) = &self.setup {
            let mut spec = spec
                .clone()
                .with_env(
                    "ARBORTEST_ROOT_DIR",
                    ctx.config.root_dir.to_string_lossy(),
                )
                .with_env("ARBORTEST_REQUIRED_BY", ctx.required_by.join(","));
            for (name, value) in &ctx.dependencies {
                spec = spec.with_env(fixture_env_name(name), env_value(value));
            }
            run_checked(&spec)?;
        }
        Ok(self.value.clone())
    }

    fn teardown(&self, _value: &Value) -> Result<()> {
        match &self.teardown {
            Some(spec) => run_checked(spec),
            None => Ok(()),
        }
    }
}

fn run_checked(spec: &CommandSpec) -> Result<()> {
    let status = log_call(spec)?;
    if !status.success() {
        bail!("`{}` exited with {}", spec, status);
    }
    Ok(())
}

/// Environment variable a fixture value is exported under
pub fn fixture_env_name(name: &str) -> String {
    let suffix: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("ARBORTEST_FIXTURE_{suffix}")
}

/// Render a fixture value for the environment; strings are passed unquoted
pub fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunConfig;
    use crate::fixture::Fixture;
    use std::path::PathBuf;

    #[test]
    fn test_variable_fixture() {
        let fixture = Fixture::new("greeting", VariableFixture::new("hello"));
        fixture.setup(&RunConfig::default()).unwrap();
        assert_eq!(fixture.value(), Value::from("hello"));
    }

    #[test]
    fn test_tempdir_removed_on_teardown() {
        let fixture = Fixture::new("scratch", TempdirFixture::new());
        fixture.setup(&RunConfig::default()).unwrap();

        let path = PathBuf::from(fixture.value().as_str().unwrap());
        assert!(path.is_dir());
        fixture.teardown().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_command_fixture_sees_dependency_values() {
        let config = RunConfig::default();
        let dir = Fixture::new("work-dir", TempdirFixture::new()).shared();
        let marker = Fixture::new(
            "marker",
            CommandFixture::new(
                Some(CommandSpec::new([
                    "sh",
                    "-c",
                    "touch \"$ARBORTEST_FIXTURE_WORK_DIR/marker\"",
                ])),
                None,
            )
            .with_value("done"),
        )
        .shared();
        marker.require(&dir).unwrap();

        marker.setup(&config).unwrap();
        let path = PathBuf::from(dir.value().as_str().unwrap()).join("marker");
        assert!(path.exists());
        assert_eq!(marker.value(), Value::from("done"));

        marker.teardown().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_command_fixture_sees_run_context() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig::new(dir.path());
        let server = Fixture::new(
            "server",
            CommandFixture::new(
                Some(CommandSpec::new([
                    "sh",
                    "-c",
                    "echo \"$ARBORTEST_REQUIRED_BY\" > \"$ARBORTEST_ROOT_DIR/dependents\"",
                ])),
                None,
            ),
        )
        .shared();
        let api = Fixture::new("api", VariableFixture::new(1)).shared();
        let web = Fixture::new("web", VariableFixture::new(2)).shared();
        api.require(&server).unwrap();
        web.require(&server).unwrap();

        server.setup(&config).unwrap();
        let written = std::fs::read_to_string(dir.path().join("dependents")).unwrap();
        assert_eq!(written.trim(), "api,web");
    }

    #[test]
    fn test_command_fixture_nonzero_exit_fails() {
        let fixture = Fixture::new(
            "false",
            CommandFixture::new(Some(CommandSpec::new(["false"])), None),
        );
        let err = fixture.setup(&RunConfig::default()).unwrap_err();
        assert!(err.to_string().contains("exited with"));
    }

    #[test]
    fn test_fixture_env_name() {
        assert_eq!(fixture_env_name("work-dir"), "ARBORTEST_FIXTURE_WORK_DIR");
        assert_eq!(env_value(&Value::from(3)), "3");
        assert_eq!(env_value(&Value::from("x")), "x");
    }
}
