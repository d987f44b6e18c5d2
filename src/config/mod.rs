//! Configuration module
//!
//! Handles loading the optional config file and building the run
//! configuration passed to the loader, runner and fixtures.

mod env;

pub use env::EnvConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file names looked up in the root directory, in order of precedence
const CONFIG_FILES: &[&str] = &[
    "arbortest.yaml",
    "arbortest.yml",
    "arbortest.json",
    ".arbortest.yaml",
];

/// Defaults read from a config file
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Directory for reports and the result snapshot, relative to the root
    pub output_dir: String,

    /// Failfast override applied to every suite
    pub failfast: Option<bool>,

    /// Console verbosity
    pub verbose: u8,

    /// Disable ANSI colors in console output
    pub no_color: bool,

    /// Translate `/` and `.` in report names
    pub translate_names: bool,

    /// JUnit report file name
    pub junit_file: String,

    /// Result snapshot file name
    pub snapshot_file: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir: "testing-results".to_string(),
            failfast: None,
            verbose: 0,
            no_color: false,
            translate_names: true,
            junit_file: "junit.xml".to_string(),
            snapshot_file: "results.json".to_string(),
        }
    }
}

impl AppConfig {
    /// Find a config file in the given root directory
    pub fn find(root: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| root.join(name))
            .find(|path| path.exists())
    }

    /// Per-user config file, e.g. `~/.config/arbortest/config.yaml`
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("arbortest").join("config.yaml"))
    }

    /// Load from the root directory, then the user config, falling back to
    /// defaults
    pub fn load_default(root: &Path) -> Result<Self> {
        let path = Self::find(root).or_else(|| Self::user_config_path().filter(|p| p.exists()));
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = if is_yaml_file(path) {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        } else {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        };

        Ok(config)
    }
}

fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}

/// Configuration for one run, built once at startup
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Directory tests are discovered from
    pub root_dir: PathBuf,

    /// Directory reports are written to
    pub output_dir: PathBuf,

    /// Only run the suite or test with this UID
    pub uid: Option<String>,

    /// Overrides the failfast flag of every suite when set
    pub failfast: Option<bool>,

    /// Console verbosity, increased by repeated `-v`
    pub verbose: u8,

    pub no_color: bool,

    pub translate_names: bool,

    pub junit_file: String,

    pub snapshot_file: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from_app(".", &AppConfig::default())
    }
}

impl RunConfig {
    #[cfg(test)]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self::from_app(root_dir, &AppConfig::default())
    }

    /// Build from file defaults
    pub fn from_app(root_dir: impl Into<PathBuf>, app: &AppConfig) -> Self {
        let root_dir = root_dir.into();
        Self {
            output_dir: root_dir.join(&app.output_dir),
            root_dir,
            uid: None,
            failfast: app.failfast,
            verbose: app.verbose,
            no_color: app.no_color,
            translate_names: app.translate_names,
            junit_file: app.junit_file.clone(),
            snapshot_file: app.snapshot_file.clone(),
        }
    }

    /// Apply environment overrides
    pub fn with_env(mut self, env: &EnvConfig) -> Self {
        if let Some(dir) = &env.output_dir {
            self.output_dir = PathBuf::from(dir);
        }
        if env.failfast.is_some() {
            self.failfast = env.failfast;
        }
        if let Some(verbose) = env.verbose {
            self.verbose = verbose;
        }
        if let Some(no_color) = env.no_color {
            self.no_color = no_color;
        }
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_failfast(mut self, failfast: bool) -> Self {
        self.failfast = Some(failfast);
        self
    }

    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Effective failfast for a suite declaring `declared`
    pub fn failfast_for(&self, declared: bool) -> bool {
        self.failfast.unwrap_or(declared)
    }

    pub fn junit_path(&self) -> PathBuf {
        self.output_dir.join(&self.junit_file)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.output_dir.join(&self.snapshot_file)
    }
}
