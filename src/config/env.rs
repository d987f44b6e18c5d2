//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "ARBORTEST";

/// Overrides read from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Output directory from ARBORTEST_OUTPUT_DIR
    pub output_dir: Option<String>,
    /// Failfast override from ARBORTEST_FAILFAST
    pub failfast: Option<bool>,
    /// Verbosity from ARBORTEST_VERBOSE
    pub verbose: Option<u8>,
    /// Color switch from ARBORTEST_NO_COLOR
    pub no_color: Option<bool>,
    /// Config file from ARBORTEST_CONFIG
    pub config_file: Option<String>,
    /// Log level name from ARBORTEST_LOG_LEVEL
    pub log_level: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            output_dir: get_env("OUTPUT_DIR"),
            failfast: get_env_bool("FAILFAST"),
            verbose: get_env_parse("VERBOSE"),
            no_color: get_env_bool("NO_COLOR"),
            config_file: get_env("CONFIG"),
            log_level: get_env("LOG_LEVEL"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.output_dir.is_some()
            || self.failfast.is_some()
            || self.verbose.is_some()
            || self.no_color.is_some()
            || self.config_file.is_some()
            || self.log_level.is_some()
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).and_then(|v| parse_bool(&v))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
