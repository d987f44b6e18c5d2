//! Logging utilities
//!
//! Maps the CLI verbosity count onto a tracing subscriber.

use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Log level configuration
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }

    /// Level for a `-v` count
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    /// Level for a run: a `-v` count wins, then a named level, then the
    /// environment's verbosity count
    pub fn select(cli_verbose: u8, named: Option<&str>, env_verbose: Option<u8>) -> Self {
        if cli_verbose > 0 {
            return Self::from_verbosity(cli_verbose);
        }
        named
            .and_then(Self::from_str)
            .unwrap_or_else(|| Self::from_verbosity(env_verbose.unwrap_or(0)))
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(LogLevel::Trace),
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Initialize the logger with specified level, unless RUST_LOG is set
pub fn init_logger(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("arbortest={}", level.to_tracing_level())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_from_str() {
        assert_eq!(LogLevel::from_str("info"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("DEBUG"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::from_str("unknown"), None);
    }

    #[test]
    fn test_log_level_from_verbosity() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(1), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(5), LogLevel::Trace);
    }

    #[test]
    fn test_select_precedence() {
        assert_eq!(LogLevel::select(1, Some("error"), Some(2)), LogLevel::Debug);
        assert_eq!(LogLevel::select(0, Some("warning"), Some(2)), LogLevel::Warn);
        assert_eq!(LogLevel::select(0, Some("error"), None), LogLevel::Error);
        assert_eq!(LogLevel::select(0, Some("loud"), Some(2)), LogLevel::Trace);
        assert_eq!(LogLevel::select(0, None, None), LogLevel::Info);
    }
}
