//! Logging settings read from the environment.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub production: bool,
    pub level: LogLevel,
    pub directory: String,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Filter used when `RUST_LOG` is not set.
    pub fn default_directive(&self) -> String {
        let http_level = if self.production { "info" } else { "debug" };
        format!(
            "soloflow={level},setup_database={level},check_database={level},tower_http={http},axum={http}",
            level = self.level,
            http = http_level
        )
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        let production = std::env::var("ENVIRONMENT")
            .map(|e| e == "production")
            .unwrap_or(false);
        let fallback = if production {
            LogLevel::Info
        } else {
            LogLevel::Debug
        };
        Self {
            production,
            level: std::env::var("LOG_LEVEL")
                .ok()
                .and_then(|l| l.parse().ok())
                .unwrap_or(fallback),
            directory: std::env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn test_default_directive() {
        let config = LogConfig {
            production: true,
            level: LogLevel::Info,
            directory: "logs".to_string(),
        };
        let directive = config.default_directive();
        assert!(directive.starts_with("soloflow=info,"));
        assert!(directive.contains("tower_http=info"));
    }
}
