/*!
 * Logging Module
 * Console plus daily-rolling `app.log` / `error.log` files
 */
pub mod config;
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
};

pub use config::{LogConfig, LogLevel};

/// Background writer guards. Dropping them flushes and stops the writers.
#[must_use = "logs are lost once the guards are dropped"]
pub struct LogGuards {
    _guards: Vec<WorkerGuard>,
}

/// ERROR-only JSON layer for `error.log`.
fn error_file_layer<S>(writer: non_blocking::NonBlocking) -> impl Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .json()
        .with_writer(writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_filter(LevelFilter::ERROR)
}

/// Initialize the global subscriber from the environment.
pub fn init() -> LogGuards {
    init_with(&LogConfig::from_env())
}

pub fn init_with(config: &LogConfig) -> LogGuards {
    if let Err(e) = std::fs::create_dir_all(&config.directory) {
        eprintln!("Cannot create log directory {}: {}", config.directory, e);
    }

    let (file_writer, file_guard) = non_blocking(rolling::daily(&config.directory, "app.log"));
    let (error_writer, error_guard) = non_blocking(rolling::daily(&config.directory, "error.log"));
    let (console_writer, console_guard) = non_blocking(io::stdout());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));
    let subscriber = tracing_subscriber::registry().with(env_filter);

    let installed = if config.production {
        let error_layer = error_file_layer(error_writer);
        let file_layer = fmt::layer()
            .json()
            .with_writer(file_writer)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true);
        let console_layer = fmt::layer()
            .json()
            .with_writer(console_writer)
            .with_target(false);

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .try_init()
    } else {
        let error_layer = error_file_layer(error_writer);
        let file_layer = fmt::layer()
            .with_writer(file_writer)
            .with_target(true)
            .with_ansi(false);
        let console_layer = fmt::layer()
            .with_writer(console_writer)
            .with_target(true)
            .pretty();

        subscriber
            .with(file_layer)
            .with(error_layer)
            .with(console_layer)
            .try_init()
    };

    match installed {
        Ok(()) => tracing::info!(
            production = config.production,
            level = %config.level,
            directory = %config.directory,
            "Logging initialized"
        ),
        Err(e) => eprintln!("Logging already initialized: {}", e),
    }

    LogGuards {
        _guards: vec![file_guard, error_guard, console_guard],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(production: bool) -> LogConfig {
        let directory = std::env::temp_dir()
            .join(format!("soloflow-logs-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .into_owned();
        LogConfig {
            production,
            level: LogLevel::Debug,
            directory,
        }
    }

    #[test]
    fn test_init_with_both_formats() {
        // Only the first call installs the global subscriber; the second still builds its layers.
        for production in [false, true] {
            let config = temp_config(production);
            let guards = init_with(&config);
            assert_eq!(guards._guards.len(), 3);
            assert!(std::path::Path::new(&config.directory).is_dir());
            tracing::error!(production, "error line");
            drop(guards);
            let _ = std::fs::remove_dir_all(&config.directory);
        }
    }
}
