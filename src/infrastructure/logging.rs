//! Logging system configuration and initialization
//!
//! This module provides the logging setup for harvest runs:
//! - Console output and optional daily-rolling file output
//! - Configuration based log level control with per-module filters
//! - Structured JSON logging (optional)
//! - Log files stored relative to executable location by default

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::infrastructure::config::LoggingConfig;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(LoggingConfig::default())
}

/// Build the level filter for a configuration
///
/// `RUST_LOG` wins when set. Otherwise the configured level applies with the
/// module filters layered on top, unless the level is `trace`, in which case
/// dependencies are not quieted.
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level)
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    if !config.level.eq_ignore_ascii_case("trace") {
        for (module, level) in &config.module_filters {
            let directive = format!("{module}={level}")
                .parse()
                .map_err(|e| anyhow!("Invalid log filter '{}={}': {}", module, level, e))?;
            filter = filter.add_directive(directive);
        }
    }

    Ok(filter)
}

/// Initialize logging with custom configuration
///
/// Override the filtering with `RUST_LOG`:
/// ```bash
/// RUST_LOG="debug,sqlx::query=debug" my-harvest-runner
/// ```
pub fn init_logging_with_config(config: LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let env_filter = build_env_filter(&config)?;
    let mut layers: Vec<BoxedLayer> = Vec::new();

    if config.console_output {
        let console_layer = fmt::Layer::new().with_writer(std::io::stdout).with_target(false);
        layers.push(if config.json_format {
            console_layer.json().boxed()
        } else {
            console_layer.boxed()
        });
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);
    if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;

        let file_appender = rolling::daily(&log_dir, &config.file_name);
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let file_layer = fmt::Layer::new()
            .with_writer(file_writer)
            .with_ansi(false);
        layers.push(if config.json_format {
            file_layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            file_layer.with_target(false).boxed()
        });
    }

    Registry::default()
        .with(layers)
        .with(env_filter)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    info!("JSON format: {}", config.json_format);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }

    Ok(())
}
