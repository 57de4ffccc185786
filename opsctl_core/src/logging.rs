//! # Logging Initialization
//!
//! Sets up the process-wide `tracing` subscriber and returns the
//! [`TargetRegistry`] that controls it.
//!
//! ## Layers
//!
//! 1. **Reloadable `Targets` filter**: seeded from `RUST_LOG` if set, otherwise
//!    from the configured filter string (e.g. `info,opsctl_http=debug`). The
//!    returned registry pushes every level change through the reload handle,
//!    so overrides take effect on the live subscriber.
//! 2. **Output**: stderr with ANSI colors by default, or a daily rolling file
//!    (`tracing-appender`, non-blocking writer) when `log_to_file` is set. If
//!    the log directory cannot be created, output falls back to stderr.
//!
//! Initialization happens at most once per process; later calls return the
//! registry created by the first one.

use crate::level::{LevelSetting, TargetRegistry};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::{
    io::stderr,
    path::PathBuf,
    sync::{Arc, Mutex, OnceLock, PoisonError},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{Layer, filter::Targets, fmt::layer, prelude::*, reload};

static REGISTRY: OnceLock<Arc<TargetRegistry>> = OnceLock::new();
static GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

/// How the process should log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Filter directives used when `RUST_LOG` is not set.
    pub filter: String,
    /// Loggers to make known to the registry, with their initial setting.
    /// Directives from the filter take precedence.
    pub loggers: Vec<(String, LevelSetting)>,
    pub log_to_file: bool,
    /// Directory for the rolling log file. Defaults to the user cache dir.
    pub log_dir: Option<PathBuf>,
}

/// Resolve the filter string: `RUST_LOG` wins over the configured one.
pub fn effective_filter(configured: &str) -> String {
    std::env::var("RUST_LOG")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| configured.to_string())
}

/// Build the registry described by `options` without installing a subscriber.
pub fn build_registry(options: &LoggingOptions) -> Result<TargetRegistry> {
    let filter = effective_filter(&options.filter);
    let targets: Targets = filter
        .parse()
        .with_context(|| format!("Invalid log filter '{filter}'"))?;
    let registry = TargetRegistry::from_targets(&targets);
    for (name, setting) in &options.loggers {
        registry
            .declare(name, *setting)
            .with_context(|| format!("Cannot declare logger '{name}'"))?;
    }
    Ok(registry)
}

/// Install the global subscriber and return the registry controlling it.
pub fn init_logging(options: &LoggingOptions) -> Result<Arc<TargetRegistry>> {
    if let Some(registry) = REGISTRY.get() {
        return Ok(registry.clone());
    }

    let registry = build_registry(options)?;
    let (filter, handle) = reload::Layer::new(registry.targets());
    let registry = Arc::new(
        registry.with_filter_sink(move |targets| handle.reload(targets).map_err(|e| e.to_string())),
    );

    let (file_writer, fallback_reason) = if options.log_to_file {
        match open_log_file(options.log_dir.clone()) {
            Ok(writer) => (Some(writer), None),
            Err(e) => (None, Some(e)),
        }
    } else {
        (None, None)
    };

    let output = match file_writer {
        Some((writer, guard)) => {
            *GUARD.lock().unwrap_or_else(PoisonError::into_inner) = Some(guard);
            layer().with_writer(writer).with_ansi(false).boxed()
        }
        None => layer().with_writer(stderr).with_ansi(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    if let Some(reason) = fallback_reason {
        tracing::warn!("File logging unavailable, logging to stderr: {:#}", reason);
    }

    Ok(REGISTRY.get_or_init(|| registry).clone())
}

fn open_log_file(
    log_dir: Option<PathBuf>,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard)> {
    let dir = match log_dir {
        Some(dir) => dir,
        None => ProjectDirs::from("com", "Opsctl", "opsctl")
            .context("Cannot determine a cache directory for log files")?
            .cache_dir()
            .to_path_buf(),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Cannot create log directory {}", dir.display()))?;
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("opsctl")
        .filename_suffix("log")
        .build(&dir)
        .with_context(|| format!("Cannot open log file in {}", dir.display()))?;
    Ok(tracing_appender::non_blocking(appender))
}

/// Flush buffered file output. Call before `std::process::exit`.
pub fn flush() {
    drop(GUARD.lock().unwrap_or_else(PoisonError::into_inner).take());
}
