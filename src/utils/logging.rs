//! Tracing subscriber setup for the CLI and the swap helper.
//!
//! Human-readable events go to stderr. When a log file is configured, the same
//! events are appended to it as plain text, one event per line, so a deferred
//! swap that runs after the application exited still leaves a trace next to
//! the install.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// How verbose logging should be and where it goes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Log `debug` events (`--verbose` or `debug = true`).
    pub debug: bool,
    /// Only log errors (`--quiet`).
    pub quiet: bool,
    /// Append-only log file.
    pub log_file: Option<PathBuf>,
}

impl LoggingConfig {
    /// Default level when `RUST_LOG` is not set.
    #[must_use]
    pub const fn level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the level from `config`. Fails if the log file cannot
/// be opened or a subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level()));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::io::stderr().is_terminal())
        .without_time();

    let file_layer = match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(fmt::layer().with_writer(Arc::new(file)).with_ansi(false).with_target(true))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install the tracing subscriber")
}
