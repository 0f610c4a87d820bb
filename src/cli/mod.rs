//! Command-line interface for the updater.
//!
//! ```bash
//! # Is there a newer release?
//! bundle-updater check
//!
//! # Install it without asking
//! bundle-updater update --yes
//!
//! # Check a downloaded artifact by hand
//! bundle-updater verify update.zip sha256:9f86d0...
//!
//! # Show what the updater would work on
//! bundle-updater status
//! ```
//!
//! Global flags:
//! - `--verbose/-v` debug logging, `--quiet/-q` errors only and no progress bars
//! - `--config/-c <path>` config file (see [`crate::config`])
//! - `--install-dir <dir>` overrides `[install] install_dir`

mod check;
mod common;
mod status;
mod update;
mod verify;

pub use check::CheckCommand;
pub use common::{fetch_remote_manifest, resolve_remote_source};
pub use status::StatusCommand;
pub use update::UpdateCommand;
pub use verify::{AlgorithmArg, VerifyCommand};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

use crate::config::UpdaterConfig;
use crate::utils::logging::{self, LoggingConfig};

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct CliContext {
    /// Loaded configuration.
    pub config: UpdaterConfig,
    /// `--install-dir`, if given.
    pub install_dir: Option<PathBuf>,
    /// `--quiet` was passed.
    pub quiet: bool,
}

/// Self-update engine for packaged desktop applications.
#[derive(Parser, Debug)]
#[command(
    name = "bundle-updater",
    about = "Check, download, verify and install application bundle updates",
    version,
    long_about = "bundle-updater fetches a release manifest, downloads the advertised artifact, \
                  verifies its checksum and swaps the new bundle in, directly or through a \
                  detached helper on platforms that lock running files."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log errors and hide progress bars.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Application install directory (holds the bundle and package.json).
    #[arg(long, global = true)]
    install_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check whether a newer release is available
    Check(CheckCommand),
    /// Download and install the latest release
    Update(UpdateCommand),
    /// Verify a file against a checksum, or print its digest
    Verify(VerifyCommand),
    /// Show the installation the updater works on
    Status(StatusCommand),
}

impl Cli {
    /// Load configuration, set up logging and run the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        let config = UpdaterConfig::load(self.config.as_deref()).await?;

        // No log file until the install directory exists
        let log_file = match config.layout(self.install_dir.as_deref()) {
            Ok(layout) if layout.install_dir.is_dir() => {
                Some(config.log_file_path(&layout.install_dir)?)
            }
            _ => None,
        };
        logging::init(&LoggingConfig {
            debug: self.verbose || config.debug,
            quiet: self.quiet,
            log_file,
        })?;
        debug!(
            remote_source = ?config.remote_source,
            server_authoritative = config.server_authoritative,
            has_token = config.auth_token.is_some(),
            "Loaded config"
        );

        let ctx = CliContext {
            config,
            install_dir: self.install_dir,
            quiet: self.quiet,
        };

        match self.command {
            Commands::Check(cmd) => cmd.execute(&ctx).await,
            Commands::Update(cmd) => cmd.execute(&ctx).await,
            Commands::Verify(cmd) => cmd.execute(&ctx).await,
            Commands::Status(cmd) => cmd.execute(&ctx).await,
        }
    }
}
