//! Updater configuration.
//!
//! Settings live in a TOML file that is looked up in this order:
//!
//! 1. the path given with `--config`
//! 2. the `BUNDLE_UPDATER_CONFIG` environment variable
//! 3. the platform default:
//!    - Unix/macOS: `~/.bundle-updater/config.toml`
//!    - Windows: `%LOCALAPPDATA%\bundle-updater\config.toml`
//!
//! A missing file at the default location means "use defaults"; a missing file
//! that was asked for explicitly is an error. Paths may use `~` and
//! environment variables. The release API token can also be supplied through
//! `BUNDLE_UPDATER_TOKEN`, which wins over the file.
//!
//! ```toml
//! remote_source = "https://releases.example.com/api/latest.json"
//! server_authoritative = true
//! log_file = "updater-log.txt"
//!
//! [request]
//! timeout_secs = 600
//!
//! [install]
//! install_dir = "~/Applications/Demo/resources"
//! relaunch = "~/Applications/Demo/demo"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::constants::{
    DEFAULT_BUNDLE_NAME, DEFAULT_DESCRIPTOR_NAME, DEFAULT_HELPER_NAME, DEFAULT_LOG_FILE,
    DEFAULT_UPDATE_FILE_NAME,
};
use crate::updater::{InstallLayout, RequestOptions, VersionChecker};

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "BUNDLE_UPDATER_CONFIG";

/// Environment variable carrying the release API token.
pub const TOKEN_ENV: &str = "BUNDLE_UPDATER_TOKEN";

const fn default_true() -> bool {
    true
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

fn default_bundle_name() -> String {
    DEFAULT_BUNDLE_NAME.to_string()
}

fn default_update_file_name() -> String {
    DEFAULT_UPDATE_FILE_NAME.to_string()
}

fn default_helper_name() -> String {
    DEFAULT_HELPER_NAME.to_string()
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdaterConfig {
    /// Release API endpoint (or local file) serving the remote manifest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_source: Option<String>,

    /// Bearer token for the release API and artifact downloads. Never written back out.
    #[serde(default, skip_serializing)]
    pub auth_token: Option<String>,

    /// Trust the server's answer instead of comparing versions locally.
    #[serde(default = "default_true")]
    pub server_authoritative: bool,

    /// Log file; relative paths are resolved against the install directory.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Echo debug logging to stderr.
    #[serde(default)]
    pub debug: bool,

    /// Artifact request options.
    #[serde(default)]
    pub request: RequestOptions,

    /// Where the application is installed.
    #[serde(default)]
    pub install: InstallConfig,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            remote_source: None,
            auth_token: None,
            server_authoritative: true,
            log_file: default_log_file(),
            debug: false,
            request: RequestOptions::default(),
            install: InstallConfig::default(),
        }
    }
}

/// The `[install]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallConfig {
    /// Directory holding the bundle; the current directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<String>,

    /// File name of the installed bundle.
    #[serde(default = "default_bundle_name")]
    pub bundle_name: String,

    /// File name of the new bundle inside a release payload.
    #[serde(default = "default_update_file_name")]
    pub update_file_name: String,

    /// File name of the swap helper inside a release payload.
    #[serde(default = "default_helper_name")]
    pub helper_name: String,

    /// Directory the swap helper is staged into.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helper_dir: Option<String>,

    /// Package descriptor holding the installed version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descriptor: Option<String>,

    /// Executable to start after a deferred swap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relaunch: Option<String>,

    /// Always swap through the detached helper.
    #[serde(default)]
    pub prefer_detached: bool,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            bundle_name: default_bundle_name(),
            update_file_name: default_update_file_name(),
            helper_name: default_helper_name(),
            helper_dir: None,
            descriptor: None,
            relaunch: None,
            prefer_detached: false,
        }
    }
}

/// Expand `~` and `$VARS` in a configured path.
pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

impl UpdaterConfig {
    /// Platform default config location.
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("bundle-updater")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".bundle-updater")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Load configuration from `explicit`, `BUNDLE_UPDATER_CONFIG`, or the
    /// default location, then apply `BUNDLE_UPDATER_TOKEN`.
    pub async fn load(explicit: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV).ok().filter(|p| !p.is_empty());

        let mut config = match (explicit, env_path) {
            (Some(path), _) => Self::load_from(path).await?,
            (None, Some(raw)) => Self::load_from(&expand_path(&raw)?).await?,
            (None, None) => {
                let path = Self::default_path()?;
                if fs::try_exists(&path).await.unwrap_or(false) {
                    Self::load_from(&path).await?
                } else {
                    debug!("No config at {}, using defaults", path.display());
                    Self::default()
                }
            }
        };

        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.is_empty()
        {
            config.auth_token = Some(token);
        }
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        debug!("Loading config from {}", path.display());
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// The install layout these settings describe.
    ///
    /// `install_dir_override` (from `--install-dir`) wins over the file.
    pub fn layout(&self, install_dir_override: Option<&Path>) -> Result<InstallLayout> {
        let install_dir = match (install_dir_override, &self.install.install_dir) {
            (Some(dir), _) => dir.to_path_buf(),
            (None, Some(raw)) => expand_path(raw)?,
            (None, None) => {
                std::env::current_dir().context("Failed to determine the current directory")?
            }
        };

        let mut layout = InstallLayout::new(&install_dir);
        layout.bundle_name.clone_from(&self.install.bundle_name);
        layout.update_file_name.clone_from(&self.install.update_file_name);
        layout.helper_name.clone_from(&self.install.helper_name);
        if let Some(raw) = &self.install.helper_dir {
            layout.helper_dir = expand_path(raw)?;
        }
        layout.descriptor = match &self.install.descriptor {
            Some(raw) => install_dir.join(expand_path(raw)?),
            None => install_dir.join(DEFAULT_DESCRIPTOR_NAME),
        };
        layout.relaunch = self.install.relaunch.as_deref().map(expand_path).transpose()?;
        Ok(layout)
    }

    /// Request options carrying the configured token.
    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        self.request.clone().with_auth_token(self.auth_token.clone())
    }

    /// Version checker in the configured mode.
    #[must_use]
    pub const fn version_checker(&self) -> VersionChecker {
        VersionChecker::new(self.server_authoritative)
    }

    /// Log file location, relative paths resolved against `install_dir`.
    pub fn log_file_path(&self, install_dir: &Path) -> Result<PathBuf> {
        let path = expand_path(&self.log_file)?;
        Ok(if path.is_absolute() { path } else { install_dir.join(path) })
    }
}
