//! Global constants used throughout the updater.
//!
//! Timeouts, retry parameters, and default file names live here so the
//! values shared between the library, the CLI, and the `bundle-swap` helper
//! stay in one place.

use std::time::Duration;

/// Minimum interval between two progress notifications during a download.
pub const PROGRESS_THROTTLE: Duration = Duration::from_millis(500);

/// Default upper bound for a whole download (connect + body).
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for fetching the remote release manifest.
pub const MANIFEST_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Marker looked for in a response's content type to classify it as an archive.
pub const ARCHIVE_CONTENT_MARKER: &str = "zip";

/// File extension that classifies a download URL as an archive.
pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Default user agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!("bundle-updater/", env!("CARGO_PKG_VERSION"));

/// Default name of the application bundle being replaced.
pub const DEFAULT_BUNDLE_NAME: &str = "app.asar";

/// Default name of the new bundle inside a release payload.
pub const DEFAULT_UPDATE_FILE_NAME: &str = "update.asar";

/// Default name of the package descriptor holding the local version.
pub const DEFAULT_DESCRIPTOR_NAME: &str = "package.json";

/// Default name of the append-only log file, relative to the install directory.
pub const DEFAULT_LOG_FILE: &str = "updater-log.txt";

/// Name of the detached swap helper shipped in every release payload.
#[cfg(windows)]
pub const DEFAULT_HELPER_NAME: &str = "bundle-swap.exe";

/// Name of the detached swap helper shipped in every release payload.
#[cfg(not(windows))]
pub const DEFAULT_HELPER_NAME: &str = "bundle-swap";

/// Starting delay for the helper's exponential backoff (100ms).
pub const SWAP_STARTING_BACKOFF_MS: u64 = 100;

/// Maximum backoff delay between two swap attempts (2s).
pub const SWAP_MAX_BACKOFF_MS: u64 = 2_000;

/// Number of unlink+rename attempts the helper makes before giving up.
///
/// With the backoff above this waits roughly a minute for the parent
/// application to exit and release its lock.
pub const SWAP_MAX_ATTEMPTS: u32 = 36;

/// Windows `DETACHED_PROCESS` creation flag.
pub const DETACHED_PROCESS: u32 = 0x0000_0008;

/// Windows `CREATE_NEW_PROCESS_GROUP` creation flag.
pub const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
