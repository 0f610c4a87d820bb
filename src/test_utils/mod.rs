//! Test utilities for the updater
//!
//! In-memory stand-ins for every capability the orchestrator consumes, so
//! whole update runs can be exercised without a network, a locking platform
//! or real child processes:
//!
//! - [`StaticTransport`] serves canned responses per URL
//! - [`RecordingSpawner`] records helper command lines and reports a fixed exit code
//! - [`FaultyFs`] forwards to the real filesystem but fails chosen operations
//! - [`zip_archive`] and [`release_archive`] build payload fixtures
//!
//! # Example
//!
//! ```rust,no_run
//! use bundle_updater::test_utils::{StaticTransport, release_archive};
//!
//! let payload = release_archive(b"new bundle");
//! let transport = StaticTransport::new().with_bytes("http://x/update.zip", payload);
//! ```

pub mod fakes;
pub mod fixtures;
pub mod transport;

pub use fakes::{FaultyFs, FsOp, RecordingSpawner};
pub use fixtures::{release_archive, write_descriptor, zip_archive};
pub use transport::StaticTransport;

use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. Uses `level` if given, otherwise
/// `RUST_LOG`; with neither, logging stays off.
///
/// ```bash
/// RUST_LOG=bundle_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true)
            .try_init();
    });
}
