//! Self-update engine for packaged desktop applications.
//!
//! `bundle-updater` keeps an installed application bundle (for example an
//! `app.asar` next to the executable) current:
//!
//! 1. read the installed version from the package descriptor
//! 2. decide whether a release manifest offers an update
//! 3. stream the artifact with throttled progress
//! 4. verify its checksum before anything touches the disk
//! 5. unpack archives into the install directory
//! 6. swap the new bundle in, directly or, where running files are locked,
//!    through the detached `bundle-swap` helper
//!
//! Every run ends with exactly one [`updater::UpdateOutcome`], whose error
//! kind comes from the fixed taxonomy in [`core::UpdateErrorKind`].
//!
//! # Modules
//!
//! - [`updater`] - the update engine and its capabilities
//! - [`config`] - TOML configuration
//! - [`cli`] - the `bundle-updater` command line
//! - [`core`] - errors and the error-kind taxonomy
//! - [`utils`] - logging, atomic writes, backoff and progress bars
//! - [`constants`] - shared defaults
//!
//! # Example
//!
//! ```rust,no_run
//! use bundle_updater::updater::{InstallLayout, RemoteManifest, UpdateOrchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = UpdateOrchestrator::system(InstallLayout::new("/opt/demo/resources"))
//!     .on_complete(|outcome| println!("finished: {:?}", outcome.error));
//!
//! let remote = RemoteManifest::new("1.1.0").with_download_url("https://example.com/update.zip");
//! orchestrator.run(remote).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod updater;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
