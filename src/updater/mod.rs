//! Self-update engine for a packaged desktop application.
//!
//! A run moves through fixed phases, each in its own module:
//!
//! 1. [`version_check`] decides whether the remote manifest is an update
//! 2. [`download`] streams the artifact into memory with throttled progress
//! 3. [`verification`] checks the exact received bytes against the manifest checksum
//! 4. [`extract`] expands archives into the install (or a chosen) directory
//! 5. [`replace`] swaps the new bundle in, directly or through a detached helper
//!
//! [`UpdateOrchestrator`] strings the phases together, owns the per-run
//! [`state`], and reports the end of every run through a single completion
//! callback carrying an [`UpdateOutcome`].
//!
//! Network, archive decoding, filesystem and process spawning are consumed
//! through the [`Transport`], [`Unpacker`], [`BundleFs`] and [`ProcessSpawner`]
//! capabilities.
//!
//! [`swap`] holds the other half of a deferred replacement: the retry loop the
//! detached `bundle-swap` helper runs once the application has exited.
//!
//! # Example
//!
//! ```rust,no_run
//! use bundle_updater::updater::{InstallLayout, RemoteManifest, UpdateOrchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let orchestrator = UpdateOrchestrator::system(InstallLayout::new("/opt/app/resources"))
//!     .on_progress(|p| println!("{:.0}%", p.fraction_complete * 100.0));
//!
//! let remote = RemoteManifest::from_json(
//!     r#"{"version": "1.1.0", "downloadUrl": "https://example.com/update.zip"}"#,
//! )?;
//! if let Some(outcome) = orchestrator.run(remote).await? {
//!     println!("installed {:?}", outcome.manifest);
//! }
//! # Ok(())
//! # }
//! ```

pub mod download;
pub mod extract;
pub mod manifest;
pub mod orchestrator;
pub mod replace;
pub mod state;
pub mod swap;
pub mod verification;
pub mod version_check;


pub use download::{
    ArtifactKind, DownloadedArtifact, Downloader, ProgressSample, ProgressTracker, RequestOptions,
    ReqwestTransport, Transport, TransportResponse,
};
pub use extract::{ArtifactExtractor, ExtractedEntry, Unpacker, ZipUnpacker};
pub use manifest::{LocalManifest, RemoteManifest, UpdateManifest};
pub use orchestrator::{InstallLayout, UpdateEvent, UpdateOrchestrator, UpdateOutcome};
pub use replace::{
    ApplyReport, BundleFs, DeferredReplace, DetachedCommand, DirectReplace, ExitWatch,
    PlatformProbe, ProcessSpawner, ReplacementStrategy, ShellFlavor, SwapPlan, SystemSpawner,
    TokioFs, quote_posix_arg, quote_windows_arg,
};
pub use state::{Phase, RunState};
pub use swap::swap_with_retry;
pub use verification::{ChecksumAlgorithm, ChecksumVerifier, Verification};
pub use version_check::{Decision, VersionChecker, compare_versions, parse_version};
