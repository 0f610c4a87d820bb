//! Drives one update run at a time through check, download, verify, extract and replace.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, mpsc, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::constants::{DEFAULT_BUNDLE_NAME, DEFAULT_DESCRIPTOR_NAME, DEFAULT_HELPER_NAME, DEFAULT_UPDATE_FILE_NAME};
use crate::core::{UpdateErrorKind, UpdaterError};
use crate::updater::download::{
    ArtifactKind, Downloader, ProgressSample, RequestOptions, ReqwestTransport, Transport,
};
use crate::updater::extract::{ArtifactExtractor, Unpacker, ZipUnpacker};
use crate::updater::manifest::{LocalManifest, RemoteManifest, UpdateManifest};
use crate::updater::replace::{
    ApplyReport, BundleFs, PlatformProbe, ProcessSpawner, ReplacementStrategy, SwapPlan,
    SystemSpawner, TokioFs,
};
use crate::updater::state::{Phase, RunState};
use crate::updater::verification::ChecksumVerifier;
use crate::updater::version_check::{Decision, VersionChecker};
use crate::utils::fs::atomic_write;

/// Where the application lives and what its files are called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    /// Directory holding the bundle (e.g. `resources/`).
    pub install_dir: PathBuf,
    /// File name of the installed bundle.
    pub bundle_name: String,
    /// File name the new bundle has inside the payload.
    pub update_file_name: String,
    /// File name of the swap helper inside the payload.
    pub helper_name: String,
    /// Directory the helper is staged into, outside `install_dir`.
    pub helper_dir: PathBuf,
    /// Package descriptor holding the running version.
    pub descriptor: PathBuf,
    /// Executable the helper starts after a deferred swap.
    pub relaunch: Option<PathBuf>,
}

impl InstallLayout {
    /// Default layout rooted at `install_dir`.
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        let install_dir = install_dir.into();
        Self {
            descriptor: install_dir.join(DEFAULT_DESCRIPTOR_NAME),
            bundle_name: DEFAULT_BUNDLE_NAME.to_string(),
            update_file_name: DEFAULT_UPDATE_FILE_NAME.to_string(),
            helper_name: DEFAULT_HELPER_NAME.to_string(),
            helper_dir: std::env::temp_dir().join("bundle-updater"),
            relaunch: None,
            install_dir,
        }
    }

    /// Path of the installed bundle.
    #[must_use]
    pub fn installed_bundle(&self) -> PathBuf {
        self.install_dir.join(&self.bundle_name)
    }
}

/// Notifications sent while a run is in progress.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UpdateEvent {
    /// A newer release exists; the run waits for `download()`.
    UpdateAvailable {
        /// The release that would be installed.
        manifest: UpdateManifest,
        /// Raw manifest as supplied by the caller.
        payload: RemoteManifest,
    },
    /// The swap helper is running. A host holding a lock on the bundle
    /// should exit now so the helper can finish.
    HelperSpawned {
        /// Command line of the helper.
        command: String,
    },
}

/// Final record of a run, handed to the completion callback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdateOutcome {
    /// Run identifier.
    pub run_id: Uuid,
    /// Why the run stopped, `None` on success.
    pub error: Option<UpdateErrorKind>,
    /// Human-readable description of the error.
    pub detail: Option<String>,
    /// The release the run was working on, if one was found.
    pub manifest: Option<UpdateManifest>,
    /// Raw manifest the run was started with.
    pub payload: Option<RemoteManifest>,
    /// Exit code of the swap helper, for deferred swaps.
    pub helper_exit_code: Option<i32>,
    /// Phase the run ended in.
    pub phase: Phase,
}

impl UpdateOutcome {
    /// Whether the run installed the update.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

type Callback<T> = Box<dyn Fn(&T) + Send + Sync>;

/// Clears the in-flight flag when a phase returns.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, UpdaterError> {
        if flag.swap(true, Ordering::AcqRel) {
            return Err(UpdaterError::RunInProgress);
        }
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Runs updates for one installation.
///
/// A run starts with [`process`](Self::process), which checks the supplied
/// manifest against the installed version. If an update exists the run stays
/// open until [`download`](Self::download) fetches, verifies, unpacks and
/// swaps it in; [`run`](Self::run) does both without pausing.
///
/// Only one run may be active. Starting a second one, or calling `download()`
/// without an open run, fails with [`UpdaterError::RunInProgress`] or
/// [`UpdaterError::NoActiveRun`]; those errors are returned directly and never
/// reach the completion callback. Every run that does start ends with exactly
/// one completion callback.
///
/// # Examples
///
/// ```rust,no_run
/// use bundle_updater::updater::{InstallLayout, RemoteManifest, UpdateOrchestrator};
///
/// # async fn example() -> anyhow::Result<()> {
/// let orchestrator = UpdateOrchestrator::system(InstallLayout::new("/opt/app/resources"))
///     .on_complete(|outcome| println!("update finished: {:?}", outcome.error));
///
/// let remote = RemoteManifest::new("1.1.0").with_download_url("https://example.com/update.zip");
/// if orchestrator.process(remote).await?.is_some() {
///     orchestrator.download(None).await?;
/// }
/// # Ok(())
/// # }
/// ```
pub struct UpdateOrchestrator<T, U, F, S> {
    downloader: Downloader<T>,
    extractor: Arc<ArtifactExtractor<U>>,
    fs: F,
    spawner: S,
    strategy: ReplacementStrategy,
    checker: VersionChecker,
    layout: InstallLayout,
    request: RequestOptions,
    on_complete: Option<Callback<UpdateOutcome>>,
    on_progress: Option<Callback<ProgressSample>>,
    on_entry: Option<Arc<dyn Fn(&Path) + Send + Sync>>,
    on_event: Option<Callback<UpdateEvent>>,
    run: Mutex<Option<RunState>>,
    in_flight: AtomicBool,
    phase: watch::Sender<Phase>,
    last_outcome: watch::Sender<Option<UpdateOutcome>>,
}

impl UpdateOrchestrator<ReqwestTransport, ZipUnpacker, TokioFs, SystemSpawner> {
    /// Orchestrator using the real network, filesystem and processes.
    #[must_use]
    pub fn system(layout: InstallLayout) -> Self {
        Self::new(layout, ReqwestTransport::default(), ZipUnpacker, TokioFs, SystemSpawner)
    }
}

impl<T, U, F, S> UpdateOrchestrator<T, U, F, S>
where
    T: Transport,
    U: Unpacker + 'static,
    F: BundleFs,
    S: ProcessSpawner,
{
    /// Assemble an orchestrator from its collaborators.
    ///
    /// The replacement strategy is chosen from [`PlatformProbe::current`].
    pub fn new(layout: InstallLayout, transport: T, unpacker: U, fs: F, spawner: S) -> Self {
        Self {
            downloader: Downloader::new(transport),
            extractor: Arc::new(ArtifactExtractor::new(unpacker)),
            fs,
            spawner,
            strategy: ReplacementStrategy::select(&PlatformProbe::current(), false),
            checker: VersionChecker::default(),
            layout,
            request: RequestOptions::default(),
            on_complete: None,
            on_progress: None,
            on_entry: None,
            on_event: None,
            run: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            phase: watch::Sender::new(Phase::Idle),
            last_outcome: watch::Sender::new(None),
        }
    }

    /// Re-select the replacement strategy for `probe`.
    #[must_use]
    pub fn with_platform(mut self, probe: PlatformProbe, prefer_detached: bool) -> Self {
        self.strategy = ReplacementStrategy::select(&probe, prefer_detached);
        self
    }

    /// Use `strategy` regardless of the platform.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: ReplacementStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the version checker.
    #[must_use]
    pub const fn with_version_checker(mut self, checker: VersionChecker) -> Self {
        self.checker = checker;
        self
    }

    /// Options for artifact requests.
    #[must_use]
    pub fn with_request_options(mut self, request: RequestOptions) -> Self {
        self.request = request;
        self
    }

    /// Minimum interval between progress callbacks.
    #[must_use]
    pub fn with_progress_throttle(mut self, throttle: std::time::Duration) -> Self {
        self.downloader = self.downloader.with_throttle(throttle);
        self
    }

    /// Called once at the end of every run.
    #[must_use]
    pub fn on_complete(mut self, callback: impl Fn(&UpdateOutcome) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Box::new(callback));
        self
    }

    /// Called with throttled download progress.
    #[must_use]
    pub fn on_progress(mut self, callback: impl Fn(&ProgressSample) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Called once per file extracted from an archive.
    #[must_use]
    pub fn on_entry(mut self, callback: impl Fn(&Path) + Send + Sync + 'static) -> Self {
        self.on_entry = Some(Arc::new(callback));
        self
    }

    /// Called with [`UpdateEvent`]s.
    #[must_use]
    pub fn on_event(mut self, callback: impl Fn(&UpdateEvent) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Box::new(callback));
        self
    }

    /// The install layout.
    pub const fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// The selected replacement strategy.
    pub const fn strategy(&self) -> &ReplacementStrategy {
        &self.strategy
    }

    /// Phase of the current run, or of the last finished one.
    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Watch phase changes.
    pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    /// Outcome of the last finished run.
    pub fn last_outcome(&self) -> Option<UpdateOutcome> {
        self.last_outcome.borrow().clone()
    }

    /// Start a run by checking `remote` against the installed version.
    ///
    /// Returns the update when one is available; the run then stays open for
    /// [`download`](Self::download) and an [`UpdateEvent::UpdateAvailable`]
    /// is emitted. When already up to date the run completes with
    /// `no_update_available` and `Ok(None)` is returned.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::RunInProgress`] if a run is already open (no completion)
    /// - check failures (`VersionNotSpecified`, `ApiResponseInvalid`), after the
    ///   run has completed with the matching kind
    pub async fn process(
        &self,
        remote: RemoteManifest,
    ) -> Result<Option<UpdateManifest>, UpdaterError> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let mut slot = self.run.lock().await;
        if slot.is_some() {
            return Err(UpdaterError::RunInProgress);
        }

        let mut state = RunState::new(remote.clone());
        info!("Run {} started (remote version {:?})", state.id, remote.version);
        self.phase.send_replace(Phase::Idle);

        let decision = match LocalManifest::load(&self.layout.descriptor).await {
            Ok(local) => self.checker.decide(&local, &remote),
            Err(e) => Err(e),
        };

        match decision {
            Ok(Decision::Available(manifest)) => {
                state.manifest = Some(manifest.clone());
                if let Err(e) = self.advance(&mut state, Phase::Checked) {
                    self.finish(state, Err(&e));
                    return Err(e);
                }
                self.emit(&UpdateEvent::UpdateAvailable {
                    manifest: manifest.clone(),
                    payload: remote,
                });
                *slot = Some(state);
                Ok(Some(manifest))
            }
            Ok(Decision::UpToDate {
                current,
                latest,
            }) => {
                let reason = UpdaterError::NoUpdateAvailable {
                    current,
                    latest,
                };
                self.finish(state, Err(&reason));
                Ok(None)
            }
            Err(e) => {
                self.finish(state, Err(&e));
                Err(e)
            }
        }
    }

    /// Fetch, verify, unpack and install the update found by `process()`.
    ///
    /// Archives are expanded into `extract_dir` (the install directory by
    /// default); raw bundles are written there as `update_file_name`.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::NoActiveRun`] without an open run, or
    ///   [`UpdaterError::RunInProgress`] while another phase is running; neither
    ///   completes a run
    /// - any pipeline failure, after the run has completed with its kind
    pub async fn download(&self, extract_dir: Option<PathBuf>) -> Result<UpdateOutcome, UpdaterError> {
        let _guard = InFlight::acquire(&self.in_flight)?;
        let Some(mut state) = self.run.lock().await.take() else {
            return Err(UpdaterError::NoActiveRun);
        };

        let target = extract_dir.unwrap_or_else(|| self.layout.install_dir.clone());
        match self.execute(&mut state, &target).await {
            Ok(report) => Ok(self.finish(state, Ok(report))),
            Err(e) => {
                error!("Run {} failed: {e}", state.id);
                self.finish(state, Err(&e));
                Err(e)
            }
        }
    }

    /// [`process`](Self::process) then [`download`](Self::download) into the
    /// install directory, without a confirmation pause.
    ///
    /// Returns `Ok(None)` when already up to date.
    pub async fn run(&self, remote: RemoteManifest) -> Result<Option<UpdateOutcome>, UpdaterError> {
        match self.process(remote).await? {
            Some(_) => self.download(None).await.map(Some),
            None => Ok(None),
        }
    }

    async fn execute(
        &self,
        state: &mut RunState,
        target: &Path,
    ) -> Result<Option<ApplyReport>, UpdaterError> {
        let manifest = state.manifest.clone().ok_or(UpdaterError::NoActiveRun)?;

        let artifact = self
            .downloader
            .fetch(&manifest.source, &self.request, &mut |sample| {
                if let Some(callback) = &self.on_progress {
                    callback(sample);
                }
            })
            .await?;
        self.advance(state, Phase::Downloaded)?;

        // Nothing touches the disk before the checksum matched
        let verification = ChecksumVerifier::verify(&artifact.bytes, manifest.checksum.as_deref())?;
        state.verified_hash = verification.digest().map(str::to_string);
        self.advance(state, Phase::Verified)?;

        let new_bundle = target.join(&self.layout.update_file_name);
        match artifact.kind {
            ArtifactKind::Archive => {
                self.extract(artifact.bytes, target).await?;
                self.advance(state, Phase::Extracted)?;
            }
            ArtifactKind::Binary => {
                debug!("Writing raw bundle to {}", new_bundle.display());
                let path = new_bundle.clone();
                tokio::task::spawn_blocking(move || atomic_write(&path, &artifact.bytes))
                    .await
                    .map_err(|e| UpdaterError::apply("write bundle", e))?
                    .map_err(|e| UpdaterError::apply("write bundle", format!("{e:#}")))?;
            }
        }

        if !manifest.replaces_bundle() {
            info!("Release kind {:?} does not replace the bundle", manifest.kind);
            return Ok(None);
        }

        if !self.fs.exists(&new_bundle).await {
            return Err(UpdaterError::UpdateFileNotFound {
                location: new_bundle.display().to_string(),
            });
        }
        state.downloaded_file = Some(new_bundle.clone());
        self.advance(state, Phase::Replacing)?;

        let plan = SwapPlan {
            new_bundle,
            installed_bundle: self.layout.installed_bundle(),
            helper_source: target.join(&self.layout.helper_name),
            helper_dest: self.layout.helper_dir.join(&self.layout.helper_name),
            relaunch: self.layout.relaunch.clone(),
        };
        info!("Replacing bundle ({} strategy)", self.strategy.name());
        let report = self
            .strategy
            .apply(&self.fs, &self.spawner, &plan, |command| {
                self.emit(&UpdateEvent::HelperSpawned {
                    command: command.to_string(),
                });
            })
            .await?;
        Ok(Some(report))
    }

    async fn extract(&self, bytes: Vec<u8>, target: &Path) -> Result<(), UpdaterError> {
        let extractor = Arc::clone(&self.extractor);
        let target = target.to_path_buf();
        let (tx, mut rx) = mpsc::unbounded_channel::<PathBuf>();

        let task = tokio::task::spawn_blocking(move || {
            extractor.extract(&bytes, &target, &mut |path| {
                let _ = tx.send(path.to_path_buf());
            })
        });

        while let Some(path) = rx.recv().await {
            if let Some(callback) = &self.on_entry {
                callback(&path);
            }
        }

        task.await.map_err(|e| UpdaterError::apply("extract", e))??;
        Ok(())
    }

    fn advance(&self, state: &mut RunState, next: Phase) -> Result<(), UpdaterError> {
        state.advance(next)?;
        self.phase.send_replace(next);
        Ok(())
    }

    fn emit(&self, event: &UpdateEvent) {
        debug!("Event: {event:?}");
        if let Some(callback) = &self.on_event {
            callback(event);
        }
    }

    /// The single exit point of every run. Consumes the run state, so a run
    /// can only finish once.
    fn finish(
        &self,
        mut state: RunState,
        result: Result<Option<ApplyReport>, &UpdaterError>,
    ) -> UpdateOutcome {
        let outcome = match result {
            Ok(report) => {
                state.phase = Phase::Applied;
                UpdateOutcome {
                    run_id: state.id,
                    error: None,
                    detail: None,
                    manifest: state.manifest,
                    payload: Some(state.payload),
                    helper_exit_code: report.and_then(|r| r.helper_exit_code),
                    phase: state.phase,
                }
            }
            Err(e) => {
                state.fail();
                let helper_exit_code = match e {
                    UpdaterError::HelperFailed {
                        code,
                    } => *code,
                    _ => None,
                };
                UpdateOutcome {
                    run_id: state.id,
                    error: e.kind(),
                    detail: Some(e.to_string()),
                    manifest: state.manifest,
                    payload: Some(state.payload),
                    helper_exit_code,
                    phase: state.phase,
                }
            }
        };

        match outcome.error {
            None => info!("Run {} completed successfully", outcome.run_id),
            Some(UpdateErrorKind::NoUpdateAvailable) => {
                info!("Run {} completed: no update available", outcome.run_id);
            }
            Some(kind) if kind.is_fatal() => {
                error!("Run {} left the installation without a bundle: {kind}", outcome.run_id);
            }
            Some(kind) => warn!("Run {} completed with {kind}", outcome.run_id),
        }

        self.phase.send_replace(outcome.phase);
        self.last_outcome.send_replace(Some(outcome.clone()));
        if let Some(callback) = &self.on_complete {
            callback(&outcome);
        }
        outcome
    }
}
