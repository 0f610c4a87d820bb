//! Swapping the new bundle into place.
//!
//! Two strategies exist and one is picked per process by probing the platform:
//!
//! - [`DirectReplace`] unlinks the installed bundle and renames the new one over
//!   it, in-process. Used where open files can be removed.
//! - [`DeferredReplace`] stages the `bundle-swap` helper outside the install
//!   directory and spawns it detached. The helper waits for the application to
//!   release its lock, performs the same unlink and rename, and optionally
//!   relaunches the application. The orchestrator observes the helper's exit
//!   code and only then completes the run.
//!
//! Both strategies first copy the new bundle into the installed bundle's
//! directory when it was extracted elsewhere; a rename across filesystems
//! would otherwise fail after the old bundle is gone.
//!
//! The filesystem and process spawning sit behind [`BundleFs`] and
//! [`ProcessSpawner`] so that locked platforms and failing renames can be
//! simulated in tests.
//!
//! # Helper command line
//!
//! ```text
//! <helper> <new-bundle> <installed-bundle> [--relaunch <executable>]
//! ```
//!
//! On Windows the line is run through `cmd /s /c "..."` and passed verbatim,
//! each argument quoted with [`quote_windows_arg`] so paths with spaces and
//! trailing backslashes survive the MSVCRT argument parser. Elsewhere it runs
//! through `sh -c` with [`quote_posix_arg`].

use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::core::UpdaterError;

/// What the platform does with files held open by a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformProbe {
    /// Open files cannot be removed or replaced.
    pub locks_open_files: bool,
}

impl PlatformProbe {
    /// Probe the running platform.
    #[must_use]
    pub const fn current() -> Self {
        Self {
            locks_open_files: cfg!(windows),
        }
    }

    /// A probe with a fixed answer, for simulating other platforms.
    #[must_use]
    pub const fn simulated(locks_open_files: bool) -> Self {
        Self {
            locks_open_files,
        }
    }
}

impl Default for PlatformProbe {
    fn default() -> Self {
        Self::current()
    }
}

/// Filesystem operations used while swapping bundles.
pub trait BundleFs: Send + Sync {
    /// Remove a file.
    fn remove_file(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;
    /// Rename `from` to `to`, replacing `to` if the platform allows it.
    fn rename(&self, from: &Path, to: &Path) -> impl Future<Output = io::Result<()>> + Send;
    /// Copy `from` to `to`, preserving permissions.
    fn copy(&self, from: &Path, to: &Path) -> impl Future<Output = io::Result<u64>> + Send;
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> impl Future<Output = bool> + Send;
    /// Create a directory and its parents.
    fn create_dir_all(&self, path: &Path) -> impl Future<Output = io::Result<()>> + Send;
}

/// [`BundleFs`] backed by `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFs;

impl BundleFs for TokioFs {
    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        tokio::fs::remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        tokio::fs::rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        tokio::fs::copy(from, to).await
    }

    async fn exists(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        tokio::fs::create_dir_all(path).await
    }
}

/// A command to be started detached from the current process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedCommand {
    /// Executable to start.
    pub program: PathBuf,
    /// Arguments passed through the platform's normal quoting.
    pub args: Vec<String>,
    /// Pre-quoted command-line tail handed to the program verbatim (Windows).
    pub raw_tail: Option<String>,
}

impl fmt::Display for DetachedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        if let Some(tail) = &self.raw_tail {
            write!(f, " {tail}")?;
        }
        Ok(())
    }
}

/// Resolves once a spawned process exits.
///
/// Dropping the watch, or the orchestrator holding it, does not affect the
/// process.
#[derive(Debug)]
pub struct ExitWatch {
    rx: oneshot::Receiver<Option<i32>>,
}

impl ExitWatch {
    /// A watch plus the sender that completes it.
    #[must_use]
    pub fn channel() -> (oneshot::Sender<Option<i32>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self {
            rx,
        })
    }

    /// A watch that has already resolved.
    #[must_use]
    pub fn exited(code: Option<i32>) -> Self {
        let (tx, watch) = Self::channel();
        let _ = tx.send(code);
        watch
    }

    /// Wait for the exit code; `None` if the process was killed by a signal
    /// or could not be observed.
    pub async fn wait(self) -> Option<i32> {
        self.rx.await.ok().flatten()
    }
}

/// Process-spawning capability.
pub trait ProcessSpawner: Send + Sync {
    /// Start `command` detached and return a watch on its exit.
    fn spawn_detached(&self, command: &DetachedCommand) -> io::Result<ExitWatch>;
}

/// [`ProcessSpawner`] that starts real processes.
///
/// Children are placed in their own process group (and, on Windows, detached
/// from the console) so they survive the application exiting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemSpawner;

impl ProcessSpawner for SystemSpawner {
    fn spawn_detached(&self, command: &DetachedCommand) -> io::Result<ExitWatch> {
        let mut std_command = std::process::Command::new(&command.program);
        std_command
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use crate::constants::{CREATE_NEW_PROCESS_GROUP, DETACHED_PROCESS};
            use std::os::windows::process::CommandExt;

            std_command.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP);
            if let Some(tail) = &command.raw_tail {
                std_command.raw_arg(tail);
            }
        }

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;

            std_command.process_group(0);
            if let Some(tail) = &command.raw_tail {
                std_command.arg(tail);
            }
        }

        let mut child = tokio::process::Command::from(std_command).spawn()?;
        debug!("Spawned detached process {:?}: {command}", child.id());

        let (tx, watch) = ExitWatch::channel();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    warn!("Lost track of detached process: {e}");
                    None
                }
            };
            let _ = tx.send(code);
        });
        Ok(watch)
    }
}

/// Quote one argument for the MSVCRT command-line parser.
///
/// The result is always wrapped in double quotes so `cmd` metacharacters in
/// paths stay literal. Backslashes are doubled only where they precede a
/// quote, including the closing one.
#[must_use]
pub fn quote_windows_arg(arg: &str) -> String {
    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');

    let mut backslashes = 0usize;
    for ch in arg.chars() {
        match ch {
            '\\' => backslashes += 1,
            '"' => {
                quoted.extend(std::iter::repeat_n('\\', backslashes * 2 + 1));
                quoted.push('"');
                backslashes = 0;
            }
            _ => {
                quoted.extend(std::iter::repeat_n('\\', backslashes));
                quoted.push(ch);
                backslashes = 0;
            }
        }
    }
    quoted.extend(std::iter::repeat_n('\\', backslashes * 2));
    quoted.push('"');
    quoted
}

/// Quote one argument for a POSIX shell.
#[must_use]
pub fn quote_posix_arg(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

/// Shell the deferred helper is launched through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellFlavor {
    /// `cmd /s /c`, arguments passed verbatim.
    Cmd,
    /// `/bin/sh -c`.
    Posix,
}

impl ShellFlavor {
    /// Flavor of the running platform.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) { Self::Cmd } else { Self::Posix }
    }
}

/// Paths involved in one swap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapPlan {
    /// The downloaded or extracted bundle.
    pub new_bundle: PathBuf,
    /// The bundle the application runs from.
    pub installed_bundle: PathBuf,
    /// Helper inside the new payload.
    pub helper_source: PathBuf,
    /// Where the helper is staged before it runs.
    pub helper_dest: PathBuf,
    /// Executable to start once the swap is done.
    pub relaunch: Option<PathBuf>,
}

impl SwapPlan {
    /// Copy the new bundle next to the installed one when it was extracted
    /// elsewhere, so the final rename stays on one filesystem.
    ///
    /// Runs before anything is unlinked; a failed copy leaves the install untouched.
    pub async fn stage_beside_installed<F: BundleFs>(&self, fs: &F) -> Result<Self, UpdaterError> {
        let (Some(from_dir), Some(to_dir)) =
            (self.new_bundle.parent(), self.installed_bundle.parent())
        else {
            return Ok(self.clone());
        };
        if same_dir(from_dir, to_dir).await {
            return Ok(self.clone());
        }

        let name = self.new_bundle.file_name().ok_or_else(|| {
            UpdaterError::apply("stage bundle", format!("{} has no file name", self.new_bundle.display()))
        })?;
        let mut staged = to_dir.join(name);
        if staged == self.installed_bundle {
            let mut name = name.to_os_string();
            name.push(".new");
            staged = to_dir.join(name);
        }

        info!("Staging {} beside the installed bundle", self.new_bundle.display());
        if let Err(e) = fs.copy(&self.new_bundle, &staged).await {
            match fs.remove_file(&staged).await {
                Err(cleanup) if cleanup.kind() != io::ErrorKind::NotFound => {
                    warn!("Could not remove partial copy {}: {cleanup}", staged.display());
                }
                _ => {}
            }
            return Err(UpdaterError::apply("stage bundle", format!("{}: {e}", staged.display())));
        }

        Ok(Self {
            new_bundle: staged,
            ..self.clone()
        })
    }
}

async fn same_dir(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Result of a successful replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyReport {
    /// Whether the swap ran in a detached helper.
    pub deferred: bool,
    /// Helper exit code, for deferred swaps.
    pub helper_exit_code: Option<i32>,
}

/// Unlink-then-rename, in-process.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectReplace;

impl DirectReplace {
    /// Swap `plan.new_bundle` over `plan.installed_bundle`.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::FailedToApplyUpdate`] if the new bundle cannot be staged beside
    ///   the installed one, or the installed bundle cannot be removed
    /// - [`UpdaterError::BundleMissing`] if the rename fails after the unlink succeeded;
    ///   the application has no bundle at that point
    pub async fn apply<F: BundleFs>(
        &self,
        fs: &F,
        plan: &SwapPlan,
    ) -> Result<ApplyReport, UpdaterError> {
        let plan = plan.stage_beside_installed(fs).await?;
        let installed = &plan.installed_bundle;

        info!("Removing installed bundle {}", installed.display());
        match fs.remove_file(installed).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("No installed bundle at {}; installing fresh", installed.display());
            }
            Err(e) => return Err(UpdaterError::apply("unlink", format!("{}: {e}", installed.display()))),
        }

        info!("Moving {} into place", plan.new_bundle.display());
        if let Err(e) = fs.rename(&plan.new_bundle, installed).await {
            warn!("Rename failed after unlink; {} is now missing", installed.display());
            return Err(UpdaterError::BundleMissing {
                path: installed.display().to_string(),
                reason: e.to_string(),
            });
        }

        info!("Bundle replaced");
        Ok(ApplyReport {
            deferred: false,
            helper_exit_code: None,
        })
    }
}

/// Stage and run the swap helper detached.
#[derive(Debug, Clone, Copy)]
pub struct DeferredReplace {
    flavor: ShellFlavor,
}

impl Default for DeferredReplace {
    fn default() -> Self {
        Self::new(ShellFlavor::current())
    }
}

impl DeferredReplace {
    /// Launch the helper through `flavor`.
    #[must_use]
    pub const fn new(flavor: ShellFlavor) -> Self {
        Self {
            flavor,
        }
    }

    /// Build the command that runs the staged helper.
    #[must_use]
    pub fn command(&self, plan: &SwapPlan) -> DetachedCommand {
        let mut parts = vec![
            plan.helper_dest.display().to_string(),
            plan.new_bundle.display().to_string(),
            plan.installed_bundle.display().to_string(),
        ];
        if let Some(relaunch) = &plan.relaunch {
            parts.push("--relaunch".to_string());
            parts.push(relaunch.display().to_string());
        }

        match self.flavor {
            ShellFlavor::Cmd => {
                let line: Vec<String> = parts.iter().map(|p| quote_windows_arg(p)).collect();
                DetachedCommand {
                    program: PathBuf::from("cmd"),
                    args: Vec::new(),
                    raw_tail: Some(format!("/s /c \"{}\"", line.join(" "))),
                }
            }
            ShellFlavor::Posix => {
                let line: Vec<String> = parts.iter().map(|p| quote_posix_arg(p)).collect();
                DetachedCommand {
                    program: PathBuf::from("/bin/sh"),
                    args: vec!["-c".to_string(), line.join(" ")],
                    raw_tail: None,
                }
            }
        }
    }

    /// Copy the helper out of the new payload into its staging location.
    pub async fn stage_helper<F: BundleFs>(
        &self,
        fs: &F,
        plan: &SwapPlan,
    ) -> Result<(), UpdaterError> {
        if !fs.exists(&plan.helper_source).await {
            return Err(UpdaterError::apply(
                "stage helper",
                format!("{} is not part of the update payload", plan.helper_source.display()),
            ));
        }
        if let Some(parent) = plan.helper_dest.parent() {
            fs.create_dir_all(parent)
                .await
                .map_err(|e| UpdaterError::apply("stage helper", format!("{}: {e}", parent.display())))?;
        }
        fs.copy(&plan.helper_source, &plan.helper_dest).await.map_err(|e| {
            UpdaterError::apply("stage helper", format!("{}: {e}", plan.helper_dest.display()))
        })?;
        debug!("Staged helper at {}", plan.helper_dest.display());
        Ok(())
    }

    /// Stage the helper, spawn it and wait for it to exit.
    ///
    /// `on_spawned` runs once the helper is running; hosts that hold a lock
    /// on the bundle should exit from it so the helper can proceed.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::FailedToApplyUpdate`] if staging or spawning fails
    /// - [`UpdaterError::HelperFailed`] if the helper exits unsuccessfully
    pub async fn apply<F: BundleFs, S: ProcessSpawner>(
        &self,
        fs: &F,
        spawner: &S,
        plan: &SwapPlan,
        on_spawned: impl FnOnce(&DetachedCommand),
    ) -> Result<ApplyReport, UpdaterError> {
        self.stage_helper(fs, plan).await?;
        let plan = plan.stage_beside_installed(fs).await?;

        let command = self.command(&plan);
        info!("Starting swap helper: {command}");
        let watch = spawner
            .spawn_detached(&command)
            .map_err(|e| UpdaterError::apply("spawn", format!("{}: {e}", command.program.display())))?;
        on_spawned(&command);

        let code = watch.wait().await;
        info!("Swap helper exited with {code:?}");
        match code {
            Some(0) => Ok(ApplyReport {
                deferred: true,
                helper_exit_code: Some(0),
            }),
            code => Err(UpdaterError::HelperFailed {
                code,
            }),
        }
    }
}

/// How the bundle gets replaced on this platform.
#[derive(Debug, Clone, Copy)]
pub enum ReplacementStrategy {
    /// Unlink and rename in-process.
    Direct(DirectReplace),
    /// Hand the swap to a detached helper.
    Deferred(DeferredReplace),
}

impl ReplacementStrategy {
    /// Pick the strategy for `probe`; `prefer_detached` forces the helper
    /// even where direct replacement would work.
    #[must_use]
    pub fn select(probe: &PlatformProbe, prefer_detached: bool) -> Self {
        if probe.locks_open_files || prefer_detached {
            debug!("Using deferred replacement (locks_open_files={})", probe.locks_open_files);
            Self::Deferred(DeferredReplace::default())
        } else {
            debug!("Using direct replacement");
            Self::Direct(DirectReplace)
        }
    }

    /// Short name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Direct(_) => "direct",
            Self::Deferred(_) => "deferred",
        }
    }

    /// Run the swap.
    pub async fn apply<F: BundleFs, S: ProcessSpawner>(
        &self,
        fs: &F,
        spawner: &S,
        plan: &SwapPlan,
        on_spawned: impl FnOnce(&DetachedCommand),
    ) -> Result<ApplyReport, UpdaterError> {
        match self {
            Self::Direct(direct) => direct.apply(fs, plan).await,
            Self::Deferred(deferred) => deferred.apply(fs, spawner, plan, on_spawned).await,
        }
    }
}
