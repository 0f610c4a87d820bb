//! Filesystem and process fakes for replacement tests.

use std::collections::HashSet;
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::updater::replace::{BundleFs, DetachedCommand, ExitWatch, ProcessSpawner, TokioFs};

/// Operations [`FaultyFs`] can record and fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FsOp {
    /// `remove_file`
    RemoveFile,
    /// `rename`
    Rename,
    /// `copy`
    Copy,
    /// `exists`
    Exists,
    /// `create_dir_all`
    CreateDirAll,
}

/// [`BundleFs`] that forwards to the real filesystem except for operations
/// configured to fail. Every call is recorded.
#[derive(Debug, Clone, Default)]
pub struct FaultyFs {
    failing: HashSet<FsOp>,
    // Renames between different directories fail, like a move across filesystems
    cross_device: bool,
    calls: Arc<Mutex<Vec<FsOp>>>,
}

impl FaultyFs {
    /// A filesystem that fails nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates a platform where the running bundle is locked.
    pub fn locked() -> Self {
        Self::new().fail_on(FsOp::RemoveFile).fail_on(FsOp::Rename)
    }

    /// Make `op` fail.
    pub fn fail_on(mut self, op: FsOp) -> Self {
        self.failing.insert(op);
        self
    }

    /// Make renames fail whenever source and destination sit in different
    /// directories.
    pub fn cross_device(mut self) -> Self {
        self.cross_device = true;
        self
    }

    /// Operations called so far, in order.
    pub fn calls(&self) -> Vec<FsOp> {
        self.calls.lock().expect("call log poisoned").clone()
    }

    fn record(&self, op: FsOp) -> io::Result<()> {
        self.calls.lock().expect("call log poisoned").push(op);
        if !self.failing.contains(&op) {
            return Ok(());
        }
        Err(match op {
            FsOp::RemoveFile => io::Error::new(
                io::ErrorKind::PermissionDenied,
                "the file is in use by another process",
            ),
            FsOp::Rename => io::Error::other("simulated rename failure"),
            _ => io::Error::other(format!("simulated {op:?} failure")),
        })
    }
}

impl BundleFs for FaultyFs {
    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.record(FsOp::RemoveFile)?;
        TokioFs.remove_file(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record(FsOp::Rename)?;
        if self.cross_device && from.parent() != to.parent() {
            return Err(io::Error::other("Invalid cross-device link (os error 18)"));
        }
        TokioFs.rename(from, to).await
    }

    async fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        self.record(FsOp::Copy)?;
        TokioFs.copy(from, to).await
    }

    async fn exists(&self, path: &Path) -> bool {
        if self.record(FsOp::Exists).is_err() {
            return false;
        }
        TokioFs.exists(path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.record(FsOp::CreateDirAll)?;
        TokioFs.create_dir_all(path).await
    }
}

/// [`ProcessSpawner`] that records commands instead of running them.
#[derive(Debug, Clone)]
pub struct RecordingSpawner {
    // `None` makes the spawn itself fail
    exit: Option<Option<i32>>,
    commands: Arc<Mutex<Vec<DetachedCommand>>>,
}

impl RecordingSpawner {
    /// Every spawned process "exits" immediately with `code`.
    pub fn exiting_with(code: Option<i32>) -> Self {
        Self {
            exit: Some(code),
            commands: Arc::default(),
        }
    }

    /// Every spawn fails.
    pub fn failing() -> Self {
        Self {
            exit: None,
            commands: Arc::default(),
        }
    }

    /// Commands spawned so far.
    pub fn commands(&self) -> Vec<DetachedCommand> {
        self.commands.lock().expect("command log poisoned").clone()
    }
}

impl ProcessSpawner for RecordingSpawner {
    fn spawn_detached(&self, command: &DetachedCommand) -> io::Result<ExitWatch> {
        match self.exit {
            Some(code) => {
                self.commands.lock().expect("command log poisoned").push(command.clone());
                Ok(ExitWatch::exited(code))
            }
            None => Err(io::Error::new(io::ErrorKind::NotFound, "helper is not executable")),
        }
    }
}
