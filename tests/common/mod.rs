//! Shared fixtures for the integration suite.

// Not every test file uses every helper
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use bundle_updater::test_utils::{FaultyFs, RecordingSpawner, StaticTransport, write_descriptor};
use bundle_updater::updater::{
    InstallLayout, PlatformProbe, UpdateOrchestrator, UpdateOutcome, ZipUnpacker,
};

pub const ARTIFACT_URL: &str = "http://releases.test/update.zip";

pub type TestOrchestrator =
    UpdateOrchestrator<StaticTransport, ZipUnpacker, FaultyFs, RecordingSpawner>;

/// A throwaway installation: `resources/` with a bundle and `package.json`,
/// plus a separate staging directory for the swap helper.
pub struct TestInstall {
    pub temp: TempDir,
    pub layout: InstallLayout,
    pub outcomes: Arc<Mutex<Vec<UpdateOutcome>>>,
}

impl TestInstall {
    /// An installation at `version` holding `bundle`.
    pub fn new(version: &str, bundle: &[u8]) -> Self {
        let temp = TempDir::new().unwrap();
        let install_dir = temp.path().join("resources");
        std::fs::create_dir_all(&install_dir).unwrap();
        write_descriptor(&install_dir, version);

        let mut layout = InstallLayout::new(&install_dir);
        layout.helper_dir = temp.path().join("staging");
        std::fs::write(layout.installed_bundle(), bundle).unwrap();

        Self {
            temp,
            layout,
            outcomes: Arc::default(),
        }
    }

    pub fn install_dir(&self) -> &Path {
        &self.layout.install_dir
    }

    pub fn installed_bundle(&self) -> PathBuf {
        self.layout.installed_bundle()
    }

    /// Files directly inside the install directory, sorted.
    pub fn files(&self) -> Vec<String> {
        let mut files: Vec<_> = std::fs::read_dir(self.install_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        files.sort();
        files
    }

    /// Orchestrator over this installation that records every completion.
    pub fn orchestrator(
        &self,
        transport: StaticTransport,
        fs: FaultyFs,
        spawner: RecordingSpawner,
        locks_open_files: bool,
    ) -> TestOrchestrator {
        let outcomes = Arc::clone(&self.outcomes);
        UpdateOrchestrator::new(self.layout.clone(), transport, ZipUnpacker, fs, spawner)
            .with_platform(PlatformProbe::simulated(locks_open_files), false)
            .on_complete(move |outcome| outcomes.lock().unwrap().push(outcome.clone()))
    }

    pub fn outcomes(&self) -> Vec<UpdateOutcome> {
        self.outcomes.lock().unwrap().clone()
    }
}
