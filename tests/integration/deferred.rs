use bundle_updater::core::UpdaterError;
use bundle_updater::test_utils::{
    FaultyFs, FsOp, RecordingSpawner, StaticTransport, release_archive,
};
use bundle_updater::updater::{RemoteManifest, UpdateEvent};
use std::sync::{Arc, Mutex};

use crate::common::{ARTIFACT_URL, TestInstall};

#[tokio::test]
async fn test_locked_platform_hands_swap_to_helper() {
    let mut install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    install.layout.relaunch = Some(install.temp.path().join("demo-app"));
    let fs = FaultyFs::locked();
    let spawner = RecordingSpawner::exiting_with(Some(0));
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);

    let orchestrator = install
        .orchestrator(
            StaticTransport::new().with_bytes(ARTIFACT_URL, release_archive(b"bundle 1.1.0")),
            fs.clone(),
            spawner.clone(),
            true,
        )
        .on_event(move |event| sink.lock().unwrap().push(event.clone()));

    let outcome = orchestrator
        .run(RemoteManifest::new("1.1.0").with_download_url(ARTIFACT_URL))
        .await
        .unwrap()
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(outcome.helper_exit_code, Some(0));

    // The locked bundle is never touched in-process
    let calls = fs.calls();
    assert!(!calls.contains(&FsOp::RemoveFile));
    assert!(!calls.contains(&FsOp::Rename));

    let commands = spawner.commands();
    assert_eq!(commands.len(), 1);
    let command_line = commands[0].to_string();
    assert!(command_line.contains("update.asar"));
    assert!(command_line.contains("app.asar"));
    assert!(command_line.contains("--relaunch"));

    let helper = install.layout.helper_dir.join(&install.layout.helper_name);
    assert!(helper.exists());

    let events = events.lock().unwrap();
    assert!(events.iter().any(|e| matches!(e, UpdateEvent::HelperSpawned { .. })));
}

#[tokio::test]
async fn test_helper_exit_code_is_reported() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    let orchestrator = install.orchestrator(
        StaticTransport::new().with_bytes(ARTIFACT_URL, release_archive(b"bundle 1.1.0")),
        FaultyFs::locked(),
        RecordingSpawner::exiting_with(Some(1)),
        true,
    );

    let err = orchestrator
        .run(RemoteManifest::new("1.1.0").with_download_url(ARTIFACT_URL))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdaterError::HelperFailed { code: Some(1) }));
    assert_eq!(install.outcomes()[0].helper_exit_code, Some(1));
}

#[tokio::test]
async fn test_helper_cannot_start() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    let orchestrator = install.orchestrator(
        StaticTransport::new().with_bytes(ARTIFACT_URL, release_archive(b"bundle 1.1.0")),
        FaultyFs::locked(),
        RecordingSpawner::failing(),
        true,
    );

    let err = orchestrator
        .run(RemoteManifest::new("1.1.0").with_download_url(ARTIFACT_URL))
        .await
        .unwrap_err();

    assert!(matches!(err, UpdaterError::FailedToApplyUpdate { .. }));
    assert_eq!(std::fs::read(install.installed_bundle()).unwrap(), b"bundle 1.0.0");
}
