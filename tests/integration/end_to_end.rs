use bundle_updater::test_utils::{FaultyFs, RecordingSpawner, StaticTransport, release_archive};
use bundle_updater::updater::{
    ChecksumAlgorithm, ChecksumVerifier, Phase, RemoteManifest, VersionChecker,
};

use crate::common::{ARTIFACT_URL, TestInstall};

#[tokio::test]
async fn test_update_from_1_0_0_to_1_1_0() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    let payload = release_archive(b"bundle 1.1.0");
    let remote = RemoteManifest::new("1.1.0")
        .with_download_url(ARTIFACT_URL)
        .with_checksum(ChecksumVerifier::digest(ChecksumAlgorithm::Sha1, &payload));

    let orchestrator = install.orchestrator(
        StaticTransport::new().with_bytes(ARTIFACT_URL, payload),
        FaultyFs::new(),
        RecordingSpawner::exiting_with(Some(0)),
        false,
    );

    let outcome = orchestrator.run(remote.clone()).await.unwrap().unwrap();

    assert_eq!(outcome.error, None);
    assert_eq!(outcome.manifest.unwrap().target_version, "1.1.0");
    assert_eq!(outcome.payload, Some(remote));
    assert_eq!(outcome.phase, Phase::Applied);
    assert_eq!(std::fs::read(install.installed_bundle()).unwrap(), b"bundle 1.1.0");
    assert!(install.install_dir().join("locales/en.json").exists());
    assert_eq!(install.outcomes().len(), 1);
}

#[tokio::test]
async fn test_sha256_checksum_and_extract_dir() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    let payload = release_archive(b"bundle 1.1.0");
    let remote = RemoteManifest::new("1.1.0")
        .with_download_url(ARTIFACT_URL)
        .with_checksum(ChecksumVerifier::digest(ChecksumAlgorithm::Sha256, &payload))
        .with_kind("assets");
    let extract_dir = install.temp.path().join("unpacked");

    let orchestrator = install.orchestrator(
        StaticTransport::new().with_bytes(ARTIFACT_URL, payload),
        FaultyFs::new(),
        RecordingSpawner::exiting_with(Some(0)),
        false,
    );

    orchestrator.process(remote).await.unwrap().unwrap();
    let outcome = orchestrator.download(Some(extract_dir.clone())).await.unwrap();

    assert!(outcome.is_success());
    assert!(extract_dir.join("update.asar").exists());
    assert_eq!(std::fs::read(install.installed_bundle()).unwrap(), b"bundle 1.0.0");
}

#[tokio::test]
async fn test_client_side_version_check() {
    let install = TestInstall::new("10.0.0", b"bundle");
    let transport = StaticTransport::new();
    let orchestrator = install
        .orchestrator(
            transport.clone(),
            FaultyFs::new(),
            RecordingSpawner::exiting_with(Some(0)),
            false,
        )
        .with_version_checker(VersionChecker::new(false));

    // 2.0.0 is older than 10.0.0 even though it sorts later as a string
    let remote = RemoteManifest::new("2.0.0").with_download_url(ARTIFACT_URL);
    assert!(orchestrator.run(remote).await.unwrap().is_none());
    assert!(transport.requests().is_empty());
    assert_eq!(install.outcomes().len(), 1);
}

#[tokio::test]
async fn test_consecutive_runs() {
    let install = TestInstall::new("1.0.0", b"bundle 1.0.0");
    let payload = release_archive(b"bundle 1.1.0");
    let orchestrator = install.orchestrator(
        StaticTransport::new().with_bytes(ARTIFACT_URL, payload),
        FaultyFs::new(),
        RecordingSpawner::exiting_with(Some(0)),
        false,
    );

    let first = orchestrator
        .run(RemoteManifest::new("1.1.0").with_download_url(ARTIFACT_URL))
        .await
        .unwrap()
        .unwrap();
    let second = orchestrator.run(RemoteManifest::new("1.1.0")).await.unwrap();

    assert!(first.is_success());
    assert!(second.is_none());
    let outcomes = install.outcomes();
    assert_eq!(outcomes.len(), 2);
    assert_ne!(outcomes[0].run_id, outcomes[1].run_id);
}
