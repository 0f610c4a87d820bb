//! Release manifests: what is installed, what the server offers, and what a run will fetch.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::debug;

use crate::core::UpdaterError;

/// Version of the running application, read from its package descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalManifest {
    /// Version string as written in the descriptor.
    pub version: String,
}

impl LocalManifest {
    /// Build a manifest from a known version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    /// Read the `version` field of a JSON package descriptor.
    ///
    /// An unreadable descriptor, invalid JSON, or a missing/empty `version`
    /// all yield [`UpdaterError::VersionNotSpecified`].
    pub async fn load(descriptor: &Path) -> Result<Self, UpdaterError> {
        debug!("Reading local version from {}", descriptor.display());

        let content = fs::read_to_string(descriptor).await.map_err(|e| {
            UpdaterError::VersionNotSpecified {
                reason: format!("cannot read {}: {e}", descriptor.display()),
            }
        })?;

        Self::parse(&content).map_err(|reason| UpdaterError::VersionNotSpecified {
            reason: format!("{reason} in {}", descriptor.display()),
        })
    }

    fn parse(content: &str) -> Result<Self, String> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|e| format!("invalid JSON ({e})"))?;

        match value.get("version").and_then(serde_json::Value::as_str).map(str::trim) {
            Some(version) if !version.is_empty() => Ok(Self::new(version)),
            _ => Err("no \"version\" property".to_string()),
        }
    }
}

/// Release description supplied by the caller (usually fetched from the release API).
///
/// Field names follow the current wire format (`version`, `downloadUrl`,
/// `checksum`, `kind`); the historical names `last`, `zip`/`source`, `sha1`
/// and `type` are accepted as aliases. Anything else is kept in `extra` so the
/// raw payload can be handed back to the caller untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteManifest {
    /// Latest released version.
    #[serde(default, alias = "last", skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Artifact location; present only when an update exists.
    #[serde(
        default,
        alias = "zip",
        alias = "source",
        alias = "download_url",
        skip_serializing_if = "Option::is_none"
    )]
    pub download_url: Option<String>,

    /// Versioned checksum of the artifact (`sha256:<hex>`, `sha1:<hex>` or bare hex).
    #[serde(default, alias = "sha1", skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Release kind; bundle replacement only happens for kinds containing `app`.
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Fields this crate does not interpret.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RemoteManifest {
    /// Manifest advertising `version` without an artifact.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: Some(version.into()),
            ..Self::default()
        }
    }

    /// Set the artifact location.
    #[must_use]
    pub fn with_download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = Some(url.into());
        self
    }

    /// Set the artifact checksum.
    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    /// Set the release kind.
    #[must_use]
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Parse a manifest from JSON, mapping failures to `api_response_not_valid`.
    pub fn from_json(content: &str) -> Result<Self, UpdaterError> {
        serde_json::from_str(content).map_err(|e| UpdaterError::ApiResponseInvalid {
            reason: e.to_string(),
        })
    }

    /// Download URL, treating an empty string as absent.
    #[must_use]
    pub fn artifact_url(&self) -> Option<&str> {
        self.download_url.as_deref().map(str::trim).filter(|url| !url.is_empty())
    }
}

/// The update a run has committed to fetching.
///
/// Only produced once an update is confirmed, so `source` is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateManifest {
    /// Version that will be installed.
    pub target_version: String,
    /// Artifact URL.
    pub source: String,
    /// Expected checksum of the artifact, if the server published one.
    pub checksum: Option<String>,
    /// Release kind, if the server published one.
    pub kind: Option<String>,
}

impl UpdateManifest {
    /// Whether this release replaces the application bundle.
    ///
    /// Releases without a kind are treated as application releases.
    #[must_use]
    pub fn replaces_bundle(&self) -> bool {
        self.kind.as_deref().is_none_or(|kind| kind.contains("app"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_load_local_manifest() {
        let temp = TempDir::new().unwrap();
        let descriptor = temp.path().join("package.json");
        tokio::fs::write(&descriptor, r#"{"name": "demo", "version": "1.4.2"}"#).await.unwrap();

        let local = LocalManifest::load(&descriptor).await.unwrap();
        assert_eq!(local.version, "1.4.2");
    }

    #[tokio::test]
    async fn test_load_local_manifest_without_version() {
        let temp = TempDir::new().unwrap();
        let descriptor = temp.path().join("package.json");
        tokio::fs::write(&descriptor, r#"{"name": "demo", "version": ""}"#).await.unwrap();

        let err = LocalManifest::load(&descriptor).await.unwrap_err();
        assert!(matches!(err, UpdaterError::VersionNotSpecified { .. }));
    }

    #[tokio::test]
    async fn test_load_local_manifest_missing_file() {
        let temp = TempDir::new().unwrap();
        let err = LocalManifest::load(&temp.path().join("nope.json")).await.unwrap_err();
        assert!(matches!(err, UpdaterError::VersionNotSpecified { .. }));
    }

    #[test]
    fn test_remote_manifest_accepts_historical_names() {
        let remote = RemoteManifest::from_json(
            r#"{"last": "2.0.0", "zip": "https://x/update.zip", "sha1": "abc", "type": "app", "notes": "hi"}"#,
        )
        .unwrap();

        assert_eq!(remote.version.as_deref(), Some("2.0.0"));
        assert_eq!(remote.artifact_url(), Some("https://x/update.zip"));
        assert_eq!(remote.checksum.as_deref(), Some("abc"));
        assert_eq!(remote.kind.as_deref(), Some("app"));
        assert_eq!(remote.extra.get("notes").and_then(|v| v.as_str()), Some("hi"));
    }

    #[test]
    fn test_remote_manifest_current_names() {
        let remote = RemoteManifest::from_json(
            r#"{"version": "1.1.0", "downloadUrl": "http://x/update.zip", "checksum": "sha256:00"}"#,
        )
        .unwrap();
        assert_eq!(remote.version.as_deref(), Some("1.1.0"));
        assert_eq!(remote.artifact_url(), Some("http://x/update.zip"));

        let json = serde_json::to_value(&remote).unwrap();
        assert_eq!(json["downloadUrl"], "http://x/update.zip");
    }

    #[test]
    fn test_remote_manifest_invalid_json() {
        let err = RemoteManifest::from_json("not json").unwrap_err();
        assert!(matches!(err, UpdaterError::ApiResponseInvalid { .. }));
    }

    #[test]
    fn test_empty_download_url_is_absent() {
        let remote = RemoteManifest::new("1.0.0").with_download_url("  ");
        assert_eq!(remote.artifact_url(), None);
    }

    #[test]
    fn test_replaces_bundle() {
        let mut manifest = UpdateManifest {
            target_version: "1.0.0".into(),
            source: "http://x/update.zip".into(),
            checksum: None,
            kind: None,
        };
        assert!(manifest.replaces_bundle());

        manifest.kind = Some("app,assets".into());
        assert!(manifest.replaces_bundle());

        manifest.kind = Some("assets".into());
        assert!(!manifest.replaces_bundle());
    }
}
