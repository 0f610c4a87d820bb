use semver::Version;
use std::cmp::Ordering;
use tracing::{debug, info};

use crate::core::UpdaterError;
use crate::updater::manifest::{LocalManifest, RemoteManifest, UpdateManifest};

/// Outcome of comparing the installed version with a remote manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to install.
    UpToDate {
        /// Installed version.
        current: String,
        /// Version the server advertised.
        latest: String,
    },
    /// A newer release can be fetched.
    Available(UpdateManifest),
}

impl Decision {
    /// The update manifest, if an update is available.
    #[must_use]
    pub fn manifest(&self) -> Option<&UpdateManifest> {
        match self {
            Self::Available(manifest) => Some(manifest),
            Self::UpToDate {
                ..
            } => None,
        }
    }
}

/// Decides whether a remote release is an update for the running application.
///
/// Two modes exist:
///
/// - **Server-authoritative** (the default): the release API already decided.
///   An update exists exactly when the manifest carries a download URL.
/// - **Client-side comparison**: the versions are compared with semantic
///   versioning. A leading `v` and missing minor/patch components are
///   tolerated (`"2.0"` is `2.0.0`), and versions with more than three numeric
///   segments fall back to a segment-by-segment numeric comparison. Plain
///   string comparison is never used, so `"10.0"` correctly outranks `"2.0"`.
#[derive(Debug, Clone, Copy)]
pub struct VersionChecker {
    server_authoritative: bool,
}

impl Default for VersionChecker {
    fn default() -> Self {
        Self::new(true)
    }
}

impl VersionChecker {
    /// Create a checker; `server_authoritative` trusts the remote verbatim.
    #[must_use]
    pub const fn new(server_authoritative: bool) -> Self {
        Self {
            server_authoritative,
        }
    }

    /// Compare `local` against `remote`.
    ///
    /// # Errors
    ///
    /// - [`UpdaterError::VersionNotSpecified`] when the local version is empty or unparseable
    /// - [`UpdaterError::ApiResponseInvalid`] when the remote has no version, or an
    ///   unparseable one in client-side mode
    pub fn decide(
        &self,
        local: &LocalManifest,
        remote: &RemoteManifest,
    ) -> Result<Decision, UpdaterError> {
        let current = local.version.trim();
        if current.is_empty() {
            return Err(UpdaterError::VersionNotSpecified {
                reason: "the local manifest has an empty version".to_string(),
            });
        }

        let latest = remote
            .version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| UpdaterError::ApiResponseInvalid {
                reason: "the remote manifest has no version".to_string(),
            })?;

        let newer = if self.server_authoritative {
            debug!("Server-authoritative check: trusting remote manifest for {latest}");
            true
        } else {
            let ordering = compare_versions(current, latest)?;
            debug!("Version comparison {current} vs {latest}: {ordering:?}");
            ordering == Ordering::Less
        };

        match remote.artifact_url() {
            Some(source) if newer => {
                info!("Update available: {current} -> {latest}");
                Ok(Decision::Available(UpdateManifest {
                    target_version: latest.to_string(),
                    source: source.to_string(),
                    checksum: remote.checksum.clone(),
                    kind: remote.kind.clone(),
                }))
            }
            _ => {
                info!("No updates available (current {current}, latest {latest})");
                Ok(Decision::UpToDate {
                    current: current.to_string(),
                    latest: latest.to_string(),
                })
            }
        }
    }
}

/// Parse a version leniently: strips a `v` prefix and pads missing components.
#[must_use]
pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
    let (core, suffix) = trimmed.split_at(split_at);
    let segments: Vec<&str> = core.split('.').collect();
    if segments.is_empty()
        || segments.len() > 3
        || segments.iter().any(|s| s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    let mut padded = segments.iter().map(|s| s.trim_start_matches('0')).map(|s| {
        if s.is_empty() { "0" } else { s }
    });
    let major = padded.next().unwrap_or("0");
    let minor = padded.next().unwrap_or("0");
    let patch = padded.next().unwrap_or("0");

    Version::parse(&format!("{major}.{minor}.{patch}{suffix}")).ok()
}

/// Dot-separated numbers of the release part, plus whether a pre-release or
/// build suffix followed it.
fn numeric_segments(raw: &str) -> Option<(Vec<u64>, bool)> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    let (core, suffixed) = match trimmed.find(['-', '+']) {
        Some(at) => (&trimmed[..at], trimmed[at..].starts_with('-')),
        None => (trimmed, false),
    };
    let segments = core
        .split('.')
        .map(|segment| segment.parse::<u64>().ok())
        .collect::<Option<Vec<_>>>()?;
    Some((segments, suffixed))
}

/// Order two version strings, semver first, numeric segments second.
///
/// In the numeric fallback a pre-release sorts before the same release.
pub fn compare_versions(local: &str, remote: &str) -> Result<Ordering, UpdaterError> {
    if let (Some(a), Some(b)) = (parse_version(local), parse_version(remote)) {
        return Ok(a.cmp(&b));
    }

    let (local_segments, local_pre) =
        numeric_segments(local).ok_or_else(|| UpdaterError::VersionNotSpecified {
            reason: format!("'{local}' is not a valid version"),
        })?;
    let (remote_segments, remote_pre) =
        numeric_segments(remote).ok_or_else(|| UpdaterError::ApiResponseInvalid {
            reason: format!("'{remote}' is not a valid version"),
        })?;

    let width = local_segments.len().max(remote_segments.len());
    let pad = |mut v: Vec<u64>| {
        v.resize(width, 0);
        v
    };
    Ok(pad(local_segments)
        .cmp(&pad(remote_segments))
        .then_with(|| remote_pre.cmp(&local_pre)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(version: &str, url: Option<&str>) -> RemoteManifest {
        let manifest = RemoteManifest::new(version);
        match url {
            Some(url) => manifest.with_download_url(url),
            None => manifest,
        }
    }

    #[test]
    fn test_newer_remote_with_url_is_available() {
        let checker = VersionChecker::new(false);
        let decision = checker
            .decide(
                &LocalManifest::new("1.0.0"),
                &remote("1.1.0", Some("http://x/update.zip")).with_checksum("sha1:abc"),
            )
            .unwrap();

        let manifest = decision.manifest().unwrap();
        assert_eq!(manifest.target_version, "1.1.0");
        assert_eq!(manifest.source, "http://x/update.zip");
        assert_eq!(manifest.checksum.as_deref(), Some("sha1:abc"));
    }

    #[test]
    fn test_equal_versions_are_up_to_date() {
        let checker = VersionChecker::new(false);
        let decision = checker
            .decide(&LocalManifest::new("1.1.0"), &remote("1.1.0", Some("http://x/u.zip")))
            .unwrap();
        assert!(decision.manifest().is_none());
    }

    #[test]
    fn test_missing_url_is_up_to_date() {
        for server_authoritative in [true, false] {
            let checker = VersionChecker::new(server_authoritative);
            let decision =
                checker.decide(&LocalManifest::new("1.0.0"), &remote("2.0.0", None)).unwrap();
            assert!(decision.manifest().is_none());
        }
    }

    #[test]
    fn test_older_remote_is_up_to_date() {
        let checker = VersionChecker::new(false);
        let decision = checker
            .decide(&LocalManifest::new("1.2.0"), &remote("1.1.9", Some("http://x/u.zip")))
            .unwrap();
        assert!(matches!(decision, Decision::UpToDate { .. }));
    }

    #[test]
    fn test_multi_digit_segments_compare_numerically() {
        let checker = VersionChecker::new(false);
        let decision = checker
            .decide(&LocalManifest::new("2.0"), &remote("10.0", Some("http://x/u.zip")))
            .unwrap();
        assert!(decision.manifest().is_some());

        let decision = checker
            .decide(&LocalManifest::new("1.9.0"), &remote("1.10.0", Some("http://x/u.zip")))
            .unwrap();
        assert!(decision.manifest().is_some());
    }

    #[test]
    fn test_server_authoritative_trusts_remote() {
        let checker = VersionChecker::new(true);
        // Server says there is an update even though the version is not newer
        let decision = checker
            .decide(&LocalManifest::new("3.0.0"), &remote("2.0.0", Some("http://x/u.zip")))
            .unwrap();
        assert_eq!(decision.manifest().unwrap().target_version, "2.0.0");
    }

    #[test]
    fn test_empty_local_version() {
        let checker = VersionChecker::default();
        let err = checker
            .decide(&LocalManifest::new(""), &remote("1.0.0", Some("http://x/u.zip")))
            .unwrap_err();
        assert!(matches!(err, UpdaterError::VersionNotSpecified { .. }));
    }

    #[test]
    fn test_missing_remote_version() {
        let checker = VersionChecker::default();
        let err = checker
            .decide(&LocalManifest::new("1.0.0"), &RemoteManifest::default())
            .unwrap_err();
        assert!(matches!(err, UpdaterError::ApiResponseInvalid { .. }));
    }

    #[test]
    fn test_unparseable_remote_version() {
        let checker = VersionChecker::new(false);
        let err = checker
            .decide(&LocalManifest::new("1.0.0"), &remote("latest", Some("http://x/u.zip")))
            .unwrap_err();
        assert!(matches!(err, UpdaterError::ApiResponseInvalid { .. }));
    }

    #[test]
    fn test_parse_version_leniency() {
        assert_eq!(parse_version("v1.2.3"), Some(Version::new(1, 2, 3)));
        assert_eq!(parse_version("2"), Some(Version::new(2, 0, 0)));
        assert_eq!(parse_version("2.01"), Some(Version::new(2, 1, 0)));
        assert_eq!(parse_version("1.0-beta.1").map(|v| v.pre.to_string()), Some("beta.1".into()));
        assert_eq!(parse_version("1.2.3.4"), None);
        assert_eq!(parse_version("abc"), None);
    }

    #[test]
    fn test_prerelease_ordering() {
        assert_eq!(compare_versions("1.0.0-beta.1", "1.0.0").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("1.0.0", "1.0.0-rc.1").unwrap(), Ordering::Greater);
    }

    #[test]
    fn test_four_segment_versions() {
        assert_eq!(compare_versions("1.2.3.4", "1.2.3.10").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("1.2.3", "1.2.3.0").unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_prerelease_against_four_segment_version() {
        assert_eq!(compare_versions("1.0.0-beta.1", "1.0.0.1").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("1.0.0.1", "1.0.0-beta.1").unwrap(), Ordering::Greater);
        assert_eq!(compare_versions("1.0.0-beta.1", "1.0.0.0").unwrap(), Ordering::Less);
        assert_eq!(compare_versions("1.0.0.0+build.7", "1.0.0").unwrap(), Ordering::Equal);
        assert!(matches!(
            compare_versions("1.0.0.1", "1.0.x").unwrap_err(),
            UpdaterError::ApiResponseInvalid { .. }
        ));
    }
}
