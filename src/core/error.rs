//! Error handling for the updater
//!
//! Two layers live here:
//! 1. [`UpdaterError`], the strongly-typed error every phase of an update run returns
//! 2. [`UpdateErrorKind`], the stable, ordinal error taxonomy surfaced to callers
//!    through the completion callback
//!
//! [`ErrorContext`] and [`user_friendly_error`] turn either into a coloured,
//! actionable message for the CLI.
//!
//! # Taxonomy
//!
//! | Ordinal | Name                        | Raised by                                   |
//! |---------|-----------------------------|---------------------------------------------|
//! | 0       | `version_not_specified`     | local descriptor has no version             |
//! | 1       | `cannot_connect_to_api`     | remote manifest could not be fetched        |
//! | 2       | `no_update_available`       | remote is not newer / has no download URL   |
//! | 3       | `api_response_not_valid`    | remote manifest lacks a version             |
//! | 4       | `update_file_not_found`     | artifact 404 or payload missing the bundle  |
//! | 5       | `failed_to_download_update` | transport failure or checksum mismatch      |
//! | 6       | `failed_to_apply_update`    | extraction, staging, spawn, helper failure  |
//! | 7       | `bundle_missing`            | old bundle removed but new one not in place |
//!
//! Ordinals 0 through 6 match the historical updater; 7 was added so the
//! unrecoverable half-applied state can never be confused with an ordinary
//! apply failure.

use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Error taxonomy reported to the caller of an update run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum UpdateErrorKind {
    /// The running application's descriptor has no version.
    VersionNotSpecified = 0,
    /// The release API could not be reached.
    CannotConnectToApi = 1,
    /// Already on the latest release.
    NoUpdateAvailable = 2,
    /// The release API answered with something unusable.
    ApiResponseNotValid = 3,
    /// The release artifact (or the bundle inside it) does not exist.
    UpdateFileNotFound = 4,
    /// Download failed or the downloaded bytes did not match the checksum.
    FailedToDownloadUpdate = 5,
    /// The artifact could not be unpacked or swapped in.
    FailedToApplyUpdate = 6,
    /// The old bundle is gone and the new one is not in place.
    BundleMissing = 7,
}

impl UpdateErrorKind {
    /// Every kind, in ordinal order.
    pub const ALL: [Self; 8] = [
        Self::VersionNotSpecified,
        Self::CannotConnectToApi,
        Self::NoUpdateAvailable,
        Self::ApiResponseNotValid,
        Self::UpdateFileNotFound,
        Self::FailedToDownloadUpdate,
        Self::FailedToApplyUpdate,
        Self::BundleMissing,
    ];

    /// Stable numeric code of this kind.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        self as u8
    }

    /// Stable snake_case name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::VersionNotSpecified => "version_not_specified",
            Self::CannotConnectToApi => "cannot_connect_to_api",
            Self::NoUpdateAvailable => "no_update_available",
            Self::ApiResponseNotValid => "api_response_not_valid",
            Self::UpdateFileNotFound => "update_file_not_found",
            Self::FailedToDownloadUpdate => "failed_to_download_update",
            Self::FailedToApplyUpdate => "failed_to_apply_update",
            Self::BundleMissing => "bundle_missing",
        }
    }

    /// Look a kind up by its ordinal.
    #[must_use]
    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(usize::from(ordinal)).copied()
    }

    /// Whether the installation may be left unusable.
    #[must_use]
    pub const fn is_fatal(self) -> bool {
        matches!(self, Self::BundleMissing)
    }
}

impl fmt::Display for UpdateErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The main error type for update operations.
///
/// Every phase of a run returns this type. [`UpdaterError::kind`] folds it into
/// the caller-facing [`UpdateErrorKind`]; variants that describe misuse of the
/// orchestrator rather than a failed run map to `None`.
#[derive(Error, Debug)]
pub enum UpdaterError {
    /// The local package descriptor has no usable version
    #[error("Application version not specified: {reason}")]
    VersionNotSpecified {
        /// Why no version could be read
        reason: String,
    },

    /// The release API could not be reached
    #[error("Cannot connect to release API at {url}: {reason}")]
    CannotConnectToApi {
        /// Manifest URL that was requested
        url: String,
        /// Transport failure description
        reason: String,
    },

    /// No newer release exists
    #[error("No update available (current {current}, latest {latest})")]
    NoUpdateAvailable {
        /// Version of the running application
        current: String,
        /// Version advertised by the release API
        latest: String,
    },

    /// The remote manifest is unusable
    #[error("Release API response is not valid: {reason}")]
    ApiResponseInvalid {
        /// What was wrong with the response
        reason: String,
    },

    /// The artifact or the bundle inside it does not exist
    #[error("Update file not found: {location}")]
    UpdateFileNotFound {
        /// URL or path that was expected to hold the update
        location: String,
    },

    /// The artifact could not be downloaded
    #[error("Failed to download update from {url}: {reason}")]
    FailedToDownloadUpdate {
        /// Artifact URL
        url: String,
        /// Transport failure description
        reason: String,
    },

    /// The downloaded bytes do not hash to the advertised checksum
    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Checksum advertised by the manifest
        expected: String,
        /// Checksum computed over the received bytes
        actual: String,
    },

    /// The artifact could not be unpacked, staged or swapped in
    #[error("Failed to apply update during {operation}: {reason}")]
    FailedToApplyUpdate {
        /// Step that failed (e.g. "extract", "unlink", "spawn")
        operation: String,
        /// Failure description
        reason: String,
    },

    /// The detached swap helper exited unsuccessfully
    #[error("Swap helper exited with {}", describe_exit(*.code))]
    HelperFailed {
        /// Exit code, `None` when the process was killed by a signal or could not be awaited
        code: Option<i32>,
    },

    /// The old bundle was removed but the new one could not be moved into place.
    ///
    /// The application cannot start until `path` is restored.
    #[error("Bundle missing at {path} after a partial swap: {reason}")]
    BundleMissing {
        /// Install path that is now empty
        path: String,
        /// Why the rename failed
        reason: String,
    },

    /// A run is already active on this orchestrator
    #[error("An update run is already in progress")]
    RunInProgress,

    /// `download()` was called without a successful `process()`
    #[error("No update run is active; call process() first")]
    NoActiveRun,

    /// Configuration error
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration error
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn describe_exit(code: Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "no exit code".to_string(),
    }
}

impl UpdaterError {
    /// Fold this error into the caller-facing taxonomy.
    #[must_use]
    pub const fn kind(&self) -> Option<UpdateErrorKind> {
        match self {
            Self::VersionNotSpecified {
                ..
            } => Some(UpdateErrorKind::VersionNotSpecified),
            Self::CannotConnectToApi {
                ..
            } => Some(UpdateErrorKind::CannotConnectToApi),
            Self::NoUpdateAvailable {
                ..
            } => Some(UpdateErrorKind::NoUpdateAvailable),
            Self::ApiResponseInvalid {
                ..
            } => Some(UpdateErrorKind::ApiResponseNotValid),
            Self::UpdateFileNotFound {
                ..
            } => Some(UpdateErrorKind::UpdateFileNotFound),
            Self::FailedToDownloadUpdate {
                ..
            }
            | Self::ChecksumMismatch {
                ..
            } => Some(UpdateErrorKind::FailedToDownloadUpdate),
            Self::FailedToApplyUpdate {
                ..
            }
            | Self::HelperFailed {
                ..
            }
            | Self::Io(_) => Some(UpdateErrorKind::FailedToApplyUpdate),
            Self::BundleMissing {
                ..
            } => Some(UpdateErrorKind::BundleMissing),
            Self::RunInProgress
            | Self::NoActiveRun
            | Self::ConfigError {
                ..
            } => None,
        }
    }

    /// Shorthand for [`UpdaterError::FailedToApplyUpdate`].
    pub fn apply(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::FailedToApplyUpdate {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Error wrapper carrying a suggestion and details for terminal output.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error message
    pub message: String,
    /// Taxonomy kind, when the error came from an update run
    pub kind: Option<UpdateErrorKind>,
    /// What the user can do about it
    pub suggestion: Option<String>,
    /// Extra explanation
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap a message without any hints.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colours.
    pub fn display(&self) {
        match self.kind {
            Some(kind) => eprintln!(
                "{} [{}]: {}",
                "error".red().bold(),
                kind.as_str().dimmed(),
                self.message
            ),
            None => eprintln!("{}: {}", "error".red().bold(), self.message),
        }

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }

    /// Process exit code for this error: the taxonomy ordinal offset by 10, or 1.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.kind.map_or(1, |kind| 10 + i32::from(kind.ordinal()))
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

fn create_error_context(error: &UpdaterError) -> ErrorContext {
    let mut ctx = ErrorContext::new(error.to_string());
    ctx.kind = error.kind();

    match error {
        UpdaterError::VersionNotSpecified {
            ..
        } => ctx
            .with_suggestion("Add a \"version\" field to the application's package.json")
            .with_details("The running version is read from the package descriptor inside the install directory"),
        UpdaterError::CannotConnectToApi {
            ..
        } => ctx
            .with_suggestion("Check your network connection and the `remote_source` setting"),
        UpdaterError::NoUpdateAvailable {
            ..
        } => ctx.with_suggestion("Nothing to do; the application is up to date"),
        UpdaterError::ApiResponseInvalid {
            ..
        } => ctx
            .with_suggestion("Make sure the release manifest contains a \"version\" field")
            .with_details("Expected JSON like {\"version\": \"1.2.0\", \"downloadUrl\": \"https://...\"}"),
        UpdaterError::ChecksumMismatch {
            ..
        } => ctx
            .with_suggestion("Retry the update; if it keeps failing the published checksum or artifact is wrong")
            .with_details("Nothing was extracted or replaced"),
        UpdaterError::BundleMissing {
            path,
            ..
        } => ctx
            .with_suggestion(format!("Reinstall the application or restore {path} manually"))
            .with_details("The old bundle was removed before the new one could be moved into place"),
        UpdaterError::HelperFailed {
            ..
        } => ctx.with_suggestion(
            "Check the updater log next to the application; the swap helper may not have obtained the file lock",
        ),
        UpdaterError::RunInProgress => {
            ctx.with_suggestion("Wait for the current update run to finish")
        }
        UpdaterError::Io(io_error) if io_error.kind() == std::io::ErrorKind::PermissionDenied => ctx
            .with_suggestion(
                "Try running with elevated permissions (sudo/Administrator) or check file ownership",
            ),
        _ => ctx,
    }
}

/// Convert any error into a user-friendly error with suggestions.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(updater_error) = error.downcast_ref::<UpdaterError>() {
        let mut ctx = create_error_context(updater_error);
        // Keep outer context lines the CLI attached
        if error.chain().count() > 1 {
            ctx.message = format!("{error:#}");
        }
        return ctx;
    }

    for cause in error.chain() {
        if let Some(updater_error) = cause.downcast_ref::<UpdaterError>() {
            let mut ctx = create_error_context(updater_error);
            ctx.message = format!("{error:#}");
            return ctx;
        }
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::NotFound {
            return ErrorContext::new(format!("{error:#}"))
                .with_suggestion("Check that the file or directory exists and the path is correct");
        }
    }

    ErrorContext::new(format!("{error:#}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordinals_are_stable() {
        let names: Vec<_> = UpdateErrorKind::ALL.iter().map(|k| (k.ordinal(), k.as_str())).collect();
        assert_eq!(
            names,
            vec![
                (0, "version_not_specified"),
                (1, "cannot_connect_to_api"),
                (2, "no_update_available"),
                (3, "api_response_not_valid"),
                (4, "update_file_not_found"),
                (5, "failed_to_download_update"),
                (6, "failed_to_apply_update"),
                (7, "bundle_missing"),
            ]
        );
        assert_eq!(UpdateErrorKind::from_ordinal(5), Some(UpdateErrorKind::FailedToDownloadUpdate));
        assert_eq!(UpdateErrorKind::from_ordinal(8), None);
    }

    #[test]
    fn test_checksum_mismatch_folds_into_download_failure() {
        let error = UpdaterError::ChecksumMismatch {
            expected: "sha1:00".into(),
            actual: "sha1:ff".into(),
        };
        assert_eq!(error.kind(), Some(UpdateErrorKind::FailedToDownloadUpdate));
    }

    #[test]
    fn test_bundle_missing_is_distinct_and_fatal() {
        let error = UpdaterError::BundleMissing {
            path: "/opt/app/resources/app.asar".into(),
            reason: "cross-device link".into(),
        };
        let kind = error.kind().unwrap();
        assert_ne!(kind, UpdateErrorKind::FailedToApplyUpdate);
        assert!(kind.is_fatal());
    }

    #[test]
    fn test_misuse_errors_have_no_kind() {
        assert_eq!(UpdaterError::RunInProgress.kind(), None);
        assert_eq!(UpdaterError::NoActiveRun.kind(), None);
    }

    #[test]
    fn test_helper_failed_message() {
        let error = UpdaterError::HelperFailed {
            code: Some(3),
        };
        assert_eq!(error.to_string(), "Swap helper exited with exit code 3");
        let error = UpdaterError::HelperFailed {
            code: None,
        };
        assert_eq!(error.to_string(), "Swap helper exited with no exit code");
    }

    #[test]
    fn test_user_friendly_error_keeps_kind_through_context() {
        use anyhow::Context;

        let result: anyhow::Result<()> = Err(UpdaterError::ApiResponseInvalid {
            reason: "missing version".into(),
        })
        .context("Failed to check for updates");

        let ctx = user_friendly_error(result.unwrap_err());
        assert_eq!(ctx.kind, Some(UpdateErrorKind::ApiResponseNotValid));
        assert!(ctx.message.contains("Failed to check for updates"));
        assert!(ctx.suggestion.is_some());
        assert_eq!(ctx.exit_code(), 13);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&UpdateErrorKind::FailedToApplyUpdate).unwrap();
        assert_eq!(json, "\"failed_to_apply_update\"");
    }
}
