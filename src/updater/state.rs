//! Per-run state owned by an orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::core::UpdaterError;
use crate::updater::manifest::{RemoteManifest, UpdateManifest};

/// Where a run currently is.
///
/// Phases only move forward:
///
/// ```text
/// Idle -> Checked -> Downloaded -> Verified -> Extracted -> Replacing -> Applied
/// ```
///
/// `Extracted` may be skipped for raw bundles and `Replacing` for
/// resource-only releases. Any phase can move to `Failed`; `Applied` and
/// `Failed` are terminal. A check that finds nothing to install also ends in
/// `Failed`, carrying `no_update_available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has happened yet.
    Idle,
    /// An update was found and awaits download.
    Checked,
    /// The artifact is in memory.
    Downloaded,
    /// The artifact matched its checksum (or carried none).
    Verified,
    /// The archive was expanded.
    Extracted,
    /// The bundle swap is under way.
    Replacing,
    /// The run finished successfully.
    Applied,
    /// The run stopped with an error.
    Failed,
}

impl Phase {
    /// Whether the run is over.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }

    /// Whether `self -> next` is a legal move.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == Self::Failed {
            return true;
        }
        match (self, next) {
            (Self::Idle, Self::Checked) => true,
            (Self::Checked, Self::Downloaded) => true,
            (Self::Downloaded, Self::Verified) => true,
            (Self::Verified, Self::Extracted | Self::Replacing | Self::Applied) => true,
            (Self::Extracted, Self::Replacing | Self::Applied) => true,
            (Self::Replacing, Self::Applied) => true,
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checked => "checked",
            Self::Downloaded => "downloaded",
            Self::Verified => "verified",
            Self::Extracted => "extracted",
            Self::Replacing => "replacing",
            Self::Applied => "applied",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Everything one update run knows about itself.
#[derive(Debug, Clone)]
pub struct RunState {
    /// Run identifier, used in log lines.
    pub id: Uuid,
    /// When `process()` started the run.
    pub started_at: DateTime<Utc>,
    /// Current phase.
    pub phase: Phase,
    /// The update being installed, once known.
    pub manifest: Option<UpdateManifest>,
    /// Raw manifest the run was started with.
    pub payload: RemoteManifest,
    /// Where the new bundle ended up on disk.
    pub downloaded_file: Option<PathBuf>,
    /// Digest of the verified artifact.
    pub verified_hash: Option<String>,
}

impl RunState {
    /// Start a run for `payload`.
    #[must_use]
    pub fn new(payload: RemoteManifest) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            phase: Phase::Idle,
            manifest: None,
            payload,
            downloaded_file: None,
            verified_hash: None,
        }
    }

    /// Move to `next`.
    ///
    /// # Errors
    ///
    /// [`UpdaterError::FailedToApplyUpdate`] on a backwards or terminal move.
    pub fn advance(&mut self, next: Phase) -> Result<(), UpdaterError> {
        if !self.phase.can_transition_to(next) {
            return Err(UpdaterError::apply(
                "state",
                format!("invalid phase transition {} -> {next}", self.phase),
            ));
        }
        tracing::debug!("Run {}: {} -> {next}", self.id, self.phase);
        self.phase = next;
        Ok(())
    }

    /// Move to [`Phase::Failed`] unless already terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut state = RunState::new(RemoteManifest::new("1.1.0"));
        for next in [
            Phase::Checked,
            Phase::Downloaded,
            Phase::Verified,
            Phase::Extracted,
            Phase::Replacing,
            Phase::Applied,
        ] {
            state.advance(next).unwrap();
        }
        assert!(state.phase.is_terminal());
    }

    #[test]
    fn test_backwards_transition_rejected() {
        let mut state = RunState::new(RemoteManifest::default());
        state.advance(Phase::Checked).unwrap();
        state.advance(Phase::Downloaded).unwrap();
        assert!(state.advance(Phase::Checked).is_err());
        assert!(state.advance(Phase::Replacing).is_err());
        assert_eq!(state.phase, Phase::Downloaded);
    }

    #[test]
    fn test_terminal_phases_are_final() {
        let mut state = RunState::new(RemoteManifest::default());
        state.advance(Phase::Failed).unwrap();
        assert!(state.advance(Phase::Applied).is_err());
        state.fail();
        assert_eq!(state.phase, Phase::Failed);

        assert!(!Phase::Applied.can_transition_to(Phase::Failed));
    }

    #[test]
    fn test_phase_serialization() {
        assert_eq!(serde_json::to_string(&Phase::Replacing).unwrap(), "\"replacing\"");
        assert_eq!(Phase::Verified.to_string(), "verified");
    }
}
