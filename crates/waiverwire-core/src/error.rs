// Error taxonomy for claim submission and resolution.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::ids::{ClaimId, PlayerId, TeamId};

/// Every failure the engine can report.
///
/// Business-rule variants are expected outcomes that are surfaced verbatim to
/// the acting user. Infrastructure variants mean nothing was persisted and the
/// caller may retry.
#[derive(Debug, Error)]
pub enum WaiverError {
    // -- business rules ----------------------------------------------------
    #[error("player {0} is no longer available")]
    PlayerNoLongerAvailable(PlayerId),

    #[error("claim {0} has already been processed")]
    AlreadyProcessed(ClaimId),

    #[error("claim {0} cannot be cancelled")]
    NotCancellable(ClaimId),

    #[error("player {player} is not on team {team}'s roster")]
    DropPlayerNotOnRoster { team: TeamId, player: PlayerId },

    #[error("claim {0} not found")]
    ClaimNotFound(ClaimId),

    #[error("unknown player {0}")]
    UnknownPlayer(PlayerId),

    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    // -- internal guard ----------------------------------------------------
    /// `mark_terminal` was asked to move a claim that already left Pending.
    #[error("claim {0} is already in a terminal state")]
    AlreadyTerminal(ClaimId),

    // -- infrastructure ----------------------------------------------------
    #[error("roster mutation failed: {0}")]
    RosterMutationFailed(String),

    #[error("another resolution holds the lock; retry")]
    ResolutionBusy,

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl WaiverError {
    /// Stable machine-readable code for the command surface.
    pub fn code(&self) -> &'static str {
        match self {
            WaiverError::PlayerNoLongerAvailable(_) => "player_no_longer_available",
            WaiverError::AlreadyProcessed(_) => "already_processed",
            WaiverError::NotCancellable(_) => "not_cancellable",
            WaiverError::DropPlayerNotOnRoster { .. } => "drop_player_not_on_roster",
            WaiverError::ClaimNotFound(_) => "claim_not_found",
            WaiverError::UnknownPlayer(_) => "unknown_player",
            WaiverError::InvalidClaim(_) => "invalid_claim",
            WaiverError::AlreadyTerminal(_) => "already_terminal",
            WaiverError::RosterMutationFailed(_) => "roster_mutation_failed",
            WaiverError::ResolutionBusy => "resolution_busy",
            WaiverError::StorageUnavailable(_) => "storage_unavailable",
        }
    }

    /// Whether this is an expected, user-facing rejection rather than a fault.
    pub fn is_business_rule(&self) -> bool {
        match self {
            WaiverError::PlayerNoLongerAvailable(_)
            | WaiverError::AlreadyProcessed(_)
            | WaiverError::NotCancellable(_)
            | WaiverError::DropPlayerNotOnRoster { .. }
            | WaiverError::ClaimNotFound(_)
            | WaiverError::UnknownPlayer(_)
            | WaiverError::InvalidClaim(_) => true,
            WaiverError::AlreadyTerminal(_)
            | WaiverError::RosterMutationFailed(_)
            | WaiverError::ResolutionBusy
            | WaiverError::StorageUnavailable(_) => false,
        }
    }

    /// Whether the caller can safely retry the same command.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WaiverError::ResolutionBusy | WaiverError::StorageUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for WaiverError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) =>
            {
                WaiverError::ResolutionBusy
            }
            _ => WaiverError::StorageUnavailable(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for WaiverError {
    fn from(err: serde_json::Error) -> Self {
        WaiverError::StorageUnavailable(format!("corrupt stored value: {err}"))
    }
}
