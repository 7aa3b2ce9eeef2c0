// Conflict detection: which pending claims die when one claim is approved.
//
// Pure function over in-memory claims so it can be tested without storage.

use serde::{Deserialize, Serialize};

use crate::claim::WaiverClaim;
use crate::ids::ClaimId;

/// Which rule made a claim impossible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Another team's approved claim took the same pickup player.
    PickupAcquired,
    /// The claim references the player the winning team is dropping.
    DropChain,
}

impl ConflictReason {
    /// Resolution note stored on the auto-rejected claim.
    pub fn note(&self) -> &'static str {
        match self {
            ConflictReason::PickupAcquired => "player acquired by another team",
            ConflictReason::DropChain => "player no longer available for trade",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conflict {
    pub claim: ClaimId,
    pub reason: ConflictReason,
}

/// Every pending claim other than `approved` that approving it makes
/// impossible, in the order the claims were given.
///
/// A claim matching both rules is reported once, as `PickupAcquired`.
/// Claims that are not pending are ignored.
pub fn detect_conflicts(approved: &WaiverClaim, pending: &[WaiverClaim]) -> Vec<Conflict> {
    pending
        .iter()
        .filter(|c| c.id != approved.id && c.is_pending())
        .filter_map(|c| {
            let reason = if c.pickup_player == approved.pickup_player {
                ConflictReason::PickupAcquired
            } else if c.mentions(approved.drop_player) {
                ConflictReason::DropChain
            } else {
                return None;
            };
            Some(Conflict { claim: c.id, reason })
        })
        .collect()
}
