// Waiver claim representation and lifecycle state.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::ids::{text_enum, ClaimId, PlayerId, TeamId};

/// Coarse priority bucket. Earlier rounds are meant to be reviewed first, but
/// nothing enforces that; the administrator picks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum WaiverRound {
    #[serde(rename = "1st")]
    First,
    #[serde(rename = "2nd")]
    Second,
    #[serde(rename = "3rd")]
    Third,
    #[serde(rename = "4th")]
    Fourth,
    #[serde(rename = "5th")]
    Fifth,
    #[serde(rename = "6th")]
    Sixth,
}

impl WaiverRound {
    pub const ALL: [WaiverRound; 6] = [
        WaiverRound::First,
        WaiverRound::Second,
        WaiverRound::Third,
        WaiverRound::Fourth,
        WaiverRound::Fifth,
        WaiverRound::Sixth,
    ];

    /// 1-based round number; this is what gets persisted.
    pub fn ordinal(self) -> u8 {
        match self {
            WaiverRound::First => 1,
            WaiverRound::Second => 2,
            WaiverRound::Third => 3,
            WaiverRound::Fourth => 4,
            WaiverRound::Fifth => 5,
            WaiverRound::Sixth => 6,
        }
    }

    pub fn from_ordinal(n: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|r| i64::from(r.ordinal()) == n)
    }

    /// Parse "1st", "2ND", or a bare "2".
    pub fn from_str_round(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<i64>() {
            return Self::from_ordinal(n);
        }
        Self::ALL
            .into_iter()
            .find(|r| r.display_str().eq_ignore_ascii_case(s))
    }

    pub fn display_str(&self) -> &'static str {
        match self {
            WaiverRound::First => "1st",
            WaiverRound::Second => "2nd",
            WaiverRound::Third => "3rd",
            WaiverRound::Fourth => "4th",
            WaiverRound::Fifth => "5th",
            WaiverRound::Sixth => "6th",
        }
    }
}

impl fmt::Display for WaiverRound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_str())
    }
}

impl ToSql for WaiverRound {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(i64::from(self.ordinal())))
    }
}

impl FromSql for WaiverRound {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let n = value.as_i64()?;
        WaiverRound::from_ordinal(n).ok_or(FromSqlError::OutOfRange(n))
    }
}

/// Claim lifecycle. Only `Pending` is mutable; the other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Pending => "pending",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Rejected => "rejected",
        }
    }

    pub fn from_str_status(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ClaimStatus::Pending),
            "approved" => Some(ClaimStatus::Approved),
            "rejected" => Some(ClaimStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ClaimStatus::Pending => false,
            ClaimStatus::Approved | ClaimStatus::Rejected => true,
        }
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToSql for ClaimStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for ClaimStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value, "claim status", ClaimStatus::from_str_status)
    }
}

/// A request to drop one rostered player and pick up one free player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaiverClaim {
    pub id: ClaimId,
    pub team: TeamId,
    pub pickup_player: PlayerId,
    pub drop_player: PlayerId,
    pub round: WaiverRound,
    /// The team's own preference order among its claims in the same round.
    pub submission_order: u32,
    pub status: ClaimStatus,
    /// Why the claim was rejected. `None` while pending and on approval.
    pub resolution_note: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    pub processed_by: Option<String>,
}

impl WaiverClaim {
    pub fn is_pending(&self) -> bool {
        self.status == ClaimStatus::Pending
    }

    /// Whether this claim names `player` as either side of the move.
    pub fn mentions(&self, player: PlayerId) -> bool {
        self.pickup_player == player || self.drop_player == player
    }
}

/// What a team submits; the store assigns id, status and timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewClaim {
    pub team: TeamId,
    pub pickup_player: PlayerId,
    pub drop_player: PlayerId,
    pub round: WaiverRound,
    pub submission_order: u32,
}

/// Optional narrowing for claim listings. Every set field must match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimFilter {
    #[serde(default)]
    pub team: Option<TeamId>,
    #[serde(default)]
    pub round: Option<WaiverRound>,
    /// Matches claims that mention the player on either side.
    #[serde(default)]
    pub player: Option<PlayerId>,
}

impl ClaimFilter {
    pub fn for_team(team: TeamId) -> Self {
        ClaimFilter {
            team: Some(team),
            ..Default::default()
        }
    }

    pub fn matches(&self, claim: &WaiverClaim) -> bool {
        self.team.map_or(true, |t| claim.team == t)
            && self.round.map_or(true, |r| claim.round == r)
            && self.player.map_or(true, |p| claim.mentions(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_claim() -> WaiverClaim {
        WaiverClaim {
            id: ClaimId(1),
            team: TeamId(3),
            pickup_player: PlayerId(100),
            drop_player: PlayerId(200),
            round: WaiverRound::Second,
            submission_order: 1,
            status: ClaimStatus::Pending,
            resolution_note: None,
            submitted_at: Utc::now(),
            processed_at: None,
            processed_by: None,
        }
    }

    #[test]
    fn round_parses_ordinals_and_labels() {
        assert_eq!(WaiverRound::from_str_round("1st"), Some(WaiverRound::First));
        assert_eq!(WaiverRound::from_str_round("3RD"), Some(WaiverRound::Third));
        assert_eq!(WaiverRound::from_str_round("4"), Some(WaiverRound::Fourth));
        assert_eq!(WaiverRound::from_str_round("7th"), None);
        assert_eq!(WaiverRound::from_str_round("0"), None);
    }

    #[test]
    fn rounds_order_by_priority() {
        assert!(WaiverRound::First < WaiverRound::Second);
        assert!(WaiverRound::Fifth < WaiverRound::Sixth);
    }

    #[test]
    fn round_serializes_as_label() {
        assert_eq!(
            serde_json::to_string(&WaiverRound::Second).unwrap(),
            "\"2nd\""
        );
        let r: WaiverRound = serde_json::from_str("\"6th\"").unwrap();
        assert_eq!(r, WaiverRound::Sixth);
    }

    #[test]
    fn status_strings_are_closed() {
        for s in [ClaimStatus::Pending, ClaimStatus::Approved, ClaimStatus::Rejected] {
            assert_eq!(ClaimStatus::from_str_status(s.as_str()), Some(s));
        }
        assert_eq!(ClaimStatus::from_str_status("Pending"), None);
        assert_eq!(ClaimStatus::from_str_status("processing"), None);
        assert!(!ClaimStatus::Pending.is_terminal());
        assert!(ClaimStatus::Approved.is_terminal());
        assert!(ClaimStatus::Rejected.is_terminal());
    }

    #[test]
    fn mentions_checks_both_sides() {
        let claim = sample_claim();
        assert!(claim.mentions(PlayerId(100)));
        assert!(claim.mentions(PlayerId(200)));
        assert!(!claim.mentions(PlayerId(300)));
    }

    #[test]
    fn filter_requires_every_field() {
        let claim = sample_claim();
        assert!(ClaimFilter::default().matches(&claim));
        assert!(ClaimFilter::for_team(TeamId(3)).matches(&claim));
        assert!(!ClaimFilter::for_team(TeamId(4)).matches(&claim));

        let filter = ClaimFilter {
            team: Some(TeamId(3)),
            round: Some(WaiverRound::First),
            player: None,
        };
        assert!(!filter.matches(&claim));

        let filter = ClaimFilter {
            player: Some(PlayerId(200)),
            ..Default::default()
        };
        assert!(filter.matches(&claim));
    }
}
