// Weekly lineup entries, including speculative placements backed by claims.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::ids::{text_enum, ClaimId, PlayerId, TeamId};
use crate::player::PositionGroup;

/// A league scheduling period. Orders by season, then week.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchedulingPeriod {
    pub season: u16,
    pub week: u8,
}

impl SchedulingPeriod {
    pub fn new(season: u16, week: u8) -> Self {
        SchedulingPeriod { season, week }
    }
}

impl fmt::Display for SchedulingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} week {}", self.season, self.week)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    /// Placed ahead of a pending claim; the player is not owned yet.
    PendingWaiver,
    Rostered,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::PendingWaiver => "pending_waiver",
            EntryStatus::Rostered => "rostered",
        }
    }

    pub fn from_str_status(s: &str) -> Option<Self> {
        match s {
            "pending_waiver" => Some(EntryStatus::PendingWaiver),
            "rostered" => Some(EntryStatus::Rostered),
            _ => None,
        }
    }
}

impl ToSql for EntryStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for EntryStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value, "lineup entry status", EntryStatus::from_str_status)
    }
}

/// One player placed in a team's lineup for a period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineupEntry {
    pub id: i64,
    pub team: TeamId,
    pub period: SchedulingPeriod,
    pub position: PositionGroup,
    pub player: PlayerId,
    /// 1-based slot within the `(team, period, position)` group.
    pub sort_order: u32,
    pub status: EntryStatus,
    /// Lookup-only link to the claim that placed this entry.
    pub source_claim: Option<ClaimId>,
}
