// Players, position groups, and roster assignments.

use std::fmt;

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};

use crate::ids::{text_enum, PlayerId, TeamId};

/// Lineup position groups used by the league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionGroup {
    #[serde(rename = "QB")]
    Quarterback,
    #[serde(rename = "RB")]
    RunningBack,
    #[serde(rename = "RC")]
    Receiver,
    #[serde(rename = "PK")]
    PlaceKicker,
    #[serde(rename = "DU")]
    DefensiveUnit,
}

impl PositionGroup {
    /// Parse a league position code.
    ///
    /// Accepts the league's own codes (QB/RB/RC/PK/DU) plus the common
    /// aliases WR/TE for receivers, K for kickers, and DEF/DST for defenses.
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "QB" => Some(PositionGroup::Quarterback),
            "RB" => Some(PositionGroup::RunningBack),
            "RC" | "WR" | "TE" => Some(PositionGroup::Receiver),
            "PK" | "K" => Some(PositionGroup::PlaceKicker),
            "DU" | "DEF" | "DST" => Some(PositionGroup::DefensiveUnit),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PositionGroup::Quarterback => "QB",
            PositionGroup::RunningBack => "RB",
            PositionGroup::Receiver => "RC",
            PositionGroup::PlaceKicker => "PK",
            PositionGroup::DefensiveUnit => "DU",
        }
    }

    /// Deterministic ordering for lineup display.
    pub fn sort_order(&self) -> u8 {
        match self {
            PositionGroup::Quarterback => 0,
            PositionGroup::RunningBack => 1,
            PositionGroup::Receiver => 2,
            PositionGroup::PlaceKicker => 3,
            PositionGroup::DefensiveUnit => 4,
        }
    }
}

impl fmt::Display for PositionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl ToSql for PositionGroup {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.code()))
    }
}

impl FromSql for PositionGroup {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value, "position", PositionGroup::from_code)
    }
}

/// How a player came to be on a roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionType {
    Draft,
    Keeper,
    Trade,
    FreeAgent,
    Waiver,
}

impl AcquisitionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AcquisitionType::Draft => "Draft",
            AcquisitionType::Keeper => "Keeper",
            AcquisitionType::Trade => "Trade",
            AcquisitionType::FreeAgent => "Free Agent",
            AcquisitionType::Waiver => "Waiver",
        }
    }

    pub fn from_str_acquisition(s: &str) -> Option<Self> {
        match s.trim() {
            "Draft" => Some(AcquisitionType::Draft),
            "Keeper" => Some(AcquisitionType::Keeper),
            "Trade" => Some(AcquisitionType::Trade),
            "Free Agent" | "FreeAgent" => Some(AcquisitionType::FreeAgent),
            "Waiver" => Some(AcquisitionType::Waiver),
            _ => None,
        }
    }
}

impl ToSql for AcquisitionType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for AcquisitionType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        text_enum(value, "acquisition type", AcquisitionType::from_str_acquisition)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub position: PositionGroup,
    /// NFL team code (e.g. "HOU"), when known.
    #[serde(default)]
    pub nfl_team: Option<String>,
}

/// A player's current owner. At most one exists per player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterAssignment {
    pub team: TeamId,
    pub player: PlayerId,
    pub acquisition_type: AcquisitionType,
    pub acquired_at: DateTime<Utc>,
}
