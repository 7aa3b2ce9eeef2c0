// Roster CSV import and export.
//
// Columns: team_id, player_id, player_name, position, acquisition_type, and an
// optional nfl_team. A blank team_id lists a free agent: the player is known
// to the league but on nobody's roster.

use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::db::Database;
use crate::error::WaiverError;
use crate::ids::{PlayerId, TeamId};
use crate::player::{AcquisitionType, Player, PositionGroup};
use crate::store::RosterStore;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("row {row}: {message}")]
    InvalidRow { row: usize, message: String },

    #[error(transparent)]
    Storage(#[from] WaiverError),
}

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One validated line of the roster file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RosterRow {
    pub player: Player,
    /// `None` for a free agent.
    pub team: Option<TeamId>,
    pub acquisition_type: AcquisitionType,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub players: usize,
    pub rostered: usize,
    pub free_agents: usize,
    /// Rows whose assignment was already in the database.
    pub unchanged: usize,
}

#[derive(Debug, Deserialize)]
struct RawRosterRow {
    team_id: Option<i64>,
    player_id: i64,
    player_name: String,
    position: String,
    #[serde(default)]
    acquisition_type: String,
    #[serde(default)]
    nfl_team: Option<String>,
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse and validate every row. The first bad row aborts the whole file.
///
/// Row numbers in errors count the header as row 1, matching what a
/// spreadsheet shows.
pub fn parse_rosters<R: Read>(rdr: R, num_teams: usize) -> Result<Vec<RosterRow>, ImportError> {
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(rdr);
    let mut seen = HashSet::new();
    let mut rows = Vec::new();

    for (index, result) in reader.deserialize::<RawRosterRow>().enumerate() {
        let row = index + 2;
        let invalid = |message: String| ImportError::InvalidRow { row, message };
        let raw = result?;

        if raw.player_id <= 0 {
            return Err(invalid(format!("player_id must be positive, got {}", raw.player_id)));
        }
        if !seen.insert(raw.player_id) {
            return Err(invalid(format!("player {} is listed twice", raw.player_id)));
        }
        if raw.player_name.is_empty() {
            return Err(invalid(format!("player {} has no name", raw.player_id)));
        }
        let position = PositionGroup::from_code(&raw.position)
            .ok_or_else(|| invalid(format!("unknown position `{}`", raw.position)))?;

        let team = match raw.team_id {
            None => None,
            Some(id) if id >= 1 && (id as usize) <= num_teams => Some(TeamId(id)),
            Some(id) => {
                return Err(invalid(format!(
                    "team_id must be between 1 and {num_teams}, got {id}"
                )))
            }
        };

        // A rostered player with no acquisition type came from the draft.
        let acquisition_type = if raw.acquisition_type.is_empty() {
            AcquisitionType::Draft
        } else {
            AcquisitionType::from_str_acquisition(&raw.acquisition_type).ok_or_else(|| {
                invalid(format!("unknown acquisition type `{}`", raw.acquisition_type))
            })?
        };

        rows.push(RosterRow {
            player: Player {
                id: PlayerId(raw.player_id),
                name: raw.player_name,
                position,
                nfl_team: raw.nfl_team.filter(|t| !t.is_empty()),
            },
            team,
            acquisition_type,
        });
    }

    Ok(rows)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Validate the whole file, then write players and assignments in one
/// transaction.
///
/// Re-importing the same file is harmless: players are refreshed and
/// assignments already in place are counted as unchanged. A row that would
/// move a player already rostered elsewhere aborts the import.
pub fn import_rosters<R: Read>(
    db: &Database,
    rdr: R,
    num_teams: usize,
) -> Result<ImportSummary, ImportError> {
    let rows = parse_rosters(rdr, num_teams)?;

    let mut conn = db.lock()?;
    let tx = conn.transaction().map_err(WaiverError::from)?;
    let roster = RosterStore::new(&tx);
    let now = Utc::now();
    let mut summary = ImportSummary::default();

    for (index, row) in rows.iter().enumerate() {
        roster.upsert_player(&row.player)?;
        summary.players += 1;

        let Some(team) = row.team else {
            summary.free_agents += 1;
            continue;
        };
        match roster.owner_of(row.player.id)? {
            Some(owner) if owner == team => {
                debug!("Player {} already on team {}", row.player.id, team);
                summary.unchanged += 1;
            }
            Some(owner) => {
                return Err(ImportError::InvalidRow {
                    row: index + 2,
                    message: format!(
                        "player {} is already on team {}, not team {}",
                        row.player.id, owner, team
                    ),
                });
            }
            None => {
                roster.add_player(team, row.player.id, row.acquisition_type, now)?;
                summary.rostered += 1;
            }
        }
    }

    tx.commit().map_err(WaiverError::from)?;
    info!(
        "Imported {} players ({} rostered, {} free agents, {} unchanged)",
        summary.players, summary.rostered, summary.free_agents, summary.unchanged
    );
    Ok(summary)
}

/// [`import_rosters`] from a file on disk.
pub fn import_rosters_from_path(
    db: &Database,
    path: &Path,
    num_teams: usize,
) -> Result<ImportSummary, ImportError> {
    let file = std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    import_rosters(db, file, num_teams)
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RosterRecord<'a> {
    team_id: Option<TeamId>,
    player_id: PlayerId,
    player_name: &'a str,
    position: &'static str,
    acquisition_type: &'static str,
    nfl_team: Option<&'a str>,
}

/// Write every known player in the import format, free agents included, and
/// return how many rows were written. The output imports back unchanged.
pub fn export_rosters<W: Write>(db: &Database, wtr: W) -> Result<usize, ImportError> {
    let (players, owners) = {
        let conn = db.lock()?;
        let roster = RosterStore::new(&conn);
        let owners: HashMap<_, _> = roster
            .all_assignments()?
            .into_iter()
            .map(|a| (a.player, a))
            .collect();
        (roster.all_players()?, owners)
    };

    let mut writer = csv::Writer::from_writer(wtr);
    for player in &players {
        let assignment = owners.get(&player.id);
        writer.serialize(RosterRecord {
            team_id: assignment.map(|a| a.team),
            player_id: player.id,
            player_name: &player.name,
            position: player.position.code(),
            acquisition_type: assignment.map_or("", |a| a.acquisition_type.as_str()),
            nfl_team: player.nfl_team.as_deref(),
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;

    info!(
        "Exported {} players ({} rostered)",
        players.len(),
        owners.len()
    );
    Ok(players.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
