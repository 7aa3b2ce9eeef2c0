// Players and roster assignments.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

use crate::error::WaiverError;
use crate::ids::{format_timestamp, parse_timestamp, PlayerId, TeamId};
use crate::player::{AcquisitionType, Player, RosterAssignment};

pub struct RosterStore<'c> {
    conn: &'c Connection,
}

impl<'c> RosterStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        RosterStore { conn }
    }

    /// Insert a player or refresh the descriptive columns of an existing one.
    pub fn upsert_player(&self, player: &Player) -> Result<(), WaiverError> {
        self.conn.execute(
            "INSERT INTO players (id, name, position, nfl_team)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name     = excluded.name,
                position = excluded.position,
                nfl_team = excluded.nfl_team",
            params![player.id, player.name, player.position, player.nfl_team],
        )?;
        Ok(())
    }

    pub fn player(&self, id: PlayerId) -> Result<Option<Player>, WaiverError> {
        let player = self
            .conn
            .query_row(
                "SELECT id, name, position, nfl_team FROM players WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Player {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        position: row.get(2)?,
                        nfl_team: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(player)
    }

    /// Every known player, rostered or not, ordered by id.
    pub fn all_players(&self) -> Result<Vec<Player>, WaiverError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, position, nfl_team FROM players ORDER BY id")?;
        let players = stmt
            .query_map([], |row| {
                Ok(Player {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    position: row.get(2)?,
                    nfl_team: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(players)
    }

    /// The team currently holding `player`, if any.
    pub fn owner_of(&self, player: PlayerId) -> Result<Option<TeamId>, WaiverError> {
        let team = self
            .conn
            .query_row(
                "SELECT team_id FROM roster_assignments WHERE player_id = ?1",
                params![player],
                |row| row.get(0),
            )
            .optional()?;
        Ok(team)
    }

    /// Assign `player` to `team`. Fails with `RosterMutationFailed` when the
    /// player is already owned or does not exist.
    pub fn add_player(
        &self,
        team: TeamId,
        player: PlayerId,
        acquisition: AcquisitionType,
        at: DateTime<Utc>,
    ) -> Result<(), WaiverError> {
        let result = self.conn.execute(
            "INSERT INTO roster_assignments (player_id, team_id, acquisition_type, acquired_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![player, team, acquisition, format_timestamp(&at)],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                Err(WaiverError::RosterMutationFailed(format!(
                    "cannot add player {player} to team {team}: already rostered or unknown"
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove `player` from `team`. Returns `false` when the team did not own
    /// the player, leaving everything untouched.
    pub fn remove_player(&self, team: TeamId, player: PlayerId) -> Result<bool, WaiverError> {
        let removed = self.conn.execute(
            "DELETE FROM roster_assignments WHERE player_id = ?1 AND team_id = ?2",
            params![player, team],
        )?;
        Ok(removed == 1)
    }

    pub fn team_roster(&self, team: TeamId) -> Result<Vec<RosterAssignment>, WaiverError> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, player_id, acquisition_type, acquired_at
             FROM roster_assignments WHERE team_id = ?1 ORDER BY player_id",
        )?;
        let roster = stmt
            .query_map(params![team], assignment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roster)
    }

    /// Every assignment in the league, ordered by player.
    pub fn all_assignments(&self) -> Result<Vec<RosterAssignment>, WaiverError> {
        let mut stmt = self.conn.prepare(
            "SELECT team_id, player_id, acquisition_type, acquired_at
             FROM roster_assignments ORDER BY player_id",
        )?;
        let roster = stmt
            .query_map([], assignment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(roster)
    }
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<RosterAssignment> {
    let acquired_at: String = row.get(3)?;
    Ok(RosterAssignment {
        team: row.get(0)?,
        player: row.get(1)?,
        acquisition_type: row.get(2)?,
        acquired_at: parse_timestamp(&acquired_at)?,
    })
}
