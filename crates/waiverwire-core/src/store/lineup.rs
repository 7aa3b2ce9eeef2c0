// Lineup entry CRUD keyed by (team, period, position, player).

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::WaiverError;
use crate::ids::{ClaimId, PlayerId, TeamId};
use crate::lineup::{EntryStatus, LineupEntry, SchedulingPeriod};
use crate::player::PositionGroup;

const ENTRY_COLUMNS: &str =
    "id, team_id, season, week, position, player_id, sort_order, entry_status, source_claim_id";

pub struct LineupStore<'c> {
    conn: &'c Connection,
}

impl<'c> LineupStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        LineupStore { conn }
    }

    /// Append an entry at the bottom of its `(team, period, position)` group.
    pub fn insert(
        &self,
        team: TeamId,
        period: SchedulingPeriod,
        position: PositionGroup,
        player: PlayerId,
        status: EntryStatus,
        source_claim: Option<ClaimId>,
    ) -> Result<LineupEntry, WaiverError> {
        let sort_order = self.next_sort_order(team, period, position)?;
        self.conn.execute(
            "INSERT INTO lineup_entries
                (team_id, season, week, position, player_id, sort_order, entry_status, source_claim_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                team,
                period.season,
                period.week,
                position,
                player,
                sort_order,
                status,
                source_claim
            ],
        )?;
        Ok(LineupEntry {
            id: self.conn.last_insert_rowid(),
            team,
            period,
            position,
            player,
            sort_order,
            status,
            source_claim,
        })
    }

    fn next_sort_order(
        &self,
        team: TeamId,
        period: SchedulingPeriod,
        position: PositionGroup,
    ) -> Result<u32, WaiverError> {
        let max: u32 = self.conn.query_row(
            "SELECT COALESCE(MAX(sort_order), 0) FROM lineup_entries
             WHERE team_id = ?1 AND season = ?2 AND week = ?3 AND position = ?4",
            params![team, period.season, period.week, position],
            |row| row.get(0),
        )?;
        Ok(max + 1)
    }

    pub fn find_by_claim(&self, claim: ClaimId) -> Result<Option<LineupEntry>, WaiverError> {
        let entry = self
            .conn
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM lineup_entries WHERE source_claim_id = ?1"),
                params![claim],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    pub fn find(
        &self,
        team: TeamId,
        period: SchedulingPeriod,
        player: PlayerId,
    ) -> Result<Option<LineupEntry>, WaiverError> {
        let entry = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM lineup_entries
                     WHERE team_id = ?1 AND season = ?2 AND week = ?3 AND player_id = ?4"
                ),
                params![team, period.season, period.week, player],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Flip the entry placed by `claim` to Rostered and drop the back-reference.
    pub fn promote_claim(&self, claim: ClaimId) -> Result<usize, WaiverError> {
        let updated = self.conn.execute(
            "UPDATE lineup_entries SET entry_status = ?1, source_claim_id = NULL
             WHERE source_claim_id = ?2",
            params![EntryStatus::Rostered, claim],
        )?;
        Ok(updated)
    }

    /// Flip whatever entry holds `player` in the team's lineup for `period`.
    pub fn promote_player(
        &self,
        team: TeamId,
        period: SchedulingPeriod,
        player: PlayerId,
    ) -> Result<usize, WaiverError> {
        let updated = self.conn.execute(
            "UPDATE lineup_entries SET entry_status = ?1, source_claim_id = NULL
             WHERE team_id = ?2 AND season = ?3 AND week = ?4 AND player_id = ?5",
            params![EntryStatus::Rostered, team, period.season, period.week, player],
        )?;
        Ok(updated)
    }

    pub fn delete_by_claim(&self, claim: ClaimId) -> Result<usize, WaiverError> {
        let deleted = self.conn.execute(
            "DELETE FROM lineup_entries WHERE source_claim_id = ?1",
            params![claim],
        )?;
        Ok(deleted)
    }

    /// Remove every placement of `player` in `from` and later periods, for any
    /// team. Earlier periods are history and stay.
    pub fn delete_player_from(
        &self,
        player: PlayerId,
        from: SchedulingPeriod,
    ) -> Result<usize, WaiverError> {
        let deleted = self.conn.execute(
            "DELETE FROM lineup_entries
             WHERE player_id = ?1 AND (season > ?2 OR (season = ?2 AND week >= ?3))",
            params![player, from.season, from.week],
        )?;
        Ok(deleted)
    }

    pub fn delete_entry(&self, id: i64) -> Result<usize, WaiverError> {
        let deleted = self
            .conn
            .execute("DELETE FROM lineup_entries WHERE id = ?1", params![id])?;
        Ok(deleted)
    }

    /// Remove Rostered entries in `from` and later periods whose player is no
    /// longer on that team's roster.
    pub fn delete_unowned_from(&self, from: SchedulingPeriod) -> Result<usize, WaiverError> {
        let deleted = self.conn.execute(
            "DELETE FROM lineup_entries
             WHERE entry_status = ?1
               AND (season > ?2 OR (season = ?2 AND week >= ?3))
               AND NOT EXISTS (
                   SELECT 1 FROM roster_assignments r
                   WHERE r.player_id = lineup_entries.player_id
                     AND r.team_id = lineup_entries.team_id
               )",
            params![EntryStatus::Rostered, from.season, from.week],
        )?;
        Ok(deleted)
    }

    /// A team's lineup for one period, by position group then slot.
    pub fn entries_for(
        &self,
        team: TeamId,
        period: SchedulingPeriod,
    ) -> Result<Vec<LineupEntry>, WaiverError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM lineup_entries
             WHERE team_id = ?1 AND season = ?2 AND week = ?3"
        ))?;
        let mut entries = stmt
            .query_map(params![team, period.season, period.week], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort_by_key(|e| (e.position.sort_order(), e.sort_order));
        Ok(entries)
    }

    /// All entries still waiting on a claim, league-wide.
    pub fn pending_waiver_entries(&self) -> Result<Vec<LineupEntry>, WaiverError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM lineup_entries WHERE entry_status = ?1 ORDER BY id"
        ))?;
        let entries = stmt
            .query_map(params![EntryStatus::PendingWaiver], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LineupEntry> {
    Ok(LineupEntry {
        id: row.get(0)?,
        team: row.get(1)?,
        period: SchedulingPeriod {
            season: row.get(2)?,
            week: row.get(3)?,
        },
        position: row.get(4)?,
        player: row.get(5)?,
        sort_order: row.get(6)?,
        status: row.get(7)?,
        source_claim: row.get(8)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::player::Player;

    const WEEK_3: SchedulingPeriod = SchedulingPeriod { season: 2025, week: 3 };
    const WEEK_4: SchedulingPeriod = SchedulingPeriod { season: 2025, week: 4 };
    const WEEK_2: SchedulingPeriod = SchedulingPeriod { season: 2025, week: 2 };

    fn seeded_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        for id in 1..=4 {
            db.upsert_player(&Player {
                id: PlayerId(id),
                name: format!("Receiver {id}"),
                position: PositionGroup::Receiver,
                nfl_team: None,
            })
            .unwrap();
        }
        db
    }

    #[test]
    fn insert_appends_to_bottom_of_group() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = LineupStore::new(&conn);

        let a = store
            .insert(TeamId(1), WEEK_3, PositionGroup::Receiver, PlayerId(1), EntryStatus::Rostered, None)
            .unwrap();
        let b = store
            .insert(TeamId(1), WEEK_3, PositionGroup::Receiver, PlayerId(2), EntryStatus::Rostered, None)
            .unwrap();
        // Different group and different team restart at 1.
        let c = store
            .insert(TeamId(1), WEEK_3, PositionGroup::Quarterback, PlayerId(3), EntryStatus::Rostered, None)
            .unwrap();
        let d = store
            .insert(TeamId(2), WEEK_3, PositionGroup::Receiver, PlayerId(4), EntryStatus::Rostered, None)
            .unwrap();

        assert_eq!((a.sort_order, b.sort_order, c.sort_order, d.sort_order), (1, 2, 1, 1));

        let lineup = store.entries_for(TeamId(1), WEEK_3).unwrap();
        assert_eq!(
            lineup.iter().map(|e| e.player).collect::<Vec<_>>(),
            vec![PlayerId(3), PlayerId(1), PlayerId(2)]
        );
    }

    #[test]
    fn duplicate_player_in_same_period_is_refused() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = LineupStore::new(&conn);
        store
            .insert(TeamId(1), WEEK_3, PositionGroup::Receiver, PlayerId(1), EntryStatus::Rostered, None)
            .unwrap();
        assert!(store
            .insert(TeamId(1), WEEK_3, PositionGroup::Receiver, PlayerId(1), EntryStatus::Rostered, None)
            .is_err());
    }

    #[test]
    fn promote_and_delete_by_claim() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = LineupStore::new(&conn);
        store
            .insert(
                TeamId(1),
                WEEK_3,
                PositionGroup::Receiver,
                PlayerId(1),
                EntryStatus::PendingWaiver,
                Some(ClaimId(7)),
            )
            .unwrap();
        store
            .insert(
                TeamId(1),
                WEEK_3,
                PositionGroup::Receiver,
                PlayerId(2),
                EntryStatus::PendingWaiver,
                Some(ClaimId(8)),
            )
            .unwrap();

        assert_eq!(store.promote_claim(ClaimId(7)).unwrap(), 1);
        let promoted = store.find(TeamId(1), WEEK_3, PlayerId(1)).unwrap().unwrap();
        assert_eq!(promoted.status, EntryStatus::Rostered);
        assert_eq!(promoted.source_claim, None);

        assert_eq!(store.delete_by_claim(ClaimId(8)).unwrap(), 1);
        assert!(store.find_by_claim(ClaimId(8)).unwrap().is_none());
        assert!(store.pending_waiver_entries().unwrap().is_empty());
    }

    #[test]
    fn delete_player_from_keeps_history() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = LineupStore::new(&conn);
        for period in [WEEK_2, WEEK_3, WEEK_4] {
            store
                .insert(TeamId(1), period, PositionGroup::Receiver, PlayerId(1), EntryStatus::Rostered, None)
                .unwrap();
        }

        assert_eq!(store.delete_player_from(PlayerId(1), WEEK_3).unwrap(), 2);
        assert!(store.find(TeamId(1), WEEK_2, PlayerId(1)).unwrap().is_some());
        assert!(store.find(TeamId(1), WEEK_3, PlayerId(1)).unwrap().is_none());
        assert!(store.find(TeamId(1), WEEK_4, PlayerId(1)).unwrap().is_none());
    }

    #[test]
    fn delete_unowned_spares_owned_pending_and_past_entries() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        crate::store::RosterStore::new(&conn)
            .add_player(TeamId(1), PlayerId(1), crate::player::AcquisitionType::Draft, chrono::Utc::now())
            .unwrap();
        let store = LineupStore::new(&conn);
        // Owned, so it stays.
        store
            .insert(TeamId(1), WEEK_3, PositionGroup::Receiver, PlayerId(1), EntryStatus::Rostered, None)
            .unwrap();
        // Unowned and Rostered: gone in week 3 and 4, kept in week 2.
        for period in [WEEK_2, WEEK_3, WEEK_4] {
            store
                .insert(TeamId(1), period, PositionGroup::Receiver, PlayerId(2), EntryStatus::Rostered, None)
                .unwrap();
        }
        // Waiting on a claim, so ownership is not expected yet.
        store
            .insert(
                TeamId(1),
                WEEK_3,
                PositionGroup::Receiver,
                PlayerId(3),
                EntryStatus::PendingWaiver,
                Some(ClaimId(5)),
            )
            .unwrap();

        assert_eq!(store.delete_unowned_from(WEEK_3).unwrap(), 2);
        assert!(store.find(TeamId(1), WEEK_2, PlayerId(2)).unwrap().is_some());
        assert_eq!(
            store
                .entries_for(TeamId(1), WEEK_3)
                .unwrap()
                .iter()
                .map(|e| e.player)
                .collect::<Vec<_>>(),
            vec![PlayerId(1), PlayerId(3)]
        );

        let entry = store.find_by_claim(ClaimId(5)).unwrap().unwrap();
        assert_eq!(store.delete_entry(entry.id).unwrap(), 1);
        assert!(store.find_by_claim(ClaimId(5)).unwrap().is_none());
    }
}
