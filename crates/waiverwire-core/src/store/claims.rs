// Waiver claim persistence: submission, listing, cancellation, and the
// one-way transition out of Pending.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::claim::{ClaimFilter, ClaimStatus, NewClaim, WaiverClaim};
use crate::error::WaiverError;
use crate::ids::{format_timestamp, parse_timestamp, ClaimId, TeamId};
use crate::oracle::AvailabilityOracle;
use crate::store::RosterStore;

const CLAIM_COLUMNS: &str = "id, team_id, pickup_player_id, drop_player_id, round, \
     submission_order, status, resolution_note, submitted_at, processed_at, processed_by";

pub struct ClaimStore<'c> {
    conn: &'c Connection,
}

impl<'c> ClaimStore<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        ClaimStore { conn }
    }

    /// Validate and append a claim in the Pending state.
    ///
    /// The availability checks here are advisory: they reject obviously dead
    /// claims early, but only the check made at resolution time counts.
    pub fn submit(
        &self,
        claim: &NewClaim,
        submitted_at: DateTime<Utc>,
    ) -> Result<ClaimId, WaiverError> {
        if claim.pickup_player == claim.drop_player {
            return Err(WaiverError::InvalidClaim(format!(
                "pickup and drop are both player {}",
                claim.pickup_player
            )));
        }

        let roster = RosterStore::new(self.conn);
        for player in [claim.pickup_player, claim.drop_player] {
            if roster.player(player)?.is_none() {
                return Err(WaiverError::UnknownPlayer(player));
            }
        }

        let oracle = AvailabilityOracle::new(self.conn);
        if oracle.owner_of(claim.drop_player)? != Some(claim.team) {
            return Err(WaiverError::DropPlayerNotOnRoster {
                team: claim.team,
                player: claim.drop_player,
            });
        }
        if oracle.is_rostered(claim.pickup_player)? {
            return Err(WaiverError::PlayerNoLongerAvailable(claim.pickup_player));
        }

        self.conn.execute(
            "INSERT INTO waiver_claims
                (team_id, pickup_player_id, drop_player_id, round, submission_order, status, submitted_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                claim.team,
                claim.pickup_player,
                claim.drop_player,
                claim.round,
                claim.submission_order,
                ClaimStatus::Pending,
                format_timestamp(&submitted_at),
            ],
        )?;
        Ok(ClaimId(self.conn.last_insert_rowid()))
    }

    pub fn get(&self, id: ClaimId) -> Result<Option<WaiverClaim>, WaiverError> {
        let claim = self
            .conn
            .query_row(
                &format!("SELECT {CLAIM_COLUMNS} FROM waiver_claims WHERE id = ?1"),
                params![id],
                claim_from_row,
            )
            .optional()?;
        Ok(claim)
    }

    /// Pending claims in review order: round, then the team's own order, then
    /// submission time. Ties on all three fall back to claim id.
    pub fn list_pending(&self, filter: &ClaimFilter) -> Result<Vec<WaiverClaim>, WaiverError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM waiver_claims
             WHERE status = ?1
             ORDER BY round, submission_order, submitted_at, id"
        ))?;
        let claims = stmt
            .query_map(params![ClaimStatus::Pending], claim_from_row)?
            .filter(|row| row.as_ref().map_or(true, |c| filter.matches(c)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(claims)
    }

    /// Every claim regardless of status, newest first.
    pub fn list_history(&self, filter: &ClaimFilter) -> Result<Vec<WaiverClaim>, WaiverError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CLAIM_COLUMNS} FROM waiver_claims ORDER BY submitted_at DESC, id DESC"
        ))?;
        let claims = stmt
            .query_map([], claim_from_row)?
            .filter(|row| row.as_ref().map_or(true, |c| filter.matches(c)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(claims)
    }

    /// Delete a still-pending claim owned by `team`. Returns `false` (and
    /// changes nothing) if the claim is terminal, missing, or someone else's.
    pub fn cancel(&self, id: ClaimId, team: TeamId) -> Result<bool, WaiverError> {
        let deleted = self.conn.execute(
            "DELETE FROM waiver_claims WHERE id = ?1 AND team_id = ?2 AND status = ?3",
            params![id, team, ClaimStatus::Pending],
        )?;
        Ok(deleted == 1)
    }

    /// Move a pending claim to a terminal status, stamping who and when.
    ///
    /// Only the resolution transaction calls this. A claim that already left
    /// Pending is refused with `AlreadyTerminal`, so a claim is never processed
    /// twice.
    pub(crate) fn mark_terminal(
        &self,
        id: ClaimId,
        status: ClaimStatus,
        note: Option<&str>,
        actor: &str,
        at: DateTime<Utc>,
    ) -> Result<(), WaiverError> {
        if !status.is_terminal() {
            return Err(WaiverError::InvalidClaim(format!(
                "claim {id} cannot be moved back to {status}"
            )));
        }
        let updated = self.conn.execute(
            "UPDATE waiver_claims
             SET status = ?1, resolution_note = ?2, processed_at = ?3, processed_by = ?4
             WHERE id = ?5 AND status = ?6",
            params![
                status,
                note,
                format_timestamp(&at),
                actor,
                id,
                ClaimStatus::Pending
            ],
        )?;
        if updated == 0 {
            return Err(WaiverError::AlreadyTerminal(id));
        }
        Ok(())
    }
}

fn claim_from_row(row: &Row<'_>) -> rusqlite::Result<WaiverClaim> {
    let submitted_at: String = row.get(8)?;
    let processed_at: Option<String> = row.get(9)?;
    Ok(WaiverClaim {
        id: row.get(0)?,
        team: row.get(1)?,
        pickup_player: row.get(2)?,
        drop_player: row.get(3)?,
        round: row.get(4)?,
        submission_order: row.get(5)?,
        status: row.get(6)?,
        resolution_note: row.get(7)?,
        submitted_at: parse_timestamp(&submitted_at)?,
        processed_at: processed_at.as_deref().map(parse_timestamp).transpose()?,
        processed_by: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::WaiverRound;
    use crate::db::Database;
    use crate::ids::PlayerId;
    use crate::player::{AcquisitionType, Player, PositionGroup};
    use chrono::Duration;

    /// Team 1 owns players 1-3, team 2 owns 4-6, players 10-14 are free.
    fn seeded_db() -> Database {
        let db = Database::open(":memory:").unwrap();
        {
            let conn = db.lock().unwrap();
            let roster = RosterStore::new(&conn);
            for id in (1..=6).chain(10..=14) {
                roster
                    .upsert_player(&Player {
                        id: PlayerId(id),
                        name: format!("Player {id}"),
                        position: PositionGroup::RunningBack,
                        nfl_team: None,
                    })
                    .unwrap();
            }
            for (team, ids) in [(1, 1..=3), (2, 4..=6)] {
                for id in ids {
                    roster
                        .add_player(TeamId(team), PlayerId(id), AcquisitionType::Draft, Utc::now())
                        .unwrap();
                }
            }
        }
        db
    }

    fn new_claim(team: i64, pickup: i64, drop: i64, round: WaiverRound, order: u32) -> NewClaim {
        NewClaim {
            team: TeamId(team),
            pickup_player: PlayerId(pickup),
            drop_player: PlayerId(drop),
            round,
            submission_order: order,
        }
    }

    #[test]
    fn submit_creates_pending_claim() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);

        let id = store
            .submit(&new_claim(1, 10, 1, WaiverRound::First, 1), Utc::now())
            .unwrap();
        let claim = store.get(id).unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.team, TeamId(1));
        assert_eq!(claim.pickup_player, PlayerId(10));
        assert!(claim.processed_at.is_none());
        assert!(claim.processed_by.is_none());
        assert!(claim.resolution_note.is_none());
    }

    #[test]
    fn submit_rejects_drop_player_not_on_roster() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let err = ClaimStore::new(&conn)
            .submit(&new_claim(1, 10, 4, WaiverRound::First, 1), Utc::now())
            .unwrap_err();
        assert!(matches!(
            err,
            WaiverError::DropPlayerNotOnRoster { team: TeamId(1), player: PlayerId(4) }
        ));
    }

    #[test]
    fn submit_rejects_rostered_pickup() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let err = ClaimStore::new(&conn)
            .submit(&new_claim(1, 5, 1, WaiverRound::First, 1), Utc::now())
            .unwrap_err();
        assert!(matches!(err, WaiverError::PlayerNoLongerAvailable(PlayerId(5))));
    }

    #[test]
    fn submit_rejects_unknown_and_degenerate_claims() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);
        assert!(matches!(
            store.submit(&new_claim(1, 99, 1, WaiverRound::First, 1), Utc::now()),
            Err(WaiverError::UnknownPlayer(PlayerId(99)))
        ));
        assert!(matches!(
            store.submit(&new_claim(1, 1, 1, WaiverRound::First, 1), Utc::now()),
            Err(WaiverError::InvalidClaim(_))
        ));
    }

    #[test]
    fn list_pending_orders_by_round_then_team_order_then_time() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);
        let t0 = Utc::now();

        let late_first = store
            .submit(&new_claim(2, 11, 4, WaiverRound::First, 1), t0 + Duration::seconds(5))
            .unwrap();
        let second_round = store
            .submit(&new_claim(1, 12, 1, WaiverRound::Second, 1), t0)
            .unwrap();
        let early_first = store
            .submit(&new_claim(1, 10, 2, WaiverRound::First, 1), t0)
            .unwrap();
        let first_order_two = store
            .submit(&new_claim(1, 13, 3, WaiverRound::First, 2), t0)
            .unwrap();

        let ids: Vec<ClaimId> = store
            .list_pending(&ClaimFilter::default())
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![early_first, late_first, first_order_two, second_round]);

        // Listing is restartable: the same call yields the same sequence.
        let again: Vec<ClaimId> = store
            .list_pending(&ClaimFilter::default())
            .unwrap()
            .into_iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn list_pending_applies_filter() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);
        store
            .submit(&new_claim(1, 10, 1, WaiverRound::First, 1), Utc::now())
            .unwrap();
        store
            .submit(&new_claim(2, 10, 4, WaiverRound::First, 1), Utc::now())
            .unwrap();

        let team_two = store.list_pending(&ClaimFilter::for_team(TeamId(2))).unwrap();
        assert_eq!(team_two.len(), 1);
        assert_eq!(team_two[0].team, TeamId(2));
    }

    #[test]
    fn mark_terminal_is_one_way() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);
        let id = store
            .submit(&new_claim(1, 10, 1, WaiverRound::First, 1), Utc::now())
            .unwrap();

        store
            .mark_terminal(id, ClaimStatus::Rejected, Some("roster freeze"), "commish", Utc::now())
            .unwrap();
        let claim = store.get(id).unwrap().unwrap();
        assert_eq!(claim.status, ClaimStatus::Rejected);
        assert_eq!(claim.resolution_note.as_deref(), Some("roster freeze"));
        assert_eq!(claim.processed_by.as_deref(), Some("commish"));
        assert!(claim.processed_at.is_some());

        let err = store
            .mark_terminal(id, ClaimStatus::Approved, None, "commish", Utc::now())
            .unwrap_err();
        assert!(matches!(err, WaiverError::AlreadyTerminal(_)));
        assert_eq!(store.get(id).unwrap().unwrap().status, ClaimStatus::Rejected);

        assert!(store
            .mark_terminal(id, ClaimStatus::Pending, None, "commish", Utc::now())
            .is_err());
    }

    #[test]
    fn cancel_requires_owner_and_pending() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);
        let id = store
            .submit(&new_claim(1, 10, 1, WaiverRound::First, 1), Utc::now())
            .unwrap();

        assert!(!store.cancel(id, TeamId(2)).unwrap());
        assert!(store.cancel(id, TeamId(1)).unwrap());
        assert!(store.get(id).unwrap().is_none());

        let id = store
            .submit(&new_claim(1, 11, 2, WaiverRound::First, 1), Utc::now())
            .unwrap();
        store
            .mark_terminal(id, ClaimStatus::Approved, None, "commish", Utc::now())
            .unwrap();
        assert!(!store.cancel(id, TeamId(1)).unwrap());
    }

    #[test]
    fn history_lists_every_status_newest_first() {
        let db = seeded_db();
        let conn = db.lock().unwrap();
        let store = ClaimStore::new(&conn);
        let t0 = Utc::now();
        let older = store
            .submit(&new_claim(1, 10, 1, WaiverRound::First, 1), t0)
            .unwrap();
        let newer = store
            .submit(&new_claim(2, 11, 4, WaiverRound::First, 1), t0 + Duration::seconds(1))
            .unwrap();
        store
            .mark_terminal(older, ClaimStatus::Rejected, Some("late"), "commish", t0)
            .unwrap();

        let history = store.list_history(&ClaimFilter::default()).unwrap();
        assert_eq!(
            history.iter().map(|c| c.id).collect::<Vec<_>>(),
            vec![newer, older]
        );
        assert!(store.list_pending(&ClaimFilter::default()).unwrap().len() == 1);
    }
}
