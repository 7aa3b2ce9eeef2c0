// Speculative lineup synchronization.
//
// Keeps each team's forward lineup in step with its claims: a submitted claim
// places the pickup player provisionally, approval promotes that placement,
// and rejection or cancellation removes it. `reconcile` repairs whatever a
// failed synchronization left behind.

use rusqlite::Connection;
use tracing::debug;

use crate::claim::{ClaimStatus, WaiverClaim};
use crate::error::WaiverError;
use crate::ids::PlayerId;
use crate::lineup::{EntryStatus, SchedulingPeriod};
use crate::store::{ClaimStore, LineupStore, RosterStore};

/// Counts of entries `reconcile` repaired.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reconciled {
    pub promoted: usize,
    pub discarded: usize,
    pub purged: usize,
}

impl Reconciled {
    pub fn is_clean(&self) -> bool {
        self.promoted == 0 && self.discarded == 0 && self.purged == 0
    }
}

pub struct LineupSynchronizer<'c> {
    conn: &'c Connection,
    period: SchedulingPeriod,
}

impl<'c> LineupSynchronizer<'c> {
    /// `period` is the scheduling period new placements go into.
    pub fn new(conn: &'c Connection, period: SchedulingPeriod) -> Self {
        LineupSynchronizer { conn, period }
    }

    /// Place the claim's pickup player at the bottom of its position group,
    /// tagged PendingWaiver and linked to the claim.
    ///
    /// Does nothing if the claim already has an entry or the team already has
    /// the player in this period's lineup.
    pub fn attach(&self, claim: &WaiverClaim) -> Result<(), WaiverError> {
        let lineup = LineupStore::new(self.conn);
        if lineup.find_by_claim(claim.id)?.is_some()
            || lineup
                .find(claim.team, self.period, claim.pickup_player)?
                .is_some()
        {
            debug!(
                "Lineup entry for claim {} (player {}) already exists, skipping",
                claim.id, claim.pickup_player
            );
            return Ok(());
        }

        let player = RosterStore::new(self.conn)
            .player(claim.pickup_player)?
            .ok_or(WaiverError::UnknownPlayer(claim.pickup_player))?;
        lineup.insert(
            claim.team,
            self.period,
            player.position,
            player.id,
            EntryStatus::PendingWaiver,
            Some(claim.id),
        )?;
        Ok(())
    }

    /// Mark the claim's placement Rostered and clear its claim link.
    ///
    /// If the claim never got an entry, an entry the team already holds for
    /// the player is promoted instead; failing that, a Rostered entry is
    /// appended so the new player shows up in the lineup.
    pub fn promote(&self, claim: &WaiverClaim) -> Result<(), WaiverError> {
        let lineup = LineupStore::new(self.conn);
        if lineup.promote_claim(claim.id)? > 0 {
            return Ok(());
        }
        if lineup.promote_player(claim.team, self.period, claim.pickup_player)? > 0 {
            debug!(
                "Claim {} had no entry of its own; promoted existing placement of player {}",
                claim.id, claim.pickup_player
            );
            return Ok(());
        }

        debug!(
            "No lineup entry for claim {}; placing player {} directly",
            claim.id, claim.pickup_player
        );
        let player = RosterStore::new(self.conn)
            .player(claim.pickup_player)?
            .ok_or(WaiverError::UnknownPlayer(claim.pickup_player))?;
        lineup.insert(
            claim.team,
            self.period,
            player.position,
            player.id,
            EntryStatus::Rostered,
            None,
        )?;
        Ok(())
    }

    /// Remove whatever entry the claim placed.
    pub fn discard(&self, claim: &WaiverClaim) -> Result<(), WaiverError> {
        let removed = LineupStore::new(self.conn).delete_by_claim(claim.id)?;
        if removed == 0 {
            debug!("No lineup entry to discard for claim {}", claim.id);
        }
        Ok(())
    }

    /// Remove every placement of a player who just left a roster, from the
    /// current period on, whatever claim (if any) put it there.
    pub fn purge_for_player(&self, player: PlayerId) -> Result<(), WaiverError> {
        LineupStore::new(self.conn).delete_player_from(player, self.period)?;
        Ok(())
    }

    /// Bring stored lineups back in line with claims and rosters.
    ///
    /// PendingWaiver entries whose claim was approved are promoted. Those whose
    /// claim is rejected or no longer exists are removed. Rostered
    /// entries from this period on are removed when the team no longer owns
    /// the player.
    pub fn reconcile(&self) -> Result<Reconciled, WaiverError> {
        let lineup = LineupStore::new(self.conn);
        let claims = ClaimStore::new(self.conn);
        let mut repaired = Reconciled::default();

        for entry in lineup.pending_waiver_entries()? {
            let Some(claim_id) = entry.source_claim else {
                repaired.discarded += lineup.delete_entry(entry.id)?;
                continue;
            };
            match claims.get(claim_id)?.map(|c| c.status) {
                Some(ClaimStatus::Pending) => {}
                Some(ClaimStatus::Approved) => {
                    repaired.promoted += lineup.promote_claim(claim_id)?;
                }
                Some(ClaimStatus::Rejected) | None => {
                    repaired.discarded += lineup.delete_by_claim(claim_id)?;
                }
            }
        }
        repaired.purged = lineup.delete_unowned_from(self.period)?;

        if !repaired.is_clean() {
            debug!(
                "Reconciled lineups for {}: {} promoted, {} discarded, {} purged",
                self.period, repaired.promoted, repaired.discarded, repaired.purged
            );
        }
        Ok(repaired)
    }
}
