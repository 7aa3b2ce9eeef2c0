// The administrative command surface.
//
// `WaiverDesk` owns the database and the notifier and exposes every command
// as a method returning `Result<_, WaiverError>`. Business-rule failures come
// back as typed errors; nothing here panics on them.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use crate::claim::{ClaimFilter, NewClaim, WaiverClaim, WaiverRound};
use crate::config::Config;
use crate::db::{current_period_in, Database};
use crate::error::WaiverError;
use crate::ids::{ClaimId, PlayerId, TeamId};
use crate::lineup::{LineupEntry, SchedulingPeriod};
use crate::notifier::Notifier;
use crate::player::{Player, RosterAssignment};
use crate::resolution::{Resolution, ResolutionEngine};
use crate::roster_import::{self, ImportError, ImportSummary};
use crate::store::{ClaimStore, LineupStore, RosterStore};
use crate::sync::LineupSynchronizer;

pub struct WaiverDesk {
    db: Database,
    notifier: Arc<dyn Notifier>,
    default_period: SchedulingPeriod,
}

impl WaiverDesk {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, default_period: SchedulingPeriod) -> Self {
        WaiverDesk {
            db,
            notifier,
            default_period,
        }
    }

    /// Open the configured database and build a desk around it.
    pub fn from_config(config: &Config, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        let path = config.database_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::open_with_timeout(&path.to_string_lossy(), config.busy_timeout())?;
        Ok(Self::new(db, notifier, config.default_period()))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    // -- claims -------------------------------------------------------------

    /// File a new claim and place its pickup player in the team's lineup.
    pub fn submit_claim(
        &self,
        team: TeamId,
        pickup_player: PlayerId,
        drop_player: PlayerId,
        round: WaiverRound,
        submission_order: u32,
    ) -> Result<WaiverClaim, WaiverError> {
        self.submit(&NewClaim {
            team,
            pickup_player,
            drop_player,
            round,
            submission_order,
        })
    }

    pub fn submit(&self, new_claim: &NewClaim) -> Result<WaiverClaim, WaiverError> {
        let mut conn = self.db.lock()?;
        let mut tx = conn.transaction()?;

        let claims = ClaimStore::new(&tx);
        let id = claims.submit(new_claim, Utc::now())?;
        let claim = claims.get(id)?.ok_or(WaiverError::ClaimNotFound(id))?;

        let period = current_period_in(&tx, self.default_period)?;
        let sp = tx.savepoint()?;
        let attached = LineupSynchronizer::new(&sp, period).attach(&claim);
        match attached {
            Ok(()) => sp.commit()?,
            Err(e) => {
                warn!("Could not place lineup entry for claim {}: {}", id, e);
                drop(sp);
            }
        }

        tx.commit()?;
        info!(
            "Claim {} submitted: team {} wants {} for {} ({} round, order {})",
            id, claim.team, claim.pickup_player, claim.drop_player, claim.round, claim.submission_order
        );
        Ok(claim)
    }

    /// Withdraw a still-pending claim. Only the team that filed it may.
    pub fn cancel_claim(&self, id: ClaimId, team: TeamId) -> Result<(), WaiverError> {
        let mut conn = self.db.lock()?;
        let mut tx = conn.transaction()?;

        let claims = ClaimStore::new(&tx);
        let claim = claims.get(id)?.ok_or(WaiverError::ClaimNotFound(id))?;
        if !claims.cancel(id, team)? {
            return Err(WaiverError::NotCancellable(id));
        }

        let period = current_period_in(&tx, self.default_period)?;
        let sp = tx.savepoint()?;
        let discarded = LineupSynchronizer::new(&sp, period).discard(&claim);
        match discarded {
            Ok(()) => sp.commit()?,
            Err(e) => {
                warn!("Could not remove lineup entry for cancelled claim {}: {}", id, e);
                drop(sp);
            }
        }

        tx.commit()?;
        info!("Claim {} cancelled by team {}", id, team);
        Ok(())
    }

    /// Every pending claim in review order.
    pub fn list_pending_claims(&self) -> Result<Vec<WaiverClaim>, WaiverError> {
        self.list_pending(&ClaimFilter::default())
    }

    pub fn list_pending(&self, filter: &ClaimFilter) -> Result<Vec<WaiverClaim>, WaiverError> {
        let conn = self.db.lock()?;
        ClaimStore::new(&conn).list_pending(filter)
    }

    pub fn list_history(&self, filter: &ClaimFilter) -> Result<Vec<WaiverClaim>, WaiverError> {
        let conn = self.db.lock()?;
        ClaimStore::new(&conn).list_history(filter)
    }

    pub fn get_claim(&self, id: ClaimId) -> Result<WaiverClaim, WaiverError> {
        let conn = self.db.lock()?;
        ClaimStore::new(&conn)
            .get(id)?
            .ok_or(WaiverError::ClaimNotFound(id))
    }

    // -- resolution ---------------------------------------------------------

    pub fn resolve_approve(&self, id: ClaimId, actor: &str) -> Result<Resolution, WaiverError> {
        self.engine().approve(id, actor)
    }

    pub fn resolve_reject(
        &self,
        id: ClaimId,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Resolution, WaiverError> {
        self.engine().reject(id, actor, note)
    }

    fn engine(&self) -> ResolutionEngine<'_> {
        ResolutionEngine::new(&self.db, self.notifier.as_ref(), self.default_period)
    }

    // -- league state -------------------------------------------------------

    pub fn current_period(&self) -> Result<SchedulingPeriod, WaiverError> {
        self.db.current_period(self.default_period)
    }

    pub fn set_current_period(&self, period: SchedulingPeriod) -> Result<(), WaiverError> {
        self.db.set_current_period(period)?;
        info!("Current period set to {}", period);
        Ok(())
    }

    // -- read-only views ----------------------------------------------------

    pub fn player(&self, id: PlayerId) -> Result<Option<Player>, WaiverError> {
        let conn = self.db.lock()?;
        RosterStore::new(&conn).player(id)
    }

    pub fn team_roster(&self, team: TeamId) -> Result<Vec<RosterAssignment>, WaiverError> {
        let conn = self.db.lock()?;
        RosterStore::new(&conn).team_roster(team)
    }

    pub fn roster_assignments(&self) -> Result<Vec<RosterAssignment>, WaiverError> {
        let conn = self.db.lock()?;
        RosterStore::new(&conn).all_assignments()
    }

    /// A team's lineup for `period`, or for the current period when `None`.
    /// Drift left by an earlier failed sync is repaired first.
    pub fn team_lineup(
        &self,
        team: TeamId,
        period: Option<SchedulingPeriod>,
    ) -> Result<Vec<LineupEntry>, WaiverError> {
        let mut conn = self.db.lock()?;
        let current = current_period_in(&conn, self.default_period)?;
        reconcile_lineups(&mut conn, current);
        LineupStore::new(&conn).entries_for(team, period.unwrap_or(current))
    }

    /// Lineup entries still waiting on a claim, league-wide.
    pub fn pending_waiver_entries(&self) -> Result<Vec<LineupEntry>, WaiverError> {
        let mut conn = self.db.lock()?;
        let current = current_period_in(&conn, self.default_period)?;
        reconcile_lineups(&mut conn, current);
        LineupStore::new(&conn).pending_waiver_entries()
    }

    // -- import -------------------------------------------------------------

    pub fn import_rosters<R: Read>(
        &self,
        rdr: R,
        num_teams: usize,
    ) -> Result<ImportSummary, ImportError> {
        roster_import::import_rosters(&self.db, rdr, num_teams)
    }

    pub fn import_rosters_from_path(
        &self,
        path: &Path,
        num_teams: usize,
    ) -> Result<ImportSummary, ImportError> {
        roster_import::import_rosters_from_path(&self.db, path, num_teams)
    }

    /// Write every player and assignment in the import format.
    pub fn export_rosters<W: Write>(&self, wtr: W) -> Result<usize, ImportError> {
        roster_import::export_rosters(&self.db, wtr)
    }
}

/// Repair lineup drift in its own transaction before a read. A failure is
/// logged and the read goes ahead on what is stored.
fn reconcile_lineups(conn: &mut Connection, period: SchedulingPeriod) {
    let result = conn.transaction().map_err(WaiverError::from).and_then(|tx| {
        let repaired = LineupSynchronizer::new(&tx, period).reconcile()?;
        tx.commit()?;
        Ok(repaired)
    });
    match result {
        Ok(repaired) if !repaired.is_clean() => info!(
            "Repaired lineups: {} promoted, {} discarded, {} purged",
            repaired.promoted, repaired.discarded, repaired.purged
        ),
        Ok(_) => {}
        Err(e) => warn!("Lineup reconciliation failed: {}", e),
    }
}
