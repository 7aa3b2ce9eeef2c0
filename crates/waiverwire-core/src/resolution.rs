// The resolution transaction: approve or reject one pending claim and apply
// every side effect as a single unit.

use chrono::Utc;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use tracing::{info, warn};

use crate::claim::{ClaimFilter, ClaimStatus, WaiverClaim};
use crate::conflict::{detect_conflicts, ConflictReason};
use crate::db::{current_period_in, Database};
use crate::error::WaiverError;
use crate::ids::ClaimId;
use crate::lineup::SchedulingPeriod;
use crate::notifier::{ClaimOutcome, Notifier, Outcome};
use crate::oracle::AvailabilityOracle;
use crate::player::AcquisitionType;
use crate::store::{ClaimStore, RosterStore};
use crate::sync::LineupSynchronizer;

/// Note stored on an administrator rejection that came without one.
pub const DEFAULT_REJECTION_NOTE: &str = "rejected by administrator";

/// A claim that lost because another claim was approved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AutoRejection {
    pub claim: WaiverClaim,
    pub reason: ConflictReason,
}

/// What a committed resolution did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resolution {
    /// The resolved claim as stored after commit.
    pub claim: WaiverClaim,
    /// Whether the claim itself was approved or rejected.
    pub outcome: Outcome,
    /// Claims rejected as a side effect, in review order. Always empty for an
    /// administrator rejection.
    pub auto_rejected: Vec<AutoRejection>,
    /// False when lineup synchronization failed and was rolled back on its
    /// own. Roster and claim changes are committed either way.
    pub lineup_synced: bool,
}

impl Resolution {
    /// One notifier event per affected claim, resolved claim first.
    pub fn outcomes(&self) -> Vec<ClaimOutcome> {
        let mut events = Vec::with_capacity(1 + self.auto_rejected.len());
        events.push(ClaimOutcome {
            claim_id: self.claim.id,
            team: self.claim.team,
            player: self.claim.pickup_player,
            outcome: self.outcome,
            reason: self.claim.resolution_note.clone(),
        });
        events.extend(self.auto_rejected.iter().map(|r| ClaimOutcome {
            claim_id: r.claim.id,
            team: r.claim.team,
            player: r.claim.pickup_player,
            outcome: Outcome::Rejected,
            reason: Some(r.reason.note().to_string()),
        }));
        events
    }
}

/// Runs resolutions against a database, one at a time.
///
/// Each call takes the connection with `try_lock` and opens an IMMEDIATE
/// transaction, so a second resolver (in this process or another one on the
/// same file) fails with [`WaiverError::ResolutionBusy`] instead of waiting.
pub struct ResolutionEngine<'a> {
    db: &'a Database,
    notifier: &'a dyn Notifier,
    default_period: SchedulingPeriod,
}

impl<'a> ResolutionEngine<'a> {
    /// `default_period` is used for lineup placement until a current period
    /// has been stored.
    pub fn new(
        db: &'a Database,
        notifier: &'a dyn Notifier,
        default_period: SchedulingPeriod,
    ) -> Self {
        ResolutionEngine {
            db,
            notifier,
            default_period,
        }
    }

    /// Approve a pending claim: reject everything it makes impossible, move
    /// the players, mark it Approved, update lineups, then notify.
    ///
    /// Any error leaves storage exactly as it was.
    pub fn approve(&self, id: ClaimId, actor: &str) -> Result<Resolution, WaiverError> {
        let mut conn = self.db.try_lock()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let claim = pending_claim(&tx, id)?;

        // Availability must be read inside the transaction, right before the
        // mutation, whatever submit saw earlier.
        if AvailabilityOracle::new(&tx).is_rostered(claim.pickup_player)? {
            return Err(WaiverError::PlayerNoLongerAvailable(claim.pickup_player));
        }

        let auto_rejected = {
            let claims = ClaimStore::new(&tx);
            let pending = claims.list_pending(&ClaimFilter::default())?;
            let conflicts = detect_conflicts(&claim, &pending);
            let mut rejected = Vec::with_capacity(conflicts.len());
            for conflict in conflicts {
                claims.mark_terminal(
                    conflict.claim,
                    ClaimStatus::Rejected,
                    Some(conflict.reason.note()),
                    actor,
                    now,
                )?;
                if let Some(stored) = claims.get(conflict.claim)? {
                    rejected.push(AutoRejection {
                        claim: stored,
                        reason: conflict.reason,
                    });
                }
            }
            rejected
        };

        let roster = RosterStore::new(&tx);
        if !roster.remove_player(claim.team, claim.drop_player)? {
            return Err(WaiverError::RosterMutationFailed(format!(
                "player {} is no longer on team {}",
                claim.drop_player, claim.team
            )));
        }
        roster.add_player(claim.team, claim.pickup_player, AcquisitionType::Waiver, now)?;

        ClaimStore::new(&tx)
            .mark_terminal(id, ClaimStatus::Approved, None, actor, now)
            .map_err(already_processed(id))?;

        let period = current_period_in(&tx, self.default_period)?;
        let lineup_synced = sync_lineup(&mut tx, id, |conn| {
            let sync = LineupSynchronizer::new(conn, period);
            sync.purge_for_player(claim.drop_player)?;
            sync.promote(&claim)?;
            for rejected in &auto_rejected {
                sync.discard(&rejected.claim)?;
            }
            sync.reconcile()?;
            Ok(())
        })?;

        let stored = ClaimStore::new(&tx)
            .get(id)?
            .ok_or(WaiverError::ClaimNotFound(id))?;
        tx.commit()?;
        drop(conn);

        info!(
            "Claim {} approved by {}: team {} picks up {} and drops {} ({} auto-rejected)",
            id,
            actor,
            claim.team,
            claim.pickup_player,
            claim.drop_player,
            auto_rejected.len()
        );

        let resolution = Resolution {
            claim: stored,
            outcome: Outcome::Approved,
            auto_rejected,
            lineup_synced,
        };
        self.emit(&resolution);
        Ok(resolution)
    }

    /// Reject a pending claim by administrator decision. No roster changes;
    /// the claim's lineup placement is removed. An empty note falls back to
    /// [`DEFAULT_REJECTION_NOTE`].
    pub fn reject(
        &self,
        id: ClaimId,
        actor: &str,
        note: Option<&str>,
    ) -> Result<Resolution, WaiverError> {
        let note = note
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(DEFAULT_REJECTION_NOTE);

        let mut conn = self.db.try_lock()?;
        let mut tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = Utc::now();

        let claim = pending_claim(&tx, id)?;
        ClaimStore::new(&tx)
            .mark_terminal(id, ClaimStatus::Rejected, Some(note), actor, now)
            .map_err(already_processed(id))?;

        let period = current_period_in(&tx, self.default_period)?;
        let lineup_synced = sync_lineup(&mut tx, id, |conn| {
            let sync = LineupSynchronizer::new(conn, period);
            sync.discard(&claim)?;
            sync.reconcile()?;
            Ok(())
        })?;

        let stored = ClaimStore::new(&tx)
            .get(id)?
            .ok_or(WaiverError::ClaimNotFound(id))?;
        tx.commit()?;
        drop(conn);

        info!("Claim {} rejected by {}: {}", id, actor, note);

        let resolution = Resolution {
            claim: stored,
            outcome: Outcome::Rejected,
            auto_rejected: Vec::new(),
            lineup_synced,
        };
        self.emit(&resolution);
        Ok(resolution)
    }

    fn emit(&self, resolution: &Resolution) {
        for event in resolution.outcomes() {
            self.notifier.notify(&event);
        }
    }
}

/// Load `id` and insist it is still Pending.
fn pending_claim(conn: &Connection, id: ClaimId) -> Result<WaiverClaim, WaiverError> {
    let claim = ClaimStore::new(conn)
        .get(id)?
        .ok_or(WaiverError::ClaimNotFound(id))?;
    if !claim.is_pending() {
        return Err(WaiverError::AlreadyProcessed(id));
    }
    Ok(claim)
}

/// The store reports a lost race on the claim row as `AlreadyTerminal`; to
/// the caller that is the same as finding the claim processed.
fn already_processed(id: ClaimId) -> impl Fn(WaiverError) -> WaiverError {
    move |e| match e {
        WaiverError::AlreadyTerminal(_) => WaiverError::AlreadyProcessed(id),
        other => other,
    }
}

/// Run lineup work in a savepoint of `tx`.
///
/// A failure inside `work` rolls back the savepoint only and is reported as
/// `Ok(false)`; the surrounding roster and claim changes stay. Errors opening
/// or releasing the savepoint itself are storage faults and abort the whole
/// resolution.
fn sync_lineup<F>(tx: &mut Transaction<'_>, id: ClaimId, work: F) -> Result<bool, WaiverError>
where
    F: FnOnce(&Connection) -> Result<(), WaiverError>,
{
    let sp = tx.savepoint()?;
    let outcome = work(&sp);
    match outcome {
        Ok(()) => {
            sp.commit()?;
            Ok(true)
        }
        Err(e) => {
            warn!("Lineup sync failed for claim {}: {}", id, e);
            // Dropping the savepoint rolls it back.
            drop(sp);
            Ok(false)
        }
    }
}
