// Outcome notifications for teams affected by a resolution.
//
// The engine only hands events over; delivery and retry belong to whatever
// sits on the other side of the `Notifier`.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::ids::{ClaimId, PlayerId, TeamId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Approved,
    Rejected,
}

/// One event per affected team and claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimOutcome {
    pub claim_id: ClaimId,
    pub team: TeamId,
    /// The player the claim tried to pick up.
    pub player: PlayerId,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &ClaimOutcome);
}

/// Writes every outcome to the log and nothing else.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &ClaimOutcome) {
        info!(
            claim = %event.claim_id,
            team = %event.team,
            player = %event.player,
            outcome = ?event.outcome,
            reason = event.reason.as_deref().unwrap_or(""),
            "claim outcome"
        );
    }
}

/// Forwards outcomes into a tokio channel without blocking the caller.
///
/// A full or closed channel drops the event with a warning; the resolution
/// that produced it has already committed.
pub struct ChannelNotifier {
    tx: mpsc::Sender<ClaimOutcome>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<ClaimOutcome>) -> Self {
        ChannelNotifier { tx }
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: &ClaimOutcome) {
        if let Err(e) = self.tx.try_send(event.clone()) {
            warn!("Dropped outcome for claim {}: {}", event.claim_id, e);
        }
    }
}

/// Keeps every event in memory. Handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<ClaimOutcome>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain and return everything recorded so far.
    pub fn take(&self) -> Vec<ClaimOutcome> {
        match self.events.lock() {
            Ok(mut events) => std::mem::take(&mut *events),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &ClaimOutcome) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}
