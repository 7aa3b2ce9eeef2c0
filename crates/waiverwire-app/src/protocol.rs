// Wire types for the administrator WebSocket.
//
// Client -> server: `{"id": 7, "command": {"type": "approve", "claim_id": 3}}`.
// Server -> client: a `response` for every request, plus an `outcome` push
// for every claim resolved while the client is connected.

use serde::{Deserialize, Serialize};
use waiverwire_core::claim::{ClaimFilter, WaiverRound};
use waiverwire_core::ids::{ClaimId, PlayerId, TeamId};
use waiverwire_core::lineup::SchedulingPeriod;
use waiverwire_core::notifier::ClaimOutcome;
use waiverwire_core::WaiverError;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

/// A request from the administrator client. `id` is echoed on the response.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ClientMessage {
    pub id: u64,
    pub command: AdminCommand,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AdminCommand {
    ListPending {
        #[serde(default)]
        filter: ClaimFilter,
    },
    ListHistory {
        #[serde(default)]
        filter: ClaimFilter,
    },
    SubmitClaim {
        team: TeamId,
        pickup_player: PlayerId,
        drop_player: PlayerId,
        round: WaiverRound,
        #[serde(default = "first_preference")]
        submission_order: u32,
    },
    CancelClaim {
        claim_id: ClaimId,
        team: TeamId,
    },
    /// `actor` defaults to the configured administrator name.
    Approve {
        claim_id: ClaimId,
        #[serde(default)]
        actor: Option<String>,
    },
    Reject {
        claim_id: ClaimId,
        #[serde(default)]
        actor: Option<String>,
        #[serde(default)]
        note: Option<String>,
    },
    TeamRoster {
        team: TeamId,
    },
    /// Without a period, the current one.
    TeamLineup {
        team: TeamId,
        #[serde(default)]
        period: Option<SchedulingPeriod>,
    },
    CurrentPeriod,
    SetCurrentPeriod {
        period: SchedulingPeriod,
    },
}

fn first_preference() -> u32 {
    1
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Response(Response),
    Outcome(ClaimOutcome),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response {
    /// `None` when the request was too malformed to carry an id.
    pub id: Option<u64>,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: String,
    pub message: String,
}

/// Code sent back for requests that could not be parsed.
pub const BAD_REQUEST: &str = "bad_request";

impl ServerMessage {
    pub fn success(id: u64, data: serde_json::Value) -> Self {
        ServerMessage::Response(Response {
            id: Some(id),
            ok: true,
            data: Some(data),
            error: None,
        })
    }

    pub fn failure(id: Option<u64>, code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Response(Response {
            id,
            ok: false,
            data: None,
            error: Some(ErrorPayload {
                code: code.to_string(),
                message: message.into(),
            }),
        })
    }

    pub fn from_error(id: u64, err: &WaiverError) -> Self {
        Self::failure(Some(id), err.code(), err.to_string())
    }
}
