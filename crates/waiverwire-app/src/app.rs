// Application state and main event loop.
//
// Takes raw JSON from the WebSocket, runs the command against the desk, and
// writes responses and outcome pushes back to the client.

use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

use waiverwire_core::desk::WaiverDesk;
use waiverwire_core::notifier::ClaimOutcome;
use waiverwire_core::WaiverError;

use crate::protocol::{AdminCommand, ClientMessage, ServerMessage, BAD_REQUEST};
use crate::ws_server::WsEvent;

pub struct AppState {
    pub desk: WaiverDesk,
    /// Recorded as the actor when a command names none.
    pub default_actor: String,
    /// Address of the connected administrator client, if any.
    pub client: Option<String>,
}

impl AppState {
    pub fn new(desk: WaiverDesk, default_actor: impl Into<String>) -> Self {
        AppState {
            desk,
            default_actor: default_actor.into(),
            client: None,
        }
    }

    fn actor<'a>(&'a self, requested: &'a Option<String>) -> &'a str {
        requested
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .unwrap_or(self.default_actor.as_str())
    }
}

/// Run one command against the desk and return the JSON payload for a
/// successful response.
pub fn dispatch(state: &AppState, command: AdminCommand) -> Result<serde_json::Value, WaiverError> {
    let desk = &state.desk;
    match command {
        AdminCommand::ListPending { filter } => to_data(&desk.list_pending(&filter)?),
        AdminCommand::ListHistory { filter } => to_data(&desk.list_history(&filter)?),
        AdminCommand::SubmitClaim {
            team,
            pickup_player,
            drop_player,
            round,
            submission_order,
        } => to_data(&desk.submit_claim(team, pickup_player, drop_player, round, submission_order)?),
        AdminCommand::CancelClaim { claim_id, team } => {
            desk.cancel_claim(claim_id, team)?;
            Ok(json!({ "cancelled": claim_id }))
        }
        AdminCommand::Approve { claim_id, actor } => {
            to_data(&desk.resolve_approve(claim_id, state.actor(&actor))?)
        }
        AdminCommand::Reject {
            claim_id,
            actor,
            note,
        } => to_data(&desk.resolve_reject(claim_id, state.actor(&actor), note.as_deref())?),
        AdminCommand::TeamRoster { team } => to_data(&desk.team_roster(team)?),
        AdminCommand::TeamLineup { team, period } => {
            let period = match period {
                Some(p) => p,
                None => desk.current_period()?,
            };
            let entries = desk.team_lineup(team, Some(period))?;
            Ok(json!({ "period": period, "entries": entries }))
        }
        AdminCommand::CurrentPeriod => to_data(&desk.current_period()?),
        AdminCommand::SetCurrentPeriod { period } => {
            desk.set_current_period(period)?;
            to_data(&period)
        }
    }
}

fn to_data<T: Serialize>(value: &T) -> Result<serde_json::Value, WaiverError> {
    Ok(serde_json::to_value(value)?)
}

/// Turn one raw client message into the response to send back.
pub fn handle_text(state: &AppState, text: &str) -> ServerMessage {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Failed to parse client message: {}", e);
            // Echo the id back when the envelope is readable JSON.
            let id = serde_json::from_str::<serde_json::Value>(text)
                .ok()
                .and_then(|v| v.get("id").and_then(serde_json::Value::as_u64));
            return ServerMessage::failure(id, BAD_REQUEST, e.to_string());
        }
    };

    match dispatch(state, msg.command) {
        Ok(data) => ServerMessage::success(msg.id, data),
        Err(e) => {
            if e.is_business_rule() {
                info!("Request {} refused: {}", msg.id, e);
            } else {
                warn!("Request {} failed: {}", msg.id, e);
            }
            ServerMessage::from_error(msg.id, &e)
        }
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the main application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. WebSocket events from the administrator client
/// 2. Claim outcomes from the desk's notifier
///
/// Responses and outcome pushes go out through `out_tx` as JSON text. Exits
/// when the WebSocket channel closes.
pub async fn run(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut outcome_rx: mpsc::Receiver<ClaimOutcome>,
    out_tx: mpsc::Sender<String>,
    mut state: AppState,
) -> anyhow::Result<()> {
    info!("Application event loop started");

    // Once the outcome channel closes, stop polling it so select! never spins.
    let mut outcomes_open = true;

    loop {
        tokio::select! {
            ws_event = ws_rx.recv() => {
                match ws_event {
                    Some(WsEvent::Connected { addr }) => {
                        info!("Administrator connected from {}", addr);
                        state.client = Some(addr);
                    }
                    Some(WsEvent::Disconnected) => {
                        info!("Administrator disconnected");
                        state.client = None;
                    }
                    Some(WsEvent::Message(text)) => {
                        let reply = handle_text(&state, &text);
                        send(&out_tx, &reply).await;
                    }
                    None => {
                        info!("WebSocket channel closed, shutting down");
                        break;
                    }
                }
            }

            outcome = outcome_rx.recv(), if outcomes_open => {
                match outcome {
                    Some(event) => send(&out_tx, &ServerMessage::Outcome(event)).await,
                    None => {
                        info!("Outcome channel closed");
                        outcomes_open = false;
                    }
                }
            }
        }
    }

    info!("Application event loop exiting");
    Ok(())
}

async fn send(out_tx: &mpsc::Sender<String>, message: &ServerMessage) {
    match serde_json::to_string(message) {
        Ok(text) => {
            if out_tx.send(text).await.is_err() {
                warn!("Outbound channel closed, message dropped");
            }
        }
        Err(e) => warn!("Failed to serialize server message: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use waiverwire_core::db::Database;
    use waiverwire_core::lineup::SchedulingPeriod;
    use waiverwire_core::notifier::{ChannelNotifier, Outcome};

    const ROSTERS: &str = "\
team_id,player_id,player_name,position,acquisition_type
1,10,Starter One,RB,Draft
2,20,Starter Two,RB,Draft
,30,Free Agent,RB,
";

    fn create_test_state() -> (AppState, mpsc::Receiver<ClaimOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::channel(16);
        let desk = WaiverDesk::new(
            Database::open(":memory:").unwrap(),
            Arc::new(ChannelNotifier::new(outcome_tx)),
            SchedulingPeriod::new(2025, 1),
        );
        desk.import_rosters(ROSTERS.as_bytes(), 12).unwrap();
        (AppState::new(desk, "commissioner"), outcome_rx)
    }

    fn reply_json(state: &AppState, text: &str) -> serde_json::Value {
        serde_json::to_value(handle_text(state, text)).unwrap()
    }

    #[test]
    fn malformed_json_gets_null_id() {
        let (state, _) = create_test_state();
        let reply = reply_json(&state, "{not json");
        assert_eq!(reply["id"], serde_json::Value::Null);
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "bad_request");
    }

    #[test]
    fn unknown_command_keeps_id() {
        let (state, _) = create_test_state();
        let reply = reply_json(&state, r#"{"id":12,"command":{"type":"trade_everyone"}}"#);
        assert_eq!(reply["id"], 12);
        assert_eq!(reply["error"]["code"], "bad_request");
    }

    #[test]
    fn business_errors_carry_codes() {
        let (state, _) = create_test_state();
        let reply = reply_json(
            &state,
            r#"{"id":3,"command":{"type":"submit_claim","team":1,"pickup_player":30,"drop_player":20,"round":"1st"}}"#,
        );
        assert_eq!(reply["ok"], false);
        assert_eq!(reply["error"]["code"], "drop_player_not_on_roster");

        let reply = reply_json(&state, r#"{"id":4,"command":{"type":"approve","claim_id":77}}"#);
        assert_eq!(reply["error"]["code"], "claim_not_found");
    }

    #[test]
    fn approve_uses_default_actor() {
        let (state, mut outcomes) = create_test_state();
        let submitted = reply_json(
            &state,
            r#"{"id":1,"command":{"type":"submit_claim","team":1,"pickup_player":30,"drop_player":10,"round":"1st"}}"#,
        );
        let claim_id = submitted["data"]["id"].as_i64().unwrap();

        let approved = reply_json(
            &state,
            &format!(r#"{{"id":2,"command":{{"type":"approve","claim_id":{claim_id},"actor":" "}}}}"#),
        );
        assert_eq!(approved["ok"], true);
        assert_eq!(approved["data"]["claim"]["status"], "approved");
        assert_eq!(approved["data"]["claim"]["processed_by"], "commissioner");
        assert_eq!(approved["data"]["lineup_synced"], true);
        assert_eq!(approved["data"]["outcome"], "approved");

        let event = outcomes.try_recv().unwrap();
        assert_eq!(event.outcome, Outcome::Approved);
    }

    #[test]
    fn lineup_defaults_to_current_period() {
        let (state, _) = create_test_state();
        reply_json(
            &state,
            r#"{"id":1,"command":{"type":"set_current_period","period":{"season":2025,"week":3}}}"#,
        );
        let reply = reply_json(&state, r#"{"id":2,"command":{"type":"team_lineup","team":1}}"#);
        assert_eq!(reply["data"]["period"]["week"], 3);
        assert_eq!(reply["data"]["entries"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn event_loop_answers_and_pushes_outcomes() {
        let (state, outcome_rx) = create_test_state();
        let (ws_tx, ws_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);

        let handle = tokio::spawn(run(ws_rx, outcome_rx, out_tx, state));

        ws_tx
            .send(WsEvent::Connected {
                addr: "127.0.0.1:1234".into(),
            })
            .await
            .unwrap();
        ws_tx
            .send(WsEvent::Message(
                r#"{"id":1,"command":{"type":"submit_claim","team":1,"pickup_player":30,"drop_player":10,"round":"1st"}}"#.into(),
            ))
            .await
            .unwrap();
        let submitted: serde_json::Value =
            serde_json::from_str(&out_rx.recv().await.unwrap()).unwrap();
        assert_eq!(submitted["type"], "response");
        let claim_id = submitted["data"]["id"].as_i64().unwrap();

        ws_tx
            .send(WsEvent::Message(format!(
                r#"{{"id":2,"command":{{"type":"reject","claim_id":{claim_id},"note":"roster freeze"}}}}"#
            )))
            .await
            .unwrap();

        // The response and the outcome push both arrive, in either order.
        let mut seen = Vec::new();
        for _ in 0..2 {
            let value: serde_json::Value =
                serde_json::from_str(&out_rx.recv().await.unwrap()).unwrap();
            seen.push(value);
        }
        let response = seen.iter().find(|v| v["type"] == "response").unwrap();
        assert_eq!(response["data"]["claim"]["resolution_note"], "roster freeze");
        let outcome = seen.iter().find(|v| v["type"] == "outcome").unwrap();
        assert_eq!(outcome["outcome"], "rejected");
        assert_eq!(outcome["reason"], "roster freeze");

        drop(ws_tx);
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
}
