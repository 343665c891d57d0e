//! `agent/*` endpoints: population management and action histories.

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use agents::{AgentBuildError, AgentSpec, build_agents};
use types::AgentId;

use crate::envelope::{Envelope, EntryOutcome, ErrorCode, barelist, pairlist, parse_body};
use crate::state::AppState;

fn build_error_outcome(error: AgentBuildError) -> EntryOutcome {
    match error {
        AgentBuildError::UnknownType(_) | AgentBuildError::NotImplemented(_) => {
            EntryOutcome::Err(ErrorCode::AgentNotImplemented, error.to_string())
        }
        AgentBuildError::Config(_) => {
            EntryOutcome::Err(ErrorCode::AgentConfigError, error.to_string())
        }
    }
}

/// `POST /agent/add` — `[{type, count, config}]`; per-entry `{ids: […]}`.
pub async fn add(State(state): State<AppState>, body: String) -> Envelope {
    let specs: Vec<AgentSpec> = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let entries: Vec<EntryOutcome> = specs
        .into_iter()
        .map(|spec| match build_agents(&spec) {
            Ok(built) => {
                let ids: Vec<AgentId> = built
                    .into_iter()
                    .map(|agent| state.market.add_agent(agent))
                    .collect();
                EntryOutcome::ok(json!({ "ids": ids }))
            }
            Err(e) => build_error_outcome(e),
        })
        .collect();

    barelist(entries)
}

/// `POST /agent/delete` — `[id, …]`; per-id `true` or `Not_found`. Blocks
/// until the observers of each deleted agent have drained.
pub async fn delete(State(state): State<AppState>, body: String) -> Envelope {
    let ids: Vec<AgentId> = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let market = state.market.clone();
    let outcome =
        tokio::task::spawn_blocking(move || market.del_agents(Some(&ids))).await;

    match outcome {
        Ok(deleted) => pairlist(
            deleted
                .into_iter()
                .map(|(id, ok)| {
                    let entry = if ok {
                        EntryOutcome::ok(true)
                    } else {
                        EntryOutcome::Err(ErrorCode::NotFound, "agent not found".to_string())
                    };
                    (id.to_string(), entry)
                })
                .collect(),
        ),
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}

/// `GET /agent/list`.
pub async fn list(State(state): State<AppState>) -> Envelope {
    Envelope::data("success", state.market.list_agents())
}

#[derive(Debug, Deserialize)]
struct AgentHistoryParams {
    id: AgentId,
    #[serde(default)]
    erase: bool,
}

/// `POST /agent/get_history` — `{id, erase?}`.
pub async fn get_history(State(state): State<AppState>, body: String) -> Envelope {
    let params: AgentHistoryParams = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let market = state.market.clone();
    let outcome =
        tokio::task::spawn_blocking(move || market.get_agent_history(params.id, params.erase))
            .await;

    match outcome {
        Ok(Some(history)) => Envelope::data(
            "success",
            json!({ "id": params.id, "history": history.to_map(None) }),
        ),
        Ok(None) => Envelope::error(ErrorCode::NotFound, "agent not found"),
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}
