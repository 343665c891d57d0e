//! `subscribers/*` endpoints.

use axum::extract::State;

use subscribers::{DeleteStatus, SubscriberSpec};
use types::SubscriberId;

use crate::envelope::{Envelope, EntryOutcome, ErrorCode, barelist, pairlist, parse_body};
use crate::state::AppState;

/// `POST /subscribers/add` — `[{config, parameter?}]`; per-entry the new id.
pub async fn add(State(state): State<AppState>, body: String) -> Envelope {
    let specs: Vec<SubscriberSpec> = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let entries: Vec<EntryOutcome> = specs
        .into_iter()
        .map(|spec| match state.subscribers.add(spec) {
            Ok(id) => EntryOutcome::ok(id),
            Err(e) => EntryOutcome::Err(ErrorCode::SubscriberConfigError, e.to_string()),
        })
        .collect();

    barelist(entries)
}

/// `POST /subscribers/delete` — `[id, …]`; per-id the delete status.
pub async fn delete(State(state): State<AppState>, body: String) -> Envelope {
    let ids: Vec<SubscriberId> = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let outcomes = state.subscribers.del_many(&ids, false);
    pairlist(
        outcomes
            .into_iter()
            .map(|(id, status)| {
                let entry = match status {
                    DeleteStatus::DoesNotExist => {
                        EntryOutcome::Err(ErrorCode::NotFound, "subscriber not found".to_string())
                    }
                    other => EntryOutcome::ok(other),
                };
                (id.to_string(), entry)
            })
            .collect(),
    )
}

/// `GET /subscribers/list`.
pub async fn list(State(state): State<AppState>) -> Envelope {
    Envelope::data("success", state.subscribers.list())
}
