//! `market/*` and `info/*` endpoints: engine lifecycle, control, histories,
//! info emission, and the per-phase timing data.

use axum::extract::State;
use serde::Deserialize;
use serde_json::json;

use engine::{MarketConfig, MarketError};
use types::{Info, Infoset, Timepoint};

use crate::envelope::{Envelope, ErrorCode, parse_body, parse_body_or_default};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
struct ConfigureParams {
    iter_block: Option<u64>,
}

/// `POST /market/configure` — `{iter_block}`.
pub async fn configure(State(state): State<AppState>, body: String) -> Envelope {
    let params: ConfigureParams = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    state.market.configure(MarketConfig {
        iter_block: params.iter_block,
    });
    Envelope::ok("success")
}

/// `POST /market/start`.
pub async fn start(State(state): State<AppState>) -> Envelope {
    match state.market.start() {
        Ok(()) => Envelope::ok("success"),
        Err(MarketError::AlreadyStarted) => {
            Envelope::error(ErrorCode::AlreadyStarted, "market already started")
        }
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    iter_count: Option<u64>,
}

/// `POST /market/run` — `{iter_count?}`; absent means unbounded.
pub async fn run(State(state): State<AppState>, body: String) -> Envelope {
    let params: RunParams = match parse_body_or_default(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    state.market.queue_op(engine::Op::Run(params.iter_count));
    Envelope::ok("success")
}

/// `POST /market/pause`.
pub async fn pause(State(state): State<AppState>) -> Envelope {
    state.market.queue_op(engine::Op::Pause);
    Envelope::ok("success")
}

#[derive(Debug, Default, Deserialize)]
struct WaitForPauseParams {
    timepoint: Option<u64>,
}

/// `POST /market/wait_for_pause` — `{timepoint?}`: latest timepoint to keep
/// waiting (inclusive).
pub async fn wait_for_pause(State(state): State<AppState>, body: String) -> Envelope {
    let params: WaitForPauseParams = match parse_body_or_default(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    let market = state.market.clone();
    let deadline = params.timepoint.map(Timepoint);
    let outcome =
        tokio::task::spawn_blocking(move || market.wait_for_pause(deadline, false)).await;

    match outcome {
        Ok(Some(timepoint)) => Envelope::data("success", json!({ "timepoint": timepoint })),
        Ok(None) => Envelope::error(
            ErrorCode::GeneralError,
            "timed out waiting for the market to pause",
        ),
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}

/// `POST /market/reset`.
pub async fn reset(State(state): State<AppState>) -> Envelope {
    let market = state.market.clone();
    match tokio::task::spawn_blocking(move || market.reset()).await {
        Ok(()) => Envelope::ok("success"),
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    erase: bool,
}

/// `POST /market/price_history` — `{erase}`.
pub async fn price_history(State(state): State<AppState>, body: String) -> Envelope {
    let params: HistoryParams = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => {
            return Envelope::error(ErrorCode::GeneralError, format!("missing `erase` argument: {}", e.message));
        }
    };

    let market = state.market.clone();
    match tokio::task::spawn_blocking(move || market.get_price_history(params.erase)).await {
        Ok(history) => Envelope::data("success", history.to_map(None)),
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}

/// `POST /info/emit` — a list of info values to merge in at the current
/// timepoint.
pub async fn emit_info(State(state): State<AppState>, body: String) -> Envelope {
    let infos: Vec<Info> = match parse_body(&body) {
        Ok(p) => p,
        Err(e) => return e,
    };

    match state.market.emit_info(Infoset::from(infos)) {
        Ok(timepoint) => Envelope::data("success", json!({ "timepoint": timepoint })),
        Err(e) => Envelope::error(ErrorCode::GeneralError, e.to_string()),
    }
}

/// `GET /market/showperf` — phase name to `{sample index: milliseconds}`.
pub async fn show_perf(State(state): State<AppState>) -> Envelope {
    Envelope::data("success", state.market.perf_snapshot())
}

/// `POST /market/resetperf`.
pub async fn reset_perf(State(state): State<AppState>) -> Envelope {
    state.market.reset_perf();
    Envelope::ok("success")
}
