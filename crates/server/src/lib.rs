//! HTTP/JSON control surface for the crowdsim engine.
//!
//! A thin adapter: every handler validates its body, calls one facade
//! method on the engine or the subscriber set, and wraps the outcome in the
//! uniform [`Envelope`]. Blocking facade calls (drains, waits) run on the
//! blocking pool so the async executor stays responsive.

mod envelope;
mod routes;
mod state;

use std::net::SocketAddr;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use envelope::{
    API_VERSION, Envelope, EntryOutcome, ErrorCode, ResponseType, barelist, pairlist, stringmap,
};
pub use state::AppState;

/// Build the router with every control-surface route.
pub fn create_app(state: AppState) -> Router {
    Router::new()
        // market lifecycle & control
        .route("/market/configure", post(routes::market::configure))
        .route("/market/start", post(routes::market::start))
        .route("/market/run", post(routes::market::run))
        .route("/market/pause", post(routes::market::pause))
        .route("/market/wait_for_pause", post(routes::market::wait_for_pause))
        .route("/market/reset", post(routes::market::reset))
        .route("/market/price_history", post(routes::market::price_history))
        .route("/market/showperf", get(routes::market::show_perf))
        .route("/market/resetperf", post(routes::market::reset_perf))
        // agents
        .route("/agent/add", post(routes::agent::add))
        .route("/agent/delete", post(routes::agent::delete))
        .route("/agent/list", get(routes::agent::list))
        .route("/agent/get_history", post(routes::agent::get_history))
        // info
        .route("/info/emit", post(routes::market::emit_info))
        // subscribers
        .route("/subscribers/add", post(routes::subscriber::add))
        .route("/subscribers/delete", post(routes::subscriber::delete))
        .route("/subscribers/list", get(routes::subscriber::list))
        // middleware & state
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the control surface until the shutdown future resolves.
pub async fn serve(
    addr: SocketAddr,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "control surface listening");

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::Market;
    use std::sync::Arc;
    use subscribers::SubscriberSet;

    #[test]
    fn test_create_app() {
        let market = Arc::new(Market::new(Arc::new(SubscriberSet::new(1000))));
        let _app = create_app(AppState::new(market));
    }
}
