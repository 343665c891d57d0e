//! Shared state handed to every route handler.

use std::sync::Arc;

use engine::Market;
use subscribers::SubscriberSet;

/// Cloned into each handler via axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub market: Arc<Market>,
    pub subscribers: Arc<SubscriberSet>,
}

impl AppState {
    pub fn new(market: Arc<Market>) -> Self {
        let subscribers = Arc::clone(market.subscribers());
        Self {
            market,
            subscribers,
        }
    }
}
