//! Engine error taxonomy.

use types::AgentId;

/// Errors surfaced by the [`crate::Market`] API facade.
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    /// `launch` may only be called once per market.
    #[error("market already launched")]
    AlreadyLaunched,

    /// `start` may only be called once per market.
    #[error("market already started")]
    AlreadyStarted,

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("info rejected: {0}")]
    InfoRejected(String),

    #[error(transparent)]
    Agent(#[from] agents::AgentError),

    #[error("engine thread spawn failed: {0}")]
    Spawn(String),
}
