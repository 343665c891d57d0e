//! The boundary through which subscribers read engine-owned time-series.

use types::{AgentAction, AgentId, Price, Timepoint};

/// A failure pulling records out of a feed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FeedError {
    /// The requested stream does not exist (e.g. the agent was deleted).
    #[error("stream not available: {0}")]
    StreamMissing(String),

    #[error("time-series read failed: {0}")]
    Read(String),
}

/// Read access to the engine's record streams.
///
/// Implemented by the engine state; every call walks the backing series
/// with a dense view from `from` (exclusive of `until`) in steps of
/// `granularity`, returning only the present slots.
pub trait RecordFeed {
    /// The engine's current timepoint (the next step to execute).
    fn current_timepoint(&self) -> Timepoint;

    /// Present price records on the `granularity` grid in `[from, until)`.
    fn price_records(
        &self,
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, Price)>, FeedError>;

    /// Present action records of one agent on the grid in `[from, until)`.
    fn action_records(
        &self,
        agent: AgentId,
        from: Timepoint,
        granularity: u64,
        until: Timepoint,
    ) -> Result<Vec<(Timepoint, AgentAction)>, FeedError>;
}
