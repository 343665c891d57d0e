//! Subscriber configuration and wire-visible descriptors.

use std::fmt;
use std::net::IpAddr;

use serde::{Deserialize, Serialize};
use types::{AgentId, SubscriberId, Timepoint};

use crate::feed::FeedError;

/// The stream a subscriber consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordKind {
    Price,
    AgentAction,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Price => write!(f, "PRICE"),
            RecordKind::AgentAction => write!(f, "AGENT_ACTION"),
        }
    }
}

/// A datagram destination. Subscribers with equal configs share one socket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub remote_addr: IpAddr,
    pub remote_port: u16,
}

impl fmt::Display for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.remote_addr, self.remote_port)
    }
}

/// Per-subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriberConfig {
    #[serde(rename = "type")]
    pub kind: RecordKind,

    pub endpoint: EndpointConfig,

    /// Emit every `granularity`-th step. Must be at least 1.
    pub granularity: u64,

    /// The background manager converts and sends only once more than this
    /// many records are pending (drains ignore the threshold).
    #[serde(default)]
    pub chunk_min_records: u64,
}

/// One entry of a `subscribers/add` request.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberSpec {
    pub config: SubscriberConfig,
    /// Agent id for `AGENT_ACTION` subscribers; absent for `PRICE`.
    #[serde(default)]
    pub parameter: Option<AgentId>,
}

/// Listing entry for one live subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriberEntry {
    pub id: SubscriberId,
    pub pending_records: usize,
    pub endpoint: String,
    pub record_type: RecordKind,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeleteStatus {
    /// Removed immediately (no pending records, or a sync delete).
    Deleted,
    /// Marked `Dying`; the manager flushes and destroys it.
    Marked,
    DoesNotExist,
}

/// Errors surfaced by the subscriber data-plane.
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("subscriber config error: {0}")]
    Config(String),

    /// Spec invariant: a subscriber cursor must never pass engine time.
    #[error("subscriber cursor ahead of engine time (cursor={cursor}, now={now})")]
    CursorAhead { cursor: Timepoint, now: Timepoint },

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error("endpoint error: {0}")]
    Endpoint(String),
}
