//! Per-agent bookkeeping owned by the engine.

use std::collections::BTreeSet;

use agents::Agent;
use serde::Serialize;
use timeseries::Ts;
use types::{AgentAction, AgentId, Timepoint};

/// Behavioral flags attached to an agent record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentFlag {
    /// Exclude this agent's info cursor from the global low-watermark.
    /// Set at insertion for agents that never read info, so they do not
    /// pin unread history forever.
    IgnoreInfo,
}

/// Everything the engine keeps per live agent: the exclusively-owned agent
/// instance, its identity, and its action history since creation.
pub struct AgentRecord {
    pub agent: Box<dyn Agent>,
    pub id: AgentId,
    pub created: Timepoint,
    /// One slot per scheduled step: the action taken, or absent when the
    /// evaluation failed.
    pub history: Ts<AgentAction>,
    pub flags: BTreeSet<AgentFlag>,
}

impl AgentRecord {
    /// Whether this agent runs at timepoint `t`, per its schedule config.
    pub fn is_scheduled(&self, t: Timepoint) -> bool {
        (t - self.created) % self.agent.base().schedule_every == 0
    }
}

/// Wire-visible description of one agent record.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub created: Timepoint,
    pub history_count: u64,
    pub flags: Vec<AgentFlag>,
}
