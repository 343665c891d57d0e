//! The `Agent` trait and the pieces shared by all agent implementations.

use timeseries::TsSparseView;
use types::{AgentAction, Infoset, Price, Timepoint};

/// The cursor handed to agents over the engine's information history.
///
/// The engine constructs one sparse view per iteration block, positions it
/// for each agent, and lends it to `evaluate` for the duration of the call.
pub type InfoView<'a> = TsSparseView<'a, Infoset>;

/// A failure raised inside an agent's evaluation.
///
/// The engine catches these at the `evaluate` boundary: the step is recorded
/// as a skip in the agent's history and the simulation continues.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("distribution failure: {0}")]
    Distribution(String),

    #[error("numeric failure: {0}")]
    Numeric(String),
}

/// A failure constructing an agent from configuration.
#[derive(Debug, thiserror::Error)]
pub enum AgentBuildError {
    #[error("unknown agent type: {0}")]
    UnknownType(String),

    #[error("agent type not implemented: {0}")]
    NotImplemented(String),

    #[error("agent config error: {0}")]
    Config(String),
}

/// Configuration every agent carries.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfigBase {
    /// Scales the agent's internal force into a fractional price move.
    /// Must lie in `(0, 1]`.
    pub external_force: f64,

    /// The agent runs at timepoint `t` iff `(t - created) % schedule_every == 0`.
    /// Must be at least 1.
    pub schedule_every: u64,
}

impl AgentConfigBase {
    pub fn new(external_force: f64, schedule_every: u64) -> Result<Self, AgentBuildError> {
        if !(external_force > 0.0 && external_force <= 1.0) {
            return Err(AgentBuildError::Config(format!(
                "external_force must be in (0, 1]; provided: {external_force}"
            )));
        }
        if schedule_every == 0 {
            return Err(AgentBuildError::Config(
                "schedule_every must be > 0".to_string(),
            ));
        }
        Ok(Self {
            external_force,
            schedule_every,
        })
    }
}

/// The abstract evaluator the engine drives.
///
/// `evaluate` receives the price the agent observes and, when the
/// information history holds any entries, a mutable borrow of the shared
/// info view. The engine positions the view before the call and inspects
/// [`Agent::info_cursor`] afterwards to learn how far the agent has read.
pub trait Agent: Send {
    /// The base configuration (external force, schedule).
    fn base(&self) -> &AgentConfigBase;

    /// Produce this step's action.
    fn evaluate(
        &mut self,
        current_price: Price,
        info: &mut Option<InfoView<'_>>,
    ) -> Result<AgentAction, AgentError>;

    /// Timepoint of the most recently read info entry, `None` if the agent
    /// has never read any.
    fn info_cursor(&self) -> Option<Timepoint> {
        None
    }

    /// Whether this agent ever consumes info. Agents that do not are
    /// excluded from the engine's low-watermark calculation.
    fn uses_info(&self) -> bool {
        false
    }

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "Agent"
    }
}

/// Per-agent reading position in the information stream.
///
/// Info-consuming agents embed one of these and call [`InfoTap::read_next`]
/// in a loop from `evaluate`; it records the last read timepoint and steps
/// the borrowed view forward.
#[derive(Debug, Clone, Default)]
pub struct InfoTap {
    cursor: Option<Timepoint>,
}

impl InfoTap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Timepoint of the most recently read entry.
    pub fn cursor(&self) -> Option<Timepoint> {
        self.cursor
    }

    /// Read the infoset under the view's cursor and advance past it.
    ///
    /// Returns `None` when no view was provided (the info history is empty)
    /// or when every remaining entry has already been read.
    pub fn read_next(&mut self, view: &mut Option<InfoView<'_>>) -> Option<Infoset> {
        let view = view.as_mut()?;
        let tp = view.cursor()?;
        let set = view.value()?.clone();
        self.cursor = Some(tp);
        view.advance(1);
        Some(set)
    }
}
