//! Agent contract and reference agents for the crowdsim engine.
//!
//! An agent is an evaluator: given the current price and an optional cursor
//! into the shared information history, it emits a directional buy/sell
//! action with a bounded force. The engine owns every agent exclusively and
//! invokes them on its own thread; agents never see the engine itself.
//!
//! Three reference agents ship with the crate:
//! - [`ConstantAgent`] — a fixed `(direction, force)` every step;
//! - [`GaussianAgent`] — samples `N(mean, stddev)`; the sign picks the
//!   direction and the magnitude (clamped to 100) the force;
//! - [`CohortAgentV1`] / [`CohortAgentV2`] — maintain a subjective "price
//!   view" updated by incoming information and push the price toward it.
//!
//! [`build_agents`] constructs agents from JSON configs for the control
//! surface.

mod cohort;
mod constant;
mod factory;
mod gaussian;
mod traits;

pub use cohort::{CohortAgentV1, CohortAgentV2, CohortV1Config, CohortV2Config, DistributionShape};
pub use constant::{ConstantAgent, ConstantConfig};
pub use factory::{AgentKind, AgentSpec, build_agent, build_agents};
pub use gaussian::{GaussianAgent, GaussianConfig};
pub use traits::{Agent, AgentBuildError, AgentConfigBase, AgentError, InfoTap, InfoView};
