//! The gaussian reference agent: force sampled from a normal distribution.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use serde::Deserialize;
use types::{AgentAction, Direction, MAX_INTERNAL_FORCE, Price};

use crate::traits::{Agent, AgentBuildError, AgentConfigBase, AgentError, InfoView};

/// Configuration for [`GaussianAgent`].
#[derive(Debug, Clone, Deserialize)]
pub struct GaussianConfig {
    pub external_force: f64,
    pub schedule_every: u64,
    pub mean: f64,
    pub stddev: f64,
}

/// Samples `N(mean, stddev)` at each step; the sign of the sample picks the
/// direction and its magnitude, clamped to 100, the internal force.
///
/// The RNG is seeded from OS entropy at construction — one of the three
/// declared nondeterminism sources of the simulation.
pub struct GaussianAgent {
    base: AgentConfigBase,
    dist: Normal<f64>,
    rng: StdRng,
}

impl GaussianAgent {
    pub fn new(config: GaussianConfig) -> Result<Self, AgentBuildError> {
        let base = AgentConfigBase::new(config.external_force, config.schedule_every)?;
        let dist = Normal::new(config.mean, config.stddev)
            .map_err(|e| AgentBuildError::Config(format!("invalid normal distribution: {e}")))?;

        Ok(Self {
            base,
            dist,
            rng: StdRng::from_entropy(),
        })
    }
}

impl Agent for GaussianAgent {
    fn base(&self) -> &AgentConfigBase {
        &self.base
    }

    fn evaluate(
        &mut self,
        _current_price: Price,
        _info: &mut Option<InfoView<'_>>,
    ) -> Result<AgentAction, AgentError> {
        let sample = self.dist.sample(&mut self.rng);
        let (direction, magnitude) = if sample >= 0.0 {
            (Direction::Up, sample)
        } else {
            (Direction::Down, -sample)
        };

        Ok(AgentAction::new(
            direction,
            magnitude.min(MAX_INTERNAL_FORCE),
        ))
    }

    fn name(&self) -> &str {
        "GaussianAgent"
    }
}
