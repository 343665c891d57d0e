//! The constant reference agent: the same action at every scheduled step.

use serde::Deserialize;
use types::{AgentAction, Direction, Price};

use crate::traits::{Agent, AgentBuildError, AgentConfigBase, AgentError, InfoView};

/// Configuration for [`ConstantAgent`].
#[derive(Debug, Clone, Deserialize)]
pub struct ConstantConfig {
    pub external_force: f64,
    pub schedule_every: u64,
    pub direction: Direction,
    pub internal_force: f64,
}

/// Emits a fixed `(direction, internal_force)` whenever scheduled. Useful
/// for exercising the engine deterministically.
#[derive(Debug)]
pub struct ConstantAgent {
    base: AgentConfigBase,
    action: AgentAction,
}

impl ConstantAgent {
    pub fn new(config: ConstantConfig) -> Result<Self, AgentBuildError> {
        Ok(Self {
            base: AgentConfigBase::new(config.external_force, config.schedule_every)?,
            action: AgentAction::new(config.direction, config.internal_force),
        })
    }
}

impl Agent for ConstantAgent {
    fn base(&self) -> &AgentConfigBase {
        &self.base
    }

    fn evaluate(
        &mut self,
        _current_price: Price,
        _info: &mut Option<InfoView<'_>>,
    ) -> Result<AgentAction, AgentError> {
        Ok(self.action)
    }

    fn name(&self) -> &str {
        "ConstantAgent"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_constant_agent_repeats_action() {
        let mut agent = ConstantAgent::new(ConstantConfig {
            external_force: 0.01,
            schedule_every: 1,
            direction: Direction::Up,
            internal_force: 100.0,
        })
        .unwrap();

        for _ in 0..3 {
            let action = agent.evaluate(dec!(1), &mut None).unwrap();
            assert_eq!(action.direction, Direction::Up);
            assert_eq!(action.internal_force, 100.0);
        }
        assert!(!agent.uses_info());
    }

    #[test]
    fn test_constant_agent_clamps_configured_force() {
        let agent = ConstantAgent::new(ConstantConfig {
            external_force: 0.5,
            schedule_every: 1,
            direction: Direction::Down,
            internal_force: 500.0,
        })
        .unwrap();
        assert_eq!(agent.action.internal_force, 100.0);
    }

    #[test]
    fn test_constant_agent_rejects_bad_base() {
        assert!(
            ConstantAgent::new(ConstantConfig {
                external_force: 2.0,
                schedule_every: 1,
                direction: Direction::Up,
                internal_force: 10.0,
            })
            .is_err()
        );
    }
}
