//! Construction of agents from wire-format specifications.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cohort::{CohortAgentV1, CohortAgentV2};
use crate::constant::ConstantAgent;
use crate::gaussian::GaussianAgent;
use crate::traits::{Agent, AgentBuildError};

/// The agent types the factory knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    Constant,
    Gaussian,
    CohortV1,
    CohortV2,
    /// Reserved; requesting it reports `NotImplemented`.
    Deterministic,
}

impl std::str::FromStr for AgentKind {
    type Err = AgentBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "constant" => Ok(AgentKind::Constant),
            "gaussian" => Ok(AgentKind::Gaussian),
            "cohort_v1" => Ok(AgentKind::CohortV1),
            "cohort_v2" => Ok(AgentKind::CohortV2),
            "deterministic" => Ok(AgentKind::Deterministic),
            other => Err(AgentBuildError::UnknownType(other.to_string())),
        }
    }
}

/// One entry of an `agent/add` request: build `count` agents of type `type`
/// from `config`.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub count: u32,
    pub config: serde_json::Value,
}

fn parse_config<T: DeserializeOwned>(config: &serde_json::Value) -> Result<T, AgentBuildError> {
    serde_json::from_value(config.clone()).map_err(|e| AgentBuildError::Config(e.to_string()))
}

/// Build a single agent of the given kind.
pub fn build_agent(
    kind: AgentKind,
    config: &serde_json::Value,
) -> Result<Box<dyn Agent>, AgentBuildError> {
    match kind {
        AgentKind::Constant => Ok(Box::new(ConstantAgent::new(parse_config(config)?)?)),
        AgentKind::Gaussian => Ok(Box::new(GaussianAgent::new(parse_config(config)?)?)),
        AgentKind::CohortV1 => Ok(Box::new(CohortAgentV1::new(parse_config(config)?)?)),
        AgentKind::CohortV2 => Ok(Box::new(CohortAgentV2::new(parse_config(config)?)?)),
        AgentKind::Deterministic => Err(AgentBuildError::NotImplemented(
            "deterministic".to_string(),
        )),
    }
}

/// Build every agent a spec entry asks for. Each built agent draws its own
/// entropy seed, so the instances are independent.
pub fn build_agents(spec: &AgentSpec) -> Result<Vec<Box<dyn Agent>>, AgentBuildError> {
    let kind: AgentKind = spec.kind.parse()?;
    (0..spec.count)
        .map(|_| build_agent(kind, &spec.config))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_constant_from_json() {
        let spec = AgentSpec {
            kind: "constant".to_string(),
            count: 3,
            config: json!({
                "external_force": 0.01,
                "schedule_every": 1,
                "direction": "UP",
                "internal_force": 100.0
            }),
        };
        let built = build_agents(&spec).unwrap();
        assert_eq!(built.len(), 3);
        assert!(!built[0].uses_info());
    }

    #[test]
    fn test_build_cohort_v2_from_json() {
        let spec = AgentSpec {
            kind: "cohort_v2".to_string(),
            count: 1,
            config: json!({
                "external_force": 0.05,
                "schedule_every": 2,
                "variance_multiplier": 0.1,
                "force_threshold": 0.5,
                "distribution_parameters": [0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.2]
            }),
        };
        let built = build_agents(&spec).unwrap();
        assert_eq!(built.len(), 1);
        assert!(built[0].uses_info());
        assert_eq!(built[0].base().schedule_every, 2);
    }

    #[test]
    fn test_unknown_type() {
        let spec = AgentSpec {
            kind: "astrological".to_string(),
            count: 1,
            config: json!({}),
        };
        assert!(matches!(
            build_agents(&spec),
            Err(AgentBuildError::UnknownType(_))
        ));
    }

    #[test]
    fn test_unimplemented_type() {
        let spec = AgentSpec {
            kind: "deterministic".to_string(),
            count: 1,
            config: json!({}),
        };
        assert!(matches!(
            build_agents(&spec),
            Err(AgentBuildError::NotImplemented(_))
        ));
    }

    #[test]
    fn test_missing_config_field() {
        let spec = AgentSpec {
            kind: "gaussian".to_string(),
            count: 1,
            config: json!({ "external_force": 0.01, "schedule_every": 1 }),
        };
        assert!(matches!(
            build_agents(&spec),
            Err(AgentBuildError::Config(_))
        ));
    }
}
