//! Bot configuration: algorithm tag, heuristic tag and algorithm parameters.
//!
//! Wire shape: `{ "algorithm": "alphabeta", "heuristic": "hybrid", "parameters": { "depth": 3 } }`.
//! Unknown parameters are ignored; missing ones take the defaults below.

use crate::heuristics::Evaluator;
use crate::AiError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const MAX_ALPHABETA_DEPTH: u8 = 8;
pub const MAX_MCTS_ITERATIONS: u32 = 100_000;
pub const MAX_MCTS_TIME_LIMIT_SECS: f64 = 120.0;
pub const MAX_ALPHABETA_TIME_LIMIT_MS: u64 = 120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    Random,
    Alphabeta,
    Montecarlo,
    Qlearning,
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Random => "random",
            Algorithm::Alphabeta => "alphabeta",
            Algorithm::Montecarlo => "montecarlo",
            Algorithm::Qlearning => "qlearning",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Heuristic {
    #[default]
    None,
    StaticWeights,
    MobilityBased,
    Hybrid,
    GreedyRollout,
    RandomRollout,
}

impl Heuristic {
    /// Board evaluator behind the tag; rollout policies and `none` have none.
    pub fn evaluator(self) -> Option<Evaluator> {
        match self {
            Heuristic::StaticWeights => Some(Evaluator::StaticWeights),
            Heuristic::MobilityBased => Some(Evaluator::Mobility),
            Heuristic::Hybrid => Some(Evaluator::Hybrid),
            Heuristic::None | Heuristic::GreedyRollout | Heuristic::RandomRollout => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlphaBetaParams {
    #[serde(default = "default_depth")]
    pub depth: u8,
    #[serde(default = "default_use_sorting")]
    pub use_sorting: bool,
    #[serde(default)]
    pub time_limit_ms: Option<u64>,
}

fn default_depth() -> u8 {
    4
}
fn default_use_sorting() -> bool {
    true
}

impl Default for AlphaBetaParams {
    fn default() -> Self {
        Self {
            depth: default_depth(),
            use_sorting: default_use_sorting(),
            time_limit_ms: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloParams {
    /// 0 disables the iteration cap.
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Seconds; 0 disables the wall-clock cap.
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,
    #[serde(default = "default_exploration_constant")]
    pub exploration_constant: f64,
}

fn default_iterations() -> u32 {
    1000
}
fn default_time_limit() -> f64 {
    4.5
}
fn default_exploration_constant() -> f64 {
    std::f64::consts::SQRT_2
}

impl Default for MonteCarloParams {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            time_limit: default_time_limit(),
            exploration_constant: default_exploration_constant(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QLearningParams {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_discount_factor")]
    pub discount_factor: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    /// Keep learning outside simulations.
    #[serde(default)]
    pub learn_online: bool,
    /// Learn into the arena-wide table instead of a per-game snapshot.
    #[serde(default)]
    pub share_across_games: bool,
}

fn default_learning_rate() -> f64 {
    0.1
}
fn default_discount_factor() -> f64 {
    0.9
}
fn default_epsilon() -> f64 {
    0.1
}

impl Default for QLearningParams {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            discount_factor: default_discount_factor(),
            epsilon: default_epsilon(),
            learn_online: false,
            share_across_games: false,
        }
    }
}

fn default_alphabeta_heuristic() -> Heuristic {
    Heuristic::Hybrid
}
fn default_montecarlo_heuristic() -> Heuristic {
    Heuristic::RandomRollout
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum AiConfig {
    Random {
        #[serde(default, skip_deserializing)]
        heuristic: Heuristic,
    },
    Alphabeta {
        #[serde(default = "default_alphabeta_heuristic")]
        heuristic: Heuristic,
        #[serde(default)]
        parameters: AlphaBetaParams,
    },
    Montecarlo {
        #[serde(default = "default_montecarlo_heuristic")]
        heuristic: Heuristic,
        #[serde(default)]
        parameters: MonteCarloParams,
    },
    Qlearning {
        #[serde(default)]
        heuristic: Heuristic,
        #[serde(default)]
        parameters: QLearningParams,
    },
}

impl AiConfig {
    pub fn random() -> Self {
        AiConfig::Random {
            heuristic: Heuristic::None,
        }
    }

    pub fn alphabeta(heuristic: Heuristic, depth: u8) -> Self {
        AiConfig::Alphabeta {
            heuristic,
            parameters: AlphaBetaParams {
                depth,
                ..AlphaBetaParams::default()
            },
        }
    }

    pub fn montecarlo(heuristic: Heuristic, iterations: u32, time_limit: f64) -> Self {
        AiConfig::Montecarlo {
            heuristic,
            parameters: MonteCarloParams {
                iterations,
                time_limit,
                ..MonteCarloParams::default()
            },
        }
    }

    pub fn qlearning(heuristic: Heuristic, parameters: QLearningParams) -> Self {
        AiConfig::Qlearning {
            heuristic,
            parameters,
        }
    }

    /// Parses an untrusted JSON value; shape errors become `InvalidConfig`.
    pub fn from_json(value: serde_json::Value) -> Result<Self, AiError> {
        let config: AiConfig =
            serde_json::from_value(value).map_err(|e| AiError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn algorithm(&self) -> Algorithm {
        match self {
            AiConfig::Random { .. } => Algorithm::Random,
            AiConfig::Alphabeta { .. } => Algorithm::Alphabeta,
            AiConfig::Montecarlo { .. } => Algorithm::Montecarlo,
            AiConfig::Qlearning { .. } => Algorithm::Qlearning,
        }
    }

    pub fn heuristic(&self) -> Heuristic {
        match self {
            AiConfig::Random { .. } => Heuristic::None,
            AiConfig::Alphabeta { heuristic, .. }
            | AiConfig::Montecarlo { heuristic, .. }
            | AiConfig::Qlearning { heuristic, .. } => *heuristic,
        }
    }

    /// True when this bot writes into the arena-wide Q-table during a batch.
    pub fn shares_learning(&self) -> bool {
        matches!(
            self,
            AiConfig::Qlearning { parameters, .. } if parameters.share_across_games
        )
    }

    pub fn validate(&self) -> Result<(), AiError> {
        match self {
            AiConfig::Random { .. } => Ok(()),
            AiConfig::Alphabeta {
                heuristic,
                parameters,
            } => {
                if heuristic.evaluator().is_none() {
                    return Err(invalid(format!(
                        "alphabeta needs a board evaluator heuristic, got {heuristic:?}"
                    )));
                }
                if !(1..=MAX_ALPHABETA_DEPTH).contains(&parameters.depth) {
                    return Err(invalid(format!(
                        "alphabeta depth must be within 1..={MAX_ALPHABETA_DEPTH}, got {}",
                        parameters.depth
                    )));
                }
                if let Some(ms) = parameters.time_limit_ms {
                    if ms == 0 || ms > MAX_ALPHABETA_TIME_LIMIT_MS {
                        return Err(invalid(format!(
                            "alphabeta time_limit_ms must be within 1..={MAX_ALPHABETA_TIME_LIMIT_MS}, got {ms}"
                        )));
                    }
                }
                Ok(())
            }
            AiConfig::Montecarlo {
                heuristic,
                parameters,
            } => {
                if *heuristic == Heuristic::None {
                    return Err(invalid(
                        "montecarlo needs a rollout policy or evaluator heuristic".to_string(),
                    ));
                }
                if parameters.iterations > MAX_MCTS_ITERATIONS {
                    return Err(invalid(format!(
                        "montecarlo iterations must be at most {MAX_MCTS_ITERATIONS}, got {}",
                        parameters.iterations
                    )));
                }
                let limit = parameters.time_limit;
                if !limit.is_finite() || !(0.0..=MAX_MCTS_TIME_LIMIT_SECS).contains(&limit) {
                    return Err(invalid(format!(
                        "montecarlo time_limit must be within 0..={MAX_MCTS_TIME_LIMIT_SECS} seconds, got {limit}"
                    )));
                }
                if parameters.iterations == 0 && limit == 0.0 {
                    return Err(invalid(
                        "montecarlo needs a positive iteration count or time limit".to_string(),
                    ));
                }
                let c = parameters.exploration_constant;
                if !c.is_finite() || c <= 0.0 {
                    return Err(invalid(format!(
                        "montecarlo exploration_constant must be positive, got {c}"
                    )));
                }
                Ok(())
            }
            AiConfig::Qlearning {
                heuristic,
                parameters,
            } => {
                if *heuristic != Heuristic::None && heuristic.evaluator().is_none() {
                    return Err(invalid(format!(
                        "qlearning accepts none or a board evaluator heuristic, got {heuristic:?}"
                    )));
                }
                for (name, value) in [
                    ("learning_rate", parameters.learning_rate),
                    ("discount_factor", parameters.discount_factor),
                    ("epsilon", parameters.epsilon),
                ] {
                    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
                        return Err(invalid(format!(
                            "qlearning {name} must be within 0..=1, got {value}"
                        )));
                    }
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for AiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AiConfig::Random { .. } => write!(f, "random"),
            AiConfig::Alphabeta {
                heuristic,
                parameters,
            } => write!(f, "alphabeta({heuristic:?}, depth {})", parameters.depth),
            AiConfig::Montecarlo {
                heuristic,
                parameters,
            } => write!(
                f,
                "montecarlo({heuristic:?}, {} iterations, {}s)",
                parameters.iterations, parameters.time_limit
            ),
            AiConfig::Qlearning { heuristic, .. } => write!(f, "qlearning({heuristic:?})"),
        }
    }
}

fn invalid(detail: String) -> AiError {
    AiError::InvalidConfig(detail)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tagged_wire_shape() {
        let config = AiConfig::from_json(json!({
            "algorithm": "alphabeta",
            "heuristic": "mobility_based",
            "parameters": { "depth": 3 }
        }))
        .unwrap();
        match config {
            AiConfig::Alphabeta {
                heuristic,
                parameters,
            } => {
                assert_eq!(heuristic, Heuristic::MobilityBased);
                assert_eq!(parameters.depth, 3);
                assert!(parameters.use_sorting);
                assert_eq!(parameters.time_limit_ms, None);
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[test]
    fn random_heuristic_is_always_stored_as_none() {
        let config = AiConfig::from_json(json!({
            "algorithm": "random",
            "heuristic": "hybrid",
            "parameters": { "depth": 7 }
        }))
        .unwrap();
        assert_eq!(config.heuristic(), Heuristic::None);
        let wire = serde_json::to_value(&config).unwrap();
        assert_eq!(wire, json!({ "algorithm": "random", "heuristic": "none" }));
    }

    #[test]
    fn montecarlo_defaults() {
        let config = AiConfig::from_json(json!({ "algorithm": "montecarlo" })).unwrap();
        let AiConfig::Montecarlo {
            heuristic,
            parameters,
        } = config
        else {
            panic!("expected montecarlo");
        };
        assert_eq!(heuristic, Heuristic::RandomRollout);
        assert_eq!(parameters.iterations, 1000);
        assert_eq!(parameters.time_limit, 4.5);
        assert!((parameters.exploration_constant - std::f64::consts::SQRT_2).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_positive_depth() {
        let err = AiConfig::alphabeta(Heuristic::Hybrid, 0).validate().unwrap_err();
        assert!(matches!(err, AiError::InvalidConfig(_)));
        let err = AiConfig::from_json(json!({
            "algorithm": "alphabeta",
            "heuristic": "hybrid",
            "parameters": { "depth": -2 }
        }))
        .unwrap_err();
        assert!(matches!(err, AiError::InvalidConfig(_)));
        assert!(AiConfig::alphabeta(Heuristic::Hybrid, 9).validate().is_err());
    }

    #[test]
    fn rejects_montecarlo_without_any_budget() {
        let err = AiConfig::montecarlo(Heuristic::RandomRollout, 0, 0.0)
            .validate()
            .unwrap_err();
        assert!(matches!(err, AiError::InvalidConfig(_)));
        assert!(AiConfig::montecarlo(Heuristic::RandomRollout, 0, 0.05)
            .validate()
            .is_ok());
        assert!(AiConfig::montecarlo(Heuristic::RandomRollout, 10, -1.0)
            .validate()
            .is_err());
    }

    #[test]
    fn rejects_heuristics_that_do_not_apply() {
        assert!(AiConfig::alphabeta(Heuristic::GreedyRollout, 3)
            .validate()
            .is_err());
        assert!(AiConfig::montecarlo(Heuristic::None, 10, 0.0)
            .validate()
            .is_err());
        assert!(
            AiConfig::qlearning(Heuristic::RandomRollout, QLearningParams::default())
                .validate()
                .is_err()
        );
        assert!(AiConfig::qlearning(Heuristic::Hybrid, QLearningParams::default())
            .validate()
            .is_ok());
    }

    #[test]
    fn rejects_out_of_range_learning_parameters() {
        let params = QLearningParams {
            epsilon: 1.5,
            ..QLearningParams::default()
        };
        assert!(AiConfig::qlearning(Heuristic::None, params).validate().is_err());
    }

    #[test]
    fn unknown_algorithm_is_invalid_config() {
        let err = AiConfig::from_json(json!({ "algorithm": "minimax" })).unwrap_err();
        assert!(matches!(err, AiError::InvalidConfig(_)));
    }
}
