//! Othello AI runtime: random, alpha-beta, Monte Carlo tree search and Q-learning
//! strategies behind one `MoveSelector` contract.

pub mod alphabeta;
pub mod config;
pub mod heuristics;
pub mod mcts;
pub mod qlearning;
pub mod random;

pub use alphabeta::AlphaBetaAgent;
pub use config::{
    AiConfig, Algorithm, AlphaBetaParams, Heuristic, MonteCarloParams, QLearningParams,
};
pub use heuristics::Evaluator;
pub use mcts::{MctsAgent, RolloutPolicy};
pub use qlearning::{
    load_qtable, save_qtable, shared_table, QLearningAgent, QTable, SharedQTable, StateKey,
};
pub use random::RandomAgent;

use engine::{coord_to_notation, Board, Color, Coord, EngineError, Winner};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("no legal moves")]
    NoLegalMoves,
    #[error("invalid ai config: {0}")]
    InvalidConfig(String),
    #[error("strategy chose {} which is not a legal move", coord_to_notation(*.0))]
    IllegalChoice(Coord),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("io error: {0}")]
    Io(String),
    #[error("search aborted")]
    SearchAborted,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AiMoveSource {
    Search,
    Random,
    Table,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiMoveMeta {
    pub algorithm: Algorithm,
    pub depth_reached: u8,
    /// Search nodes, MCTS iterations, or candidate moves scored.
    pub nodes: u64,
    pub time_us: u64,
    /// Estimated working memory of the decision.
    pub memory_bytes: u64,
    pub source: AiMoveSource,
}

impl AiMoveMeta {
    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.time_us)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSelection {
    pub mv: Coord,
    pub meta: AiMoveMeta,
}

pub trait MoveSelector: Send {
    fn algorithm(&self) -> Algorithm;

    /// `legal` is the non-empty legal move list for `color` on `board`, row-major.
    fn select_move(
        &mut self,
        board: &Board,
        color: Color,
        legal: &[Coord],
    ) -> Result<AiSelection, AiError>;

    /// Called once when a game this agent took part in finishes.
    fn observe_outcome(&mut self, _board: &Board, _color: Color, _winner: Winner) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    /// Human-facing games: Q-tables stay frozen unless `learn_online` is set.
    #[default]
    Interactive,
    /// Bot-vs-bot batches: Q-learning agents explore and update.
    Simulation,
}

#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    pub seed: Option<u64>,
    pub table: Option<SharedQTable>,
    pub mode: PlayMode,
}

pub fn make_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Validates `config` and builds the matching strategy.
pub fn build_agent(
    config: &AiConfig,
    ctx: &AgentContext,
) -> Result<Box<dyn MoveSelector>, AiError> {
    config.validate()?;
    let rng = make_rng(ctx.seed);
    let agent: Box<dyn MoveSelector> = match config {
        AiConfig::Random { .. } => Box::new(RandomAgent::new(rng)),
        AiConfig::Alphabeta {
            heuristic,
            parameters,
        } => {
            let evaluator = heuristic.evaluator().ok_or_else(|| {
                AiError::InvalidConfig(format!("{heuristic:?} is not a board evaluator"))
            })?;
            Box::new(AlphaBetaAgent::new(evaluator, parameters))
        }
        AiConfig::Montecarlo {
            heuristic,
            parameters,
        } => Box::new(MctsAgent::new(
            RolloutPolicy::from_heuristic(*heuristic)?,
            parameters,
            rng,
        )),
        AiConfig::Qlearning {
            heuristic,
            parameters,
        } => Box::new(QLearningAgent::from_context(
            heuristic.evaluator(),
            parameters,
            ctx,
            rng,
        )),
    };
    Ok(agent)
}

pub(crate) fn ensure_moves(legal: &[Coord]) -> Result<(), AiError> {
    if legal.is_empty() {
        return Err(AiError::NoLegalMoves);
    }
    Ok(())
}

pub(crate) fn elapsed_us(started: std::time::Instant) -> u64 {
    started.elapsed().as_micros().min(u64::MAX as u128) as u64
}
