//! Tabular Q-learning with epsilon-greedy exploration.
//!
//! The TD update for a decision is applied lazily: at the learner's next decision
//! (bootstrapping from that state's best value) or at game end (terminal reward).

use crate::config::QLearningParams;
use crate::heuristics::Evaluator;
use crate::{elapsed_us, ensure_moves, AgentContext, AiError, AiMoveMeta, AiMoveSource};
use crate::{AiSelection, Algorithm, MoveSelector, PlayMode};
use engine::{Board, Color, Coord, Winner};
use parking_lot::RwLock;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Board plus side to move, collapsed to a hashable key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateKey {
    black: u64,
    white: u64,
    to_move: Color,
}

impl StateKey {
    pub fn new(board: &Board, to_move: Color) -> Self {
        Self {
            black: board.discs(Color::Black),
            white: board.discs(Color::White),
            to_move,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QTable {
    values: HashMap<(StateKey, Coord), f64>,
    updates: u64,
}

impl QTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unseen pairs are worth 0.
    pub fn get(&self, key: StateKey, mv: Coord) -> f64 {
        self.values.get(&(key, mv)).copied().unwrap_or(0.0)
    }

    pub fn best_value(&self, key: StateKey, legal: &[Coord]) -> f64 {
        if legal.is_empty() {
            return 0.0;
        }
        legal
            .iter()
            .map(|&mv| self.get(key, mv))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// `Q(s,a) += alpha * (target - Q(s,a))`.
    pub fn update(&mut self, key: StateKey, mv: Coord, target: f64, alpha: f64) -> f64 {
        let entry = self.values.entry((key, mv)).or_insert(0.0);
        *entry += alpha * (target - *entry);
        self.updates += 1;
        *entry
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn updates(&self) -> u64 {
        self.updates
    }

    pub fn memory_bytes(&self) -> u64 {
        (self.values.capacity() * std::mem::size_of::<((StateKey, Coord), f64)>()) as u64
    }
}

pub type SharedQTable = Arc<RwLock<QTable>>;

pub fn shared_table(table: QTable) -> SharedQTable {
    Arc::new(RwLock::new(table))
}

pub fn save_qtable(path: &Path, table: &QTable) -> Result<(), AiError> {
    let bytes = bincode::serialize(table).map_err(|e| AiError::Io(e.to_string()))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| AiError::Io(e.to_string()))?;
    }
    fs::write(path, bytes).map_err(|e| AiError::Io(e.to_string()))?;
    info!(path = %path.display(), entries = table.len(), "q-table saved");
    Ok(())
}

pub fn load_qtable(path: &Path) -> Result<QTable, AiError> {
    let bytes = fs::read(path).map_err(|e| AiError::Io(e.to_string()))?;
    bincode::deserialize(&bytes).map_err(|e| AiError::Io(e.to_string()))
}

enum TableHandle {
    Shared(SharedQTable),
    Private(QTable),
}

impl TableHandle {
    fn read<R>(&self, f: impl FnOnce(&QTable) -> R) -> R {
        match self {
            TableHandle::Shared(table) => f(&*table.read()),
            TableHandle::Private(table) => f(table),
        }
    }

    fn write<R>(&mut self, f: impl FnOnce(&mut QTable) -> R) -> R {
        match self {
            TableHandle::Shared(table) => f(&mut *table.write()),
            TableHandle::Private(table) => f(table),
        }
    }
}

pub struct QLearningAgent {
    params: QLearningParams,
    tie_break: Option<Evaluator>,
    learning: bool,
    table: TableHandle,
    rng: StdRng,
    pending: Option<(StateKey, Coord)>,
}

impl QLearningAgent {
    /// Frozen agent reading a private table.
    pub fn frozen(
        table: QTable,
        tie_break: Option<Evaluator>,
        params: &QLearningParams,
        rng: StdRng,
    ) -> Self {
        Self {
            params: params.clone(),
            tie_break,
            learning: false,
            table: TableHandle::Private(table),
            rng,
            pending: None,
        }
    }

    /// Learns in simulations, or anywhere when `learn_online` is set. Learning agents
    /// write into the shared table only with `share_across_games`; otherwise they work
    /// on a snapshot taken now.
    pub fn from_context(
        tie_break: Option<Evaluator>,
        params: &QLearningParams,
        ctx: &AgentContext,
        rng: StdRng,
    ) -> Self {
        let learning = params.learn_online || ctx.mode == PlayMode::Simulation;
        let table = match &ctx.table {
            Some(shared) if !learning || params.share_across_games => {
                TableHandle::Shared(Arc::clone(shared))
            }
            Some(shared) => TableHandle::Private(shared.read().clone()),
            None => TableHandle::Private(QTable::new()),
        };
        Self {
            params: params.clone(),
            tie_break,
            learning,
            table,
            rng,
            pending: None,
        }
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    pub fn table_len(&self) -> usize {
        self.table.read(QTable::len)
    }

    pub fn value(&self, board: &Board, color: Color, mv: Coord) -> f64 {
        self.table.read(|t| t.get(StateKey::new(board, color), mv))
    }

    fn settle_pending(&mut self, target: f64) {
        if let Some((key, mv)) = self.pending.take() {
            let alpha = self.params.learning_rate;
            self.table.write(|t| t.update(key, mv, target, alpha));
        }
    }

    /// Highest Q-value first; ties by the evaluator on the successor, then move order.
    fn greedy(
        &self,
        board: &Board,
        color: Color,
        key: StateKey,
        legal: &[Coord],
    ) -> Result<Coord, AiError> {
        let values: Vec<f64> =
            self.table.read(|t| legal.iter().map(|&mv| t.get(key, mv)).collect());
        let top = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let tied: Vec<Coord> = legal
            .iter()
            .zip(&values)
            .filter(|(_, v)| **v == top)
            .map(|(&mv, _)| mv)
            .collect();
        let Some(evaluator) = self.tie_break else {
            return tied.first().copied().ok_or(AiError::NoLegalMoves);
        };
        let mut best: Option<(Coord, f64)> = None;
        for mv in tied {
            let score = evaluator.score(&board.apply(mv, color)?, color);
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((mv, score));
            }
        }
        best.map(|(mv, _)| mv).ok_or(AiError::NoLegalMoves)
    }
}

impl MoveSelector for QLearningAgent {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Qlearning
    }

    fn select_move(
        &mut self,
        board: &Board,
        color: Color,
        legal: &[Coord],
    ) -> Result<AiSelection, AiError> {
        ensure_moves(legal)?;
        let started = Instant::now();
        let key = StateKey::new(board, color);

        if self.learning {
            let best_next = self.table.read(|t| t.best_value(key, legal));
            self.settle_pending(self.params.discount_factor * best_next);
        }

        let explore = self.learning && self.rng.gen::<f64>() < self.params.epsilon;
        let (mv, source) = if explore {
            let mv = *legal.choose(&mut self.rng).ok_or(AiError::NoLegalMoves)?;
            (mv, AiMoveSource::Random)
        } else {
            (self.greedy(board, color, key, legal)?, AiMoveSource::Table)
        };

        if self.learning {
            self.pending = Some((key, mv));
        }
        Ok(AiSelection {
            mv,
            meta: AiMoveMeta {
                algorithm: Algorithm::Qlearning,
                depth_reached: 1,
                nodes: legal.len() as u64,
                time_us: elapsed_us(started),
                memory_bytes: self.table.read(QTable::memory_bytes),
                source,
            },
        })
    }

    fn observe_outcome(&mut self, _board: &Board, color: Color, winner: Winner) {
        if !self.learning {
            return;
        }
        // +1 win, 0 draw, -1 loss.
        let reward = 2.0 * winner.reward_for(color) - 1.0;
        self.settle_pending(reward);
        debug!(color = %color, ?winner, entries = self.table_len(), "q-learning episode closed");
    }
}
