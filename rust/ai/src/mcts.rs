//! Monte Carlo tree search over an index-addressed node arena.
//!
//! Each node stores the reward of the player who moved into it, so UCB1 at a
//! parent always maximizes from the point of view of the side choosing there,
//! passes included.

use crate::config::{Heuristic, MonteCarloParams};
use crate::heuristics::Evaluator;
use crate::{elapsed_us, ensure_moves, AiError, AiMoveMeta, AiMoveSource, AiSelection, Algorithm};
use crate::MoveSelector;
use engine::{Board, Color, Coord, Winner};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::{Duration, Instant};
use tracing::debug;

/// Upper bound on tree nodes per decision. A node is about 100 bytes plus its
/// `children`/`untried` vectors, so a full tree stays near 50 MB, and a parallel
/// simulation batch can hold one such tree per worker.
pub const MAX_TREE_NODES: usize = 250_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RolloutPolicy {
    Random,
    /// Each rollout ply plays the move whose successor scores best for the mover.
    Greedy(Evaluator),
}

impl RolloutPolicy {
    pub fn from_heuristic(heuristic: Heuristic) -> Result<Self, AiError> {
        match heuristic {
            Heuristic::RandomRollout => Ok(RolloutPolicy::Random),
            Heuristic::GreedyRollout => Ok(RolloutPolicy::Greedy(Evaluator::StaticWeights)),
            other => other.evaluator().map(RolloutPolicy::Greedy).ok_or_else(|| {
                AiError::InvalidConfig(format!("{other:?} is not a rollout policy"))
            }),
        }
    }
}

#[derive(Debug)]
struct Node {
    board: Board,
    /// Side to move here; `None` once the game is over.
    to_move: Option<Color>,
    /// Side whose move produced this node.
    mover: Color,
    mv: Option<Coord>,
    parent: Option<usize>,
    children: Vec<usize>,
    untried: Vec<Coord>,
    visits: u32,
    reward: f64,
    depth: u8,
}

fn next_to_move(board: &Board, mover: Color) -> Option<Color> {
    let other = mover.opponent();
    if board.has_legal_move(other) {
        Some(other)
    } else if board.has_legal_move(mover) {
        Some(mover)
    } else {
        None
    }
}

struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    fn new(board: Board, color: Color, legal: &[Coord]) -> Self {
        let root = Node {
            board,
            to_move: Some(color),
            mover: color.opponent(),
            mv: None,
            parent: None,
            children: Vec::new(),
            untried: legal.to_vec(),
            visits: 0,
            reward: 0.0,
            depth: 0,
        };
        Self { nodes: vec![root] }
    }

    fn ucb1(&self, parent: usize, child: usize, c: f64) -> f64 {
        let node = &self.nodes[child];
        if node.visits == 0 {
            return f64::INFINITY;
        }
        let parent_visits = self.nodes[parent].visits.max(1) as f64;
        let visits = node.visits as f64;
        node.reward / visits + c * (parent_visits.ln() / visits).sqrt()
    }

    /// Descends through fully expanded nodes.
    fn select(&self, c: f64, can_grow: bool) -> usize {
        let mut idx = 0;
        loop {
            let node = &self.nodes[idx];
            if node.children.is_empty() || (can_grow && !node.untried.is_empty()) {
                return idx;
            }
            let mut best = node.children[0];
            let mut best_score = f64::NEG_INFINITY;
            for &child in &node.children {
                let score = self.ucb1(idx, child, c);
                if score > best_score {
                    best_score = score;
                    best = child;
                }
            }
            idx = best;
        }
    }

    fn expand(&mut self, idx: usize, rng: &mut StdRng) -> Result<usize, AiError> {
        let pick = rng.gen_range(0..self.nodes[idx].untried.len());
        let mv = self.nodes[idx].untried.swap_remove(pick);
        let parent = &self.nodes[idx];
        let mover = parent.to_move.ok_or(AiError::NoLegalMoves)?;
        let board = parent.board.apply(mv, mover)?;
        let to_move = next_to_move(&board, mover);
        let untried = to_move.map(|c| board.legal_moves(c)).unwrap_or_default();
        let depth = parent.depth.saturating_add(1);
        let child = self.nodes.len();
        self.nodes.push(Node {
            board,
            to_move,
            mover,
            mv: Some(mv),
            parent: Some(idx),
            children: Vec::new(),
            untried,
            visits: 0,
            reward: 0.0,
            depth,
        });
        self.nodes[idx].children.push(child);
        Ok(child)
    }

    fn backpropagate(&mut self, mut idx: usize, winner: Winner) {
        loop {
            let node = &mut self.nodes[idx];
            node.visits += 1;
            node.reward += winner.reward_for(node.mover);
            match node.parent {
                Some(parent) => idx = parent,
                None => break,
            }
        }
    }

    fn memory_bytes(&self) -> u64 {
        let per_node = std::mem::size_of::<Node>();
        let extra: usize = self
            .nodes
            .iter()
            .map(|n| {
                n.children.capacity() * std::mem::size_of::<usize>()
                    + n.untried.capacity() * std::mem::size_of::<Coord>()
            })
            .sum();
        (self.nodes.capacity() * per_node + extra) as u64
    }
}

pub struct MctsAgent {
    policy: RolloutPolicy,
    iterations: u32,
    time_limit: Option<Duration>,
    exploration: f64,
    node_cap: usize,
    rng: StdRng,
}

impl MctsAgent {
    pub fn new(policy: RolloutPolicy, params: &MonteCarloParams, rng: StdRng) -> Self {
        let time_limit =
            (params.time_limit > 0.0).then(|| Duration::from_secs_f64(params.time_limit));
        Self {
            policy,
            iterations: params.iterations,
            time_limit,
            exploration: params.exploration_constant,
            node_cap: MAX_TREE_NODES,
            rng,
        }
    }

    /// Lowers the tree size limit; values above `MAX_TREE_NODES` are clamped.
    pub fn with_node_cap(mut self, cap: usize) -> Self {
        self.node_cap = cap.clamp(1, MAX_TREE_NODES);
        self
    }

    fn rollout(
        &mut self,
        mut board: Board,
        mut to_move: Option<Color>,
    ) -> Result<Winner, AiError> {
        while let Some(color) = to_move {
            let moves = board.legal_moves(color);
            let mv = match self.policy {
                RolloutPolicy::Random => {
                    *moves.choose(&mut self.rng).ok_or(AiError::NoLegalMoves)?
                }
                RolloutPolicy::Greedy(evaluator) => {
                    self.greedy_pick(&board, color, &moves, evaluator)?
                }
            };
            board = board.apply(mv, color)?;
            to_move = next_to_move(&board, color);
        }
        Ok(board.winner())
    }

    fn greedy_pick(
        &mut self,
        board: &Board,
        color: Color,
        moves: &[Coord],
        evaluator: Evaluator,
    ) -> Result<Coord, AiError> {
        let mut best: Vec<Coord> = Vec::with_capacity(moves.len());
        let mut best_score = f64::NEG_INFINITY;
        for &mv in moves {
            let score = evaluator.score(&board.apply(mv, color)?, color);
            if score > best_score {
                best_score = score;
                best.clear();
                best.push(mv);
            } else if score == best_score {
                best.push(mv);
            }
        }
        best.choose(&mut self.rng).copied().ok_or(AiError::NoLegalMoves)
    }
}

impl MoveSelector for MctsAgent {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Montecarlo
    }

    fn select_move(
        &mut self,
        board: &Board,
        color: Color,
        legal: &[Coord],
    ) -> Result<AiSelection, AiError> {
        ensure_moves(legal)?;
        let started = Instant::now();
        let deadline = self.time_limit.map(|limit| started + limit);
        let max_iterations = if self.iterations == 0 {
            u64::MAX
        } else {
            self.iterations as u64
        };

        let mut tree = Tree::new(*board, color, legal);
        let mut completed = 0u64;
        let mut max_depth = 0u8;
        while completed < max_iterations {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }
            let can_grow = tree.nodes.len() < self.node_cap;
            let mut leaf = tree.select(self.exploration, can_grow);
            if can_grow && !tree.nodes[leaf].untried.is_empty() {
                leaf = tree.expand(leaf, &mut self.rng)?;
            }
            max_depth = max_depth.max(tree.nodes[leaf].depth);
            let (start, to_move) = (tree.nodes[leaf].board, tree.nodes[leaf].to_move);
            let winner = self.rollout(start, to_move)?;
            tree.backpropagate(leaf, winner);
            completed += 1;
        }

        let root = &tree.nodes[0];
        let mut best: Option<(Coord, u32)> = None;
        for &child in &root.children {
            let node = &tree.nodes[child];
            if let Some(mv) = node.mv {
                if best.map_or(true, |(_, visits)| node.visits > visits) {
                    best = Some((mv, node.visits));
                }
            }
        }

        let (mv, source) = match best {
            Some((mv, _)) => (mv, AiMoveSource::Search),
            None => {
                let mv = *legal.choose(&mut self.rng).ok_or(AiError::NoLegalMoves)?;
                (mv, AiMoveSource::Fallback)
            }
        };
        debug!(
            color = %color,
            mv = ?mv,
            iterations = completed,
            tree_nodes = tree.nodes.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "montecarlo decision"
        );
        Ok(AiSelection {
            mv,
            meta: AiMoveMeta {
                algorithm: Algorithm::Montecarlo,
                depth_reached: max_depth,
                nodes: completed,
                time_us: elapsed_us(started),
                memory_bytes: tree.memory_bytes(),
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn agent(policy: RolloutPolicy, iterations: u32, time_limit: f64, seed: u64) -> MctsAgent {
        MctsAgent::new(
            policy,
            &MonteCarloParams {
                iterations,
                time_limit,
                ..MonteCarloParams::default()
            },
            StdRng::seed_from_u64(seed),
        )
    }

    #[test]
    fn respects_wall_clock_budget() {
        let board = Board::initial();
        let legal = board.legal_moves(Color::Black);
        for policy in [RolloutPolicy::Random, RolloutPolicy::Greedy(Evaluator::Hybrid)] {
            let mut mcts = agent(policy, 0, 0.05, 3);
            let started = Instant::now();
            let selection = mcts.select_move(&board, Color::Black, &legal).unwrap();
            assert!(
                started.elapsed() < Duration::from_millis(150),
                "{policy:?} overran: {:?}",
                started.elapsed()
            );
            assert!(legal.contains(&selection.mv));
        }
    }

    fn dense_midgame() -> (Board, Color) {
        let mut state = engine::GameState::new();
        while state.history().len() < 30 {
            let moves = state.legal_moves();
            let mv = moves[moves.len() / 2];
            state.play(state.turn(), mv).unwrap();
        }
        assert!(!state.is_finished());
        (*state.board(), state.turn())
    }

    #[test]
    fn respects_wall_clock_budget_in_the_midgame() {
        let (board, color) = dense_midgame();
        let legal = board.legal_moves(color);
        for policy in [RolloutPolicy::Random, RolloutPolicy::Greedy(Evaluator::Hybrid)] {
            let mut mcts = agent(policy, 0, 0.05, 4);
            let started = Instant::now();
            let selection = mcts.select_move(&board, color, &legal).unwrap();
            assert!(
                started.elapsed() < Duration::from_millis(150),
                "{policy:?} overran: {:?}",
                started.elapsed()
            );
            assert!(legal.contains(&selection.mv));
        }
    }

    #[test]
    fn node_cap_bounds_tree_memory() {
        let board = Board::initial();
        let legal = board.legal_moves(Color::Black);
        let uncapped = agent(RolloutPolicy::Random, 500, 0.0, 6)
            .select_move(&board, Color::Black, &legal)
            .unwrap();
        let capped = agent(RolloutPolicy::Random, 500, 0.0, 6)
            .with_node_cap(10)
            .select_move(&board, Color::Black, &legal)
            .unwrap();
        assert_eq!(capped.meta.nodes, 500);
        assert!(legal.contains(&capped.mv));
        let ceiling = 16 * (std::mem::size_of::<Node>() + 32 * 8 + 32 * 2) as u64;
        assert!(capped.meta.memory_bytes <= ceiling);
        assert!(capped.meta.memory_bytes < uncapped.meta.memory_bytes);
    }

    #[test]
    fn iteration_cap_is_exact() {
        let board = Board::initial();
        let legal = board.legal_moves(Color::Black);
        let mut mcts = agent(RolloutPolicy::Random, 200, 0.0, 11);
        let selection = mcts.select_move(&board, Color::Black, &legal).unwrap();
        assert_eq!(selection.meta.nodes, 200);
        assert_eq!(selection.meta.source, AiMoveSource::Search);
        assert!(selection.meta.memory_bytes > 0);
    }

    #[test]
    fn seeded_search_is_reproducible() {
        let board = Board::initial().apply((2, 3), Color::Black).unwrap();
        let legal = board.legal_moves(Color::White);
        let a = agent(RolloutPolicy::Random, 300, 0.0, 99)
            .select_move(&board, Color::White, &legal)
            .unwrap();
        let b = agent(RolloutPolicy::Random, 300, 0.0, 99)
            .select_move(&board, Color::White, &legal)
            .unwrap();
        assert_eq!(a.mv, b.mv);
    }

    #[test]
    fn prefers_the_forced_win_over_the_draw() {
        // b4 leaves white without a reply and c1 then wins 6-0; c1 first lets white draw with e4.
        let board: Board = "
            BW......
            ........
            ........
            ..WB....
            ........
            ........
            ........
            ........"
            .parse()
            .unwrap();
        let legal = board.legal_moves(Color::Black);
        assert_eq!(legal, vec![(0, 2), (3, 1)]);
        let mut mcts = agent(RolloutPolicy::Random, 200, 0.0, 5);
        let selection = mcts.select_move(&board, Color::Black, &legal).unwrap();
        assert_eq!(selection.mv, (3, 1));
    }

    #[test]
    fn visit_counts_add_up_at_the_root() {
        let board = Board::initial();
        let legal = board.legal_moves(Color::Black);
        let mut tree = Tree::new(board, Color::Black, &legal);
        let mut rng = StdRng::seed_from_u64(8);
        for _ in 0..40 {
            let mut leaf = tree.select(std::f64::consts::SQRT_2, true);
            if !tree.nodes[leaf].untried.is_empty() {
                leaf = tree.expand(leaf, &mut rng).unwrap();
            }
            tree.backpropagate(leaf, Winner::Draw);
        }
        let root = &tree.nodes[0];
        let child_visits: u32 = root.children.iter().map(|&c| tree.nodes[c].visits).sum();
        assert_eq!(root.visits, 40);
        assert_eq!(child_visits, 40);
        assert_eq!(root.children.len(), legal.len());
    }

    #[test]
    fn rollout_tags_map_to_policies() {
        assert_eq!(
            RolloutPolicy::from_heuristic(Heuristic::RandomRollout).unwrap(),
            RolloutPolicy::Random
        );
        assert_eq!(
            RolloutPolicy::from_heuristic(Heuristic::GreedyRollout).unwrap(),
            RolloutPolicy::Greedy(Evaluator::StaticWeights)
        );
        assert_eq!(
            RolloutPolicy::from_heuristic(Heuristic::MobilityBased).unwrap(),
            RolloutPolicy::Greedy(Evaluator::Mobility)
        );
        assert!(RolloutPolicy::from_heuristic(Heuristic::None).is_err());
    }
}
