//! Static board evaluators. Higher is better for the color asked about.

use engine::{Board, Color};

/// Corners are prized, the squares next to them (X and C squares) penalized.
pub const POSITION_WEIGHTS: [[i32; 8]; 8] = [
    [100, -20, 10, 5, 5, 10, -20, 100],
    [-20, -50, -2, -2, -2, -2, -50, -20],
    [10, -2, 5, 1, 1, 5, -2, 10],
    [5, -2, 1, 2, 2, 1, -2, 5],
    [5, -2, 1, 2, 2, 1, -2, 5],
    [10, -2, 5, 1, 1, 5, -2, 10],
    [-20, -50, -2, -2, -2, -2, -50, -20],
    [100, -20, 10, 5, 5, 10, -20, 100],
];

pub const HYBRID_STATIC_WEIGHT: f64 = 0.6;
pub const HYBRID_MOBILITY_WEIGHT: f64 = 0.4;
/// Brings one move of mobility onto roughly the scale of a quiet square.
pub const MOBILITY_SCALE: f64 = 10.0;

/// Won terminals must outrank every heuristic score.
pub const TERMINAL_SCORE: f64 = 10_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Evaluator {
    StaticWeights,
    Mobility,
    Hybrid,
}

impl Evaluator {
    pub fn score(self, board: &Board, color: Color) -> f64 {
        match self {
            Evaluator::StaticWeights => static_weights(board, color),
            Evaluator::Mobility => mobility(board, color),
            Evaluator::Hybrid => hybrid(board, color),
        }
    }
}

pub fn static_weights(board: &Board, color: Color) -> f64 {
    let mut score = 0i32;
    for ((row, col), cell) in board.cells() {
        let weight = POSITION_WEIGHTS[row as usize][col as usize];
        match cell {
            Some(c) if c == color => score += weight,
            Some(_) => score -= weight,
            None => {}
        }
    }
    score as f64
}

pub fn mobility(board: &Board, color: Color) -> f64 {
    board.legal_move_count(color) as f64 - board.legal_move_count(color.opponent()) as f64
}

pub fn hybrid(board: &Board, color: Color) -> f64 {
    HYBRID_STATIC_WEIGHT * static_weights(board, color)
        + HYBRID_MOBILITY_WEIGHT * MOBILITY_SCALE * mobility(board, color)
}

/// Final-position value: ±(10 000 + disc difference), 0 on a draw.
pub fn terminal_score(board: &Board, color: Color) -> f64 {
    let own = board.count(color) as f64;
    let opp = board.count(color.opponent()) as f64;
    if own > opp {
        TERMINAL_SCORE + (own - opp)
    } else if own < opp {
        -TERMINAL_SCORE - (opp - own)
    } else {
        0.0
    }
}
