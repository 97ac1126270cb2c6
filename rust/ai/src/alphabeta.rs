//! Fixed-depth minimax with alpha-beta pruning, scored from the root mover's side.

use crate::config::AlphaBetaParams;
use crate::heuristics::{terminal_score, Evaluator};
use crate::{elapsed_us, ensure_moves, AiError, AiMoveMeta, AiMoveSource, AiSelection, Algorithm};
use crate::MoveSelector;
use engine::{Board, Color, Coord};
use std::cmp::Ordering;
use std::time::{Duration, Instant};
use tracing::debug;

// Deadline is polled every this many nodes.
const TIME_CHECK_INTERVAL: u64 = 256;

pub struct AlphaBetaAgent {
    evaluator: Evaluator,
    depth: u8,
    use_sorting: bool,
    time_limit: Option<Duration>,
}

#[derive(Debug, Default)]
struct SearchStats {
    nodes: u64,
    live_boards: u64,
    peak_boards: u64,
}

struct SearchContext {
    me: Color,
    evaluator: Evaluator,
    use_sorting: bool,
    deadline: Option<Instant>,
    stats: SearchStats,
}

impl SearchContext {
    fn timeout(&self) -> bool {
        match self.deadline {
            Some(deadline) => Instant::now() >= deadline,
            None => false,
        }
    }

    fn evaluate(&self, board: &Board) -> f64 {
        self.evaluator.score(board, self.me)
    }

    /// Successors of `board` for `side`, best-first for that side when sorting is on.
    fn children(
        &mut self,
        board: &Board,
        side: Color,
        moves: &[Coord],
    ) -> Result<Vec<Board>, AiError> {
        let mut scored = Vec::with_capacity(moves.len());
        for &mv in moves {
            let child = board.apply(mv, side)?;
            let score = if self.use_sorting {
                self.evaluate(&child)
            } else {
                0.0
            };
            scored.push((score, child));
        }
        if self.use_sorting {
            let maximizing = side == self.me;
            // Stable: equal scores keep generation order.
            scored.sort_by(|a, b| {
                let ord = a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal);
                if maximizing {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        self.stats.live_boards += scored.len() as u64;
        self.stats.peak_boards = self.stats.peak_boards.max(self.stats.live_boards);
        Ok(scored.into_iter().map(|(_, child)| child).collect())
    }

    fn minimax(
        &mut self,
        board: &Board,
        depth: u8,
        mut alpha: f64,
        mut beta: f64,
        maximizing: bool,
    ) -> Result<f64, AiError> {
        self.stats.nodes += 1;
        if self.stats.nodes % TIME_CHECK_INTERVAL == 0 && self.timeout() {
            return Err(AiError::SearchAborted);
        }

        let side = if maximizing { self.me } else { self.me.opponent() };
        let moves = board.legal_moves(side);
        if moves.is_empty() {
            if !board.has_legal_move(side.opponent()) {
                return Ok(terminal_score(board, self.me));
            }
            if depth == 0 {
                return Ok(self.evaluate(board));
            }
            // Forced pass: same position, other side, one ply spent.
            return self.minimax(board, depth - 1, alpha, beta, !maximizing);
        }
        if depth == 0 {
            return Ok(self.evaluate(board));
        }

        let children = self.children(board, side, &moves)?;
        let count = children.len() as u64;
        let result = if maximizing {
            let mut best = f64::NEG_INFINITY;
            for child in &children {
                let value = self.minimax(child, depth - 1, alpha, beta, false)?;
                best = best.max(value);
                alpha = alpha.max(value);
                if beta <= alpha {
                    break;
                }
            }
            best
        } else {
            let mut best = f64::INFINITY;
            for child in &children {
                let value = self.minimax(child, depth - 1, alpha, beta, true)?;
                best = best.min(value);
                beta = beta.min(value);
                if beta <= alpha {
                    break;
                }
            }
            best
        };
        self.stats.live_boards -= count;
        Ok(result)
    }

    /// Root moves are searched in the given order; the first strictly better score wins.
    fn root_search(
        &mut self,
        board: &Board,
        legal: &[Coord],
        depth: u8,
    ) -> Result<(Coord, f64), AiError> {
        let mut best_move = legal[0];
        let mut best_score = f64::NEG_INFINITY;
        let mut alpha = f64::NEG_INFINITY;
        for &mv in legal {
            let child = board.apply(mv, self.me)?;
            let score = self.minimax(&child, depth - 1, alpha, f64::INFINITY, false)?;
            if score > best_score {
                best_score = score;
                best_move = mv;
            }
            alpha = alpha.max(score);
        }
        Ok((best_move, best_score))
    }
}

impl AlphaBetaAgent {
    pub fn new(evaluator: Evaluator, params: &AlphaBetaParams) -> Self {
        Self {
            evaluator,
            depth: params.depth.max(1),
            use_sorting: params.use_sorting,
            time_limit: params.time_limit_ms.map(Duration::from_millis),
        }
    }
}

impl MoveSelector for AlphaBetaAgent {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Alphabeta
    }

    fn select_move(
        &mut self,
        board: &Board,
        color: Color,
        legal: &[Coord],
    ) -> Result<AiSelection, AiError> {
        ensure_moves(legal)?;
        let started = Instant::now();
        let mut ctx = SearchContext {
            me: color,
            evaluator: self.evaluator,
            use_sorting: self.use_sorting,
            deadline: self.time_limit.map(|limit| started + limit),
            stats: SearchStats::default(),
        };

        let mut best: Option<(Coord, f64)> = None;
        let mut depth_reached = 0u8;
        if legal.len() == 1 {
            best = Some((legal[0], 0.0));
        } else if ctx.deadline.is_none() {
            best = Some(ctx.root_search(board, legal, self.depth)?);
            depth_reached = self.depth;
        } else {
            for depth in 1..=self.depth {
                if ctx.timeout() {
                    break;
                }
                match ctx.root_search(board, legal, depth) {
                    Ok(found) => {
                        best = Some(found);
                        depth_reached = depth;
                    }
                    Err(AiError::SearchAborted) => break,
                    Err(err) => return Err(err),
                }
                ctx.stats.live_boards = 0;
            }
        }

        let (mv, source, score) = match best {
            Some((mv, score)) => (mv, AiMoveSource::Search, score),
            None => (legal[0], AiMoveSource::Fallback, 0.0),
        };
        let memory_bytes = ctx.stats.peak_boards * std::mem::size_of::<(f64, Board)>() as u64;
        debug!(
            color = %color,
            mv = ?mv,
            score,
            depth = depth_reached,
            nodes = ctx.stats.nodes,
            "alphabeta decision"
        );
        Ok(AiSelection {
            mv,
            meta: AiMoveMeta {
                algorithm: Algorithm::Alphabeta,
                depth_reached,
                nodes: ctx.stats.nodes,
                time_us: elapsed_us(started),
                memory_bytes,
                source,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent(evaluator: Evaluator, depth: u8) -> AlphaBetaAgent {
        AlphaBetaAgent::new(
            evaluator,
            &AlphaBetaParams {
                depth,
                ..AlphaBetaParams::default()
            },
        )
    }

    fn midgame() -> Board {
        "
        ........
        ........
        ..WB....
        ..BWB...
        ..BBWW..
        ...W....
        ........
        ........"
            .parse()
            .unwrap()
    }

    #[test]
    fn repeated_searches_pick_the_same_move() {
        let board = midgame();
        let legal = board.legal_moves(Color::White);
        let mut ab = agent(Evaluator::Hybrid, 4);
        let first = ab.select_move(&board, Color::White, &legal).unwrap();
        for _ in 0..3 {
            let again = ab.select_move(&board, Color::White, &legal).unwrap();
            assert_eq!(again.mv, first.mv);
            assert_eq!(again.meta.nodes, first.meta.nodes);
        }
        assert_eq!(first.meta.depth_reached, 4);
        assert_eq!(first.meta.source, AiMoveSource::Search);
    }

    #[test]
    fn takes_the_corner_when_offered() {
        let board: Board = "
            .WWWWWB.
            ........
            ........
            ........
            ........
            ........
            ........
            ........"
            .parse()
            .unwrap();
        let legal = board.legal_moves(Color::Black);
        assert!(legal.contains(&(0, 0)));
        let mut ab = agent(Evaluator::StaticWeights, 1);
        let selection = ab.select_move(&board, Color::Black, &legal).unwrap();
        assert_eq!(selection.mv, (0, 0));
    }

    #[test]
    fn sorting_does_not_change_the_minimax_value() {
        let board = midgame();
        let legal = board.legal_moves(Color::White);
        let mut sorted = SearchContext {
            me: Color::White,
            evaluator: Evaluator::StaticWeights,
            use_sorting: true,
            deadline: None,
            stats: SearchStats::default(),
        };
        let mut plain = SearchContext {
            me: Color::White,
            evaluator: Evaluator::StaticWeights,
            use_sorting: false,
            deadline: None,
            stats: SearchStats::default(),
        };
        let (_, a) = sorted.root_search(&board, &legal, 3).unwrap();
        let (_, b) = plain.root_search(&board, &legal, 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn forced_pass_is_searched_not_scored_as_loss() {
        // White has no reply after black's capture, so black moves twice in a row.
        let board: Board = "
            BW......
            ........
            BW......
            ........
            ........
            ........
            ........
            ........"
            .parse()
            .unwrap();
        let legal = board.legal_moves(Color::Black);
        let mut ab = agent(Evaluator::StaticWeights, 3);
        let selection = ab.select_move(&board, Color::Black, &legal).unwrap();
        assert!(legal.contains(&selection.mv));
        let mut ctx = SearchContext {
            me: Color::Black,
            evaluator: Evaluator::StaticWeights,
            use_sorting: true,
            deadline: None,
            stats: SearchStats::default(),
        };
        let (_, score) = ctx.root_search(&board, &legal, 3).unwrap();
        assert!(score >= 10_000.0, "both captures wipe white out, got {score}");
    }

    #[test]
    fn time_limited_search_returns_a_completed_depth() {
        let board = midgame();
        let legal = board.legal_moves(Color::White);
        let mut ab = AlphaBetaAgent::new(
            Evaluator::Mobility,
            &AlphaBetaParams {
                depth: 8,
                use_sorting: true,
                time_limit_ms: Some(30),
            },
        );
        let started = Instant::now();
        let selection = ab.select_move(&board, Color::White, &legal).unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
        assert!(legal.contains(&selection.mv));
        assert!(selection.meta.depth_reached >= 1);
    }

    #[test]
    fn single_legal_move_is_returned_immediately() {
        let board: Board = "
            BW......
            ........
            ........
            ........
            ........
            ........
            ........
            .......B"
            .parse()
            .unwrap();
        let legal = board.legal_moves(Color::Black);
        assert_eq!(legal, vec![(0, 2)]);
        let mut ab = agent(Evaluator::Hybrid, 6);
        let selection = ab.select_move(&board, Color::Black, &legal).unwrap();
        assert_eq!(selection.mv, (0, 2));
    }
}
