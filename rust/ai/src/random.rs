use crate::{elapsed_us, ensure_moves, AiError, AiMoveMeta, AiMoveSource, AiSelection, Algorithm};
use crate::MoveSelector;
use engine::{Board, Color, Coord};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::time::Instant;

/// Uniform choice over the legal moves.
pub struct RandomAgent {
    rng: StdRng,
}

impl RandomAgent {
    pub fn new(rng: StdRng) -> Self {
        Self { rng }
    }
}

impl MoveSelector for RandomAgent {
    fn algorithm(&self) -> Algorithm {
        Algorithm::Random
    }

    fn select_move(
        &mut self,
        _board: &Board,
        _color: Color,
        legal: &[Coord],
    ) -> Result<AiSelection, AiError> {
        ensure_moves(legal)?;
        let started = Instant::now();
        let mv = *legal.choose(&mut self.rng).ok_or(AiError::NoLegalMoves)?;
        Ok(AiSelection {
            mv,
            meta: AiMoveMeta {
                algorithm: Algorithm::Random,
                depth_reached: 0,
                nodes: legal.len() as u64,
                time_us: elapsed_us(started),
                memory_bytes: std::mem::size_of_val(legal) as u64,
                source: AiMoveSource::Random,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    #[test]
    fn same_seed_same_sequence() {
        let board = Board::initial();
        let legal = board.legal_moves(Color::Black);
        let mut a = RandomAgent::new(StdRng::seed_from_u64(42));
        let mut b = RandomAgent::new(StdRng::seed_from_u64(42));
        for _ in 0..16 {
            let ma = a.select_move(&board, Color::Black, &legal).unwrap().mv;
            let mb = b.select_move(&board, Color::Black, &legal).unwrap().mv;
            assert_eq!(ma, mb);
        }
    }

    #[test]
    fn covers_every_legal_move() {
        let board = Board::initial();
        let legal = board.legal_moves(Color::Black);
        let mut agent = RandomAgent::new(StdRng::seed_from_u64(1));
        let seen: HashSet<Coord> = (0..200)
            .map(|_| agent.select_move(&board, Color::Black, &legal).unwrap().mv)
            .collect();
        assert_eq!(seen.len(), legal.len());
    }
}
