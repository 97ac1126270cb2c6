//! Game state machine: turn order, pass handling, termination.

use crate::{Board, Color, Coord, EngineError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Winner {
    Black,
    White,
    Draw,
}

impl Winner {
    /// Majority of discs wins; equal counts draw.
    pub fn from_counts(black: u32, white: u32) -> Self {
        match black.cmp(&white) {
            std::cmp::Ordering::Greater => Winner::Black,
            std::cmp::Ordering::Less => Winner::White,
            std::cmp::Ordering::Equal => Winner::Draw,
        }
    }

    pub fn color(self) -> Option<Color> {
        match self {
            Winner::Black => Some(Color::Black),
            Winner::White => Some(Color::White),
            Winner::Draw => None,
        }
    }

    /// 1 for a win, 0.5 for a draw, 0 for a loss.
    pub fn reward_for(self, color: Color) -> f64 {
        match self.color() {
            Some(c) if c == color => 1.0,
            Some(_) => 0.0,
            None => 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    InProgress,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    pub number: u32,
    pub color: Color,
    pub position: Coord,
    pub flipped: u32,
}

/// Whose turn it is is always a side with a legal move, unless the game is finished.
#[derive(Debug, Clone, Serialize)]
pub struct GameState {
    board: Board,
    turn: Color,
    status: GameStatus,
    winner: Option<Winner>,
    passes: u32,
    history: Vec<MoveRecord>,
    version: u64,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    pub fn new() -> Self {
        Self::from_position(Board::initial(), Color::Black)
    }

    /// Starts from an arbitrary position, applying forced passes or finishing immediately.
    pub fn from_position(board: Board, turn: Color) -> Self {
        let mut state = Self {
            board,
            turn,
            status: GameStatus::InProgress,
            winner: None,
            passes: 0,
            history: Vec::new(),
            version: 0,
        };
        state.settle();
        state
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    /// `(black, white)` disc counts.
    pub fn scores(&self) -> (u32, u32) {
        self.board.disc_counts()
    }

    pub fn passes(&self) -> u32 {
        self.passes
    }

    pub fn history(&self) -> &[MoveRecord] {
        &self.history
    }

    /// Bumped on every applied move.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn legal_moves(&self) -> Vec<Coord> {
        if self.is_finished() {
            return Vec::new();
        }
        self.board.legal_moves(self.turn)
    }

    pub fn play(&mut self, color: Color, coord: Coord) -> Result<MoveRecord, EngineError> {
        if self.is_finished() {
            return Err(EngineError::Finished);
        }
        if color != self.turn {
            return Err(EngineError::WrongTurn(color));
        }
        let next = self.board.apply(coord, color)?;
        let gained = next.count(color).saturating_sub(self.board.count(color));
        if next.total_discs() != self.board.total_discs() + 1 || gained < 2 {
            return Err(EngineError::Corrupt(format!(
                "move {coord:?} produced an inconsistent position"
            )));
        }
        next.check_invariants()?;

        let record = MoveRecord {
            number: self.history.len() as u32 + 1,
            color,
            position: coord,
            flipped: gained - 1,
        };
        self.board = next;
        self.history.push(record.clone());
        self.version += 1;
        self.turn = color.opponent();
        self.settle();
        Ok(record)
    }

    fn settle(&mut self) {
        if self.is_finished() || self.board.has_legal_move(self.turn) {
            return;
        }
        if self.board.has_legal_move(self.turn.opponent()) {
            self.passes += 1;
            self.turn = self.turn.opponent();
            return;
        }
        self.status = GameStatus::Finished;
        self.winner = Some(self.board.winner());
    }
}
