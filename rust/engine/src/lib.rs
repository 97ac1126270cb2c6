//! Othello (Reversi) rules engine.
//! Shared by the AI strategies and the arena service for identical move logic.

mod board;
mod game;

pub use board::{Board, BoardMatrix};
pub use game::{GameState, GameStatus, MoveRecord, Winner};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub const BOARD_SIZE: u8 = 8;
pub const CELLS: usize = 64;
pub const FILES: &str = "abcdefgh";

pub type Coord = (u8, u8); // (row, col) zero-based

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    Black,
    White,
}

impl Color {
    pub fn opponent(self) -> Color {
        match self {
            Color::Black => Color::White,
            Color::White => Color::Black,
        }
    }

    /// Cell value used by the wire matrix: 1 = black, 2 = white.
    pub fn code(self) -> u8 {
        match self {
            Color::Black => 1,
            Color::White => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Color> {
        match code {
            1 => Some(Color::Black),
            2 => Some(Color::White),
            _ => None,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::Black => f.write_str("black"),
            Color::White => f.write_str("white"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid coordinate token: {0}")]
    InvalidCoord(String),
    #[error("out of bounds coordinate: [{0}, {1}]")]
    OutOfBounds(i64, i64),
    #[error("illegal move at {}", coord_to_notation(*.0))]
    IllegalMove(Coord),
    #[error("game already finished")]
    Finished,
    #[error("not {0}'s turn")]
    WrongTurn(Color),
    #[error("invalid board: {0}")]
    InvalidBoard(String),
    #[error("board invariant violated: {0}")]
    Corrupt(String),
}

pub fn coord_in_bounds(coord: Coord) -> bool {
    let (row, col) = coord;
    row < BOARD_SIZE && col < BOARD_SIZE
}

/// Validates an untrusted `[row, col]` pair coming over the wire.
pub fn coord_from_pair(row: i64, col: i64) -> Result<Coord, EngineError> {
    if !(0..BOARD_SIZE as i64).contains(&row) || !(0..BOARD_SIZE as i64).contains(&col) {
        return Err(EngineError::OutOfBounds(row, col));
    }
    Ok((row as u8, col as u8))
}

pub(crate) fn square_index(coord: Coord) -> usize {
    coord.0 as usize * BOARD_SIZE as usize + coord.1 as usize
}

pub(crate) fn index_to_coord(idx: usize) -> Coord {
    (
        (idx / BOARD_SIZE as usize) as u8,
        (idx % BOARD_SIZE as usize) as u8,
    )
}

/// `(2, 3)` -> `"d3"`: column letter, then 1-based row.
pub fn coord_to_notation(coord: Coord) -> String {
    let (row, col) = coord;
    let file_char = FILES
        .as_bytes()
        .get(col as usize)
        .map(|b| *b as char)
        .unwrap_or('?');
    format!("{file_char}{}", row as u32 + 1)
}

pub fn notation_to_coord(token: &str) -> Result<Coord, EngineError> {
    let mut chars = token.trim().chars();
    let file_char = chars
        .next()
        .ok_or_else(|| EngineError::InvalidCoord(token.to_string()))?
        .to_ascii_lowercase();
    let col = FILES
        .chars()
        .position(|c| c == file_char)
        .ok_or_else(|| EngineError::InvalidCoord(token.to_string()))?;
    let rank: i64 = chars
        .as_str()
        .parse()
        .map_err(|_| EngineError::InvalidCoord(token.to_string()))?;
    coord_from_pair(rank - 1, col as i64)
}

// --- Tests ---

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notation_roundtrip_on_corners() {
        assert_eq!(coord_to_notation((0, 0)), "a1");
        assert_eq!(coord_to_notation((2, 3)), "d3");
        assert_eq!(coord_to_notation((7, 7)), "h8");
        assert_eq!(notation_to_coord("D3").unwrap(), (2, 3));
        assert_eq!(notation_to_coord("h8").unwrap(), (7, 7));
    }

    #[test]
    fn notation_rejects_garbage() {
        assert!(matches!(
            notation_to_coord("z1"),
            Err(EngineError::InvalidCoord(_))
        ));
        assert!(matches!(
            notation_to_coord("a9"),
            Err(EngineError::OutOfBounds(8, 0))
        ));
        assert!(notation_to_coord("").is_err());
    }

    #[test]
    fn coord_from_pair_checks_bounds() {
        assert_eq!(coord_from_pair(7, 0).unwrap(), (7, 0));
        assert_eq!(
            coord_from_pair(-1, 3),
            Err(EngineError::OutOfBounds(-1, 3))
        );
        assert_eq!(coord_from_pair(2, 8), Err(EngineError::OutOfBounds(2, 8)));
    }

    #[test]
    fn color_codes_match_wire_format() {
        assert_eq!(Color::Black.code(), 1);
        assert_eq!(Color::White.code(), 2);
        assert_eq!(Color::from_code(2), Some(Color::White));
        assert_eq!(Color::from_code(0), None);
        assert_eq!(Color::Black.opponent(), Color::White);
    }

    #[test]
    fn illegal_move_message_uses_notation() {
        let err = EngineError::IllegalMove((2, 3));
        assert_eq!(err.to_string(), "illegal move at d3");
    }
}
