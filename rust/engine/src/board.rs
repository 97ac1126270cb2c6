//! Bitboard position: one occupancy mask per color, bit `row * 8 + col`.

use crate::{coord_in_bounds, index_to_coord, square_index, Color, Coord, EngineError, Winner};
use crate::{BOARD_SIZE, CELLS};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const DIRECTIONS: [(i8, i8); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

// Squares along each of the eight rays from every cell, nearest first.
static RAYS: Lazy<Vec<[Vec<u8>; 8]>> = Lazy::new(|| {
    (0..CELLS)
        .map(|idx| {
            let (row, col) = index_to_coord(idx);
            std::array::from_fn(|dir| {
                let (dr, dc) = DIRECTIONS[dir];
                let mut ray = Vec::new();
                let mut r = row as i8 + dr;
                let mut c = col as i8 + dc;
                while (0..BOARD_SIZE as i8).contains(&r) && (0..BOARD_SIZE as i8).contains(&c) {
                    ray.push((r as u8) * BOARD_SIZE + c as u8);
                    r += dr;
                    c += dc;
                }
                ray
            })
        })
        .collect()
});

/// Wire form of a board: 0 = empty, 1 = black, 2 = white.
pub type BoardMatrix = [[u8; 8]; 8];

#[inline]
fn bit(idx: usize) -> u64 {
    1u64 << idx
}

fn mask_to_coords(mut mask: u64) -> Vec<Coord> {
    let mut out = Vec::with_capacity(mask.count_ones() as usize);
    while mask != 0 {
        let idx = mask.trailing_zeros() as usize;
        out.push(index_to_coord(idx));
        mask &= mask - 1;
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "BoardMatrix", try_from = "BoardMatrix")]
pub struct Board {
    black: u64,
    white: u64,
}

impl Default for Board {
    fn default() -> Self {
        Self::initial()
    }
}

impl Board {
    pub const fn empty() -> Self {
        Self { black: 0, white: 0 }
    }

    /// Standard start: white on d4/e5, black on e4/d5.
    pub fn initial() -> Self {
        let mut board = Self::empty();
        board.place((3, 3), Color::White);
        board.place((4, 4), Color::White);
        board.place((3, 4), Color::Black);
        board.place((4, 3), Color::Black);
        board
    }

    pub fn from_matrix(matrix: &BoardMatrix) -> Result<Self, EngineError> {
        let mut board = Self::empty();
        for (row, cells) in matrix.iter().enumerate() {
            for (col, &code) in cells.iter().enumerate() {
                let coord = (row as u8, col as u8);
                match code {
                    0 => {}
                    _ => {
                        let color = Color::from_code(code).ok_or_else(|| {
                            EngineError::InvalidBoard(format!(
                                "cell [{row}, {col}] holds unknown value {code}"
                            ))
                        })?;
                        board.place(coord, color);
                    }
                }
            }
        }
        Ok(board)
    }

    pub fn to_matrix(&self) -> BoardMatrix {
        let mut matrix = [[0u8; 8]; 8];
        for (coord, cell) in self.cells() {
            if let Some(color) = cell {
                matrix[coord.0 as usize][coord.1 as usize] = color.code();
            }
        }
        matrix
    }

    fn place(&mut self, coord: Coord, color: Color) {
        let mask = bit(square_index(coord));
        match color {
            Color::Black => {
                self.black |= mask;
                self.white &= !mask;
            }
            Color::White => {
                self.white |= mask;
                self.black &= !mask;
            }
        }
    }

    fn sides(&self, color: Color) -> (u64, u64) {
        match color {
            Color::Black => (self.black, self.white),
            Color::White => (self.white, self.black),
        }
    }

    pub fn get(&self, coord: Coord) -> Option<Color> {
        if !coord_in_bounds(coord) {
            return None;
        }
        let mask = bit(square_index(coord));
        if self.black & mask != 0 {
            Some(Color::Black)
        } else if self.white & mask != 0 {
            Some(Color::White)
        } else {
            None
        }
    }

    /// Every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (Coord, Option<Color>)> + '_ {
        (0..CELLS).map(move |idx| {
            let coord = index_to_coord(idx);
            (coord, self.get(coord))
        })
    }

    pub fn discs(&self, color: Color) -> u64 {
        self.sides(color).0
    }

    pub fn count(&self, color: Color) -> u32 {
        self.discs(color).count_ones()
    }

    /// `(black, white)`.
    pub fn disc_counts(&self) -> (u32, u32) {
        (self.black.count_ones(), self.white.count_ones())
    }

    pub fn total_discs(&self) -> u32 {
        (self.black | self.white).count_ones()
    }

    pub fn empty_count(&self) -> u32 {
        CELLS as u32 - self.total_discs()
    }

    /// Opponent discs that a disc of `color` at `coord` would flip; zero means illegal.
    pub fn flips(&self, coord: Coord, color: Color) -> u64 {
        if !coord_in_bounds(coord) {
            return 0;
        }
        let idx = square_index(coord);
        if (self.black | self.white) & bit(idx) != 0 {
            return 0;
        }
        let (own, opp) = self.sides(color);
        let mut total = 0u64;
        for ray in RAYS[idx].iter() {
            let mut line = 0u64;
            for &sq in ray {
                let mask = bit(sq as usize);
                if opp & mask != 0 {
                    line |= mask;
                    continue;
                }
                if own & mask != 0 {
                    total |= line;
                }
                break;
            }
        }
        total
    }

    pub fn is_legal(&self, coord: Coord, color: Color) -> bool {
        self.flips(coord, color) != 0
    }

    fn legal_mask(&self, color: Color) -> u64 {
        let mut empties = !(self.black | self.white);
        let mut legal = 0u64;
        while empties != 0 {
            let idx = empties.trailing_zeros() as usize;
            empties &= empties - 1;
            if self.flips(index_to_coord(idx), color) != 0 {
                legal |= bit(idx);
            }
        }
        legal
    }

    /// Legal placements for `color`, row-major.
    pub fn legal_moves(&self, color: Color) -> Vec<Coord> {
        mask_to_coords(self.legal_mask(color))
    }

    pub fn legal_move_count(&self, color: Color) -> u32 {
        self.legal_mask(color).count_ones()
    }

    pub fn has_legal_move(&self, color: Color) -> bool {
        let mut empties = !(self.black | self.white);
        while empties != 0 {
            let idx = empties.trailing_zeros() as usize;
            empties &= empties - 1;
            if self.flips(index_to_coord(idx), color) != 0 {
                return true;
            }
        }
        false
    }

    /// Returns the successor position; `self` is left untouched.
    pub fn apply(&self, coord: Coord, color: Color) -> Result<Board, EngineError> {
        if !coord_in_bounds(coord) {
            return Err(EngineError::OutOfBounds(coord.0 as i64, coord.1 as i64));
        }
        let flips = self.flips(coord, color);
        if flips == 0 {
            return Err(EngineError::IllegalMove(coord));
        }
        let placed = bit(square_index(coord)) | flips;
        let next = match color {
            Color::Black => Board {
                black: self.black | placed,
                white: self.white & !flips,
            },
            Color::White => Board {
                white: self.white | placed,
                black: self.black & !flips,
            },
        };
        Ok(next)
    }

    /// Neither side can place a disc.
    pub fn is_terminal(&self) -> bool {
        !self.has_legal_move(Color::Black) && !self.has_legal_move(Color::White)
    }

    pub fn winner(&self) -> Winner {
        let (black, white) = self.disc_counts();
        Winner::from_counts(black, white)
    }

    pub fn check_invariants(&self) -> Result<(), EngineError> {
        if self.black & self.white != 0 {
            return Err(EngineError::Corrupt(format!(
                "overlapping discs {:#018x}",
                self.black & self.white
            )));
        }
        Ok(())
    }
}

impl From<Board> for BoardMatrix {
    fn from(board: Board) -> Self {
        board.to_matrix()
    }
}

impl TryFrom<BoardMatrix> for Board {
    type Error = EngineError;

    fn try_from(matrix: BoardMatrix) -> Result<Self, Self::Error> {
        Board::from_matrix(&matrix)
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 0..BOARD_SIZE {
            for col in 0..BOARD_SIZE {
                let ch = match self.get((row, col)) {
                    Some(Color::Black) => 'B',
                    Some(Color::White) => 'W',
                    None => '.',
                };
                write!(f, "{ch}")?;
            }
            if row + 1 < BOARD_SIZE {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Parses the `Display` form: eight rows of `B`, `W` or `.`; whitespace is ignored.
impl FromStr for Board {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let cells: Vec<char> = s.chars().filter(|c| !c.is_whitespace()).collect();
        if cells.len() != CELLS {
            return Err(EngineError::InvalidBoard(format!(
                "expected {CELLS} cells, found {}",
                cells.len()
            )));
        }
        let mut board = Board::empty();
        for (idx, ch) in cells.into_iter().enumerate() {
            let coord = index_to_coord(idx);
            match ch {
                'B' | 'b' => board.place(coord, Color::Black),
                'W' | 'w' => board.place(coord, Color::White),
                '.' => {}
                other => {
                    return Err(EngineError::InvalidBoard(format!(
                        "unexpected cell character {other:?}"
                    )))
                }
            }
        }
        Ok(board)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_has_four_centre_discs() {
        let board = Board::initial();
        assert_eq!(board.disc_counts(), (2, 2));
        assert_eq!(board.get((3, 3)), Some(Color::White));
        assert_eq!(board.get((4, 4)), Some(Color::White));
        assert_eq!(board.get((3, 4)), Some(Color::Black));
        assert_eq!(board.get((4, 3)), Some(Color::Black));
    }

    #[test]
    fn opening_moves_for_black_are_canonical() {
        let board = Board::initial();
        assert_eq!(
            board.legal_moves(Color::Black),
            vec![(2, 3), (3, 2), (4, 5), (5, 4)]
        );
        assert_eq!(board.legal_move_count(Color::White), 4);
    }

    #[test]
    fn every_legal_move_adds_one_and_flips_at_least_one() {
        let board = Board::initial();
        for mv in board.legal_moves(Color::Black) {
            let next = board.apply(mv, Color::Black).unwrap();
            assert_eq!(next.total_discs(), board.total_discs() + 1);
            assert!(next.count(Color::Black) >= board.count(Color::Black) + 2);
            assert_eq!(board.total_discs(), 4, "apply must not mutate the source");
        }
    }

    #[test]
    fn flips_in_several_directions_at_once() {
        let board: Board = "
            ........
            .B.B.B..
            ..WWW...
            .BW.WB..
            ..WWW...
            .B.B.B..
            ........
            ........"
            .parse()
            .unwrap();
        let next = board.apply((3, 3), Color::Black).unwrap();
        assert_eq!(next.count(Color::White), 0);
        assert_eq!(next.count(Color::Black), 8 + 8 + 1);
    }

    #[test]
    fn occupied_or_non_flanking_squares_are_illegal() {
        let board = Board::initial();
        assert_eq!(
            board.apply((3, 3), Color::Black),
            Err(EngineError::IllegalMove((3, 3)))
        );
        assert_eq!(
            board.apply((0, 0), Color::Black),
            Err(EngineError::IllegalMove((0, 0)))
        );
        assert_eq!(
            board.apply((8, 0), Color::Black),
            Err(EngineError::OutOfBounds(8, 0))
        );
    }

    #[test]
    fn ray_stops_at_board_edge_without_own_disc() {
        let board: Board = "
            BBBW....
            ........
            ........
            ........
            ........
            ........
            ........
            .......W"
            .parse()
            .unwrap();
        assert!(board.legal_moves(Color::White).is_empty());
        assert_eq!(board.legal_moves(Color::Black), vec![(0, 4)]);
    }

    #[test]
    fn matrix_roundtrip_and_serde_shape() {
        let board = Board::initial();
        let matrix = board.to_matrix();
        assert_eq!(matrix[3][3], 2);
        assert_eq!(matrix[3][4], 1);
        assert_eq!(Board::from_matrix(&matrix).unwrap(), board);

        let json = serde_json::to_value(board).unwrap();
        assert_eq!(json[4][3], 1);
        let back: Board = serde_json::from_value(json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn matrix_rejects_unknown_cell_values() {
        let mut matrix = [[0u8; 8]; 8];
        matrix[0][0] = 3;
        assert!(matches!(
            Board::from_matrix(&matrix),
            Err(EngineError::InvalidBoard(_))
        ));
    }

    #[test]
    fn display_parses_back() {
        let board = Board::initial()
            .apply((2, 3), Color::Black)
            .unwrap();
        let text = board.to_string();
        assert_eq!(text.parse::<Board>().unwrap(), board);
        assert!(board.check_invariants().is_ok());
    }

    #[test]
    fn terminal_when_nobody_can_move() {
        let board: Board = "
            B.......
            ........
            ........
            ........
            ........
            ........
            ........
            .......W"
            .parse()
            .unwrap();
        assert!(board.is_terminal());
        assert_eq!(board.winner(), Winner::Draw);
        assert!(!Board::initial().is_terminal());
    }
}
