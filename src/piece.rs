//! Value types for colours, pieces, positions, moves, and game state.
//!
//! Pieces compare by id only; moves compare structurally; cloning a
//! `GameState` produces a deep, share-free copy — no shared handles survive
//! the clone.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::board;

/// The two sides. Red always moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colour {
    Red,
    Black,
}

impl Colour {
    pub fn opposite(self) -> Colour {
        match self {
            Colour::Red => Colour::Black,
            Colour::Black => Colour::Red,
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colour::Red => write!(f, "red"),
            Colour::Black => write!(f, "black"),
        }
    }
}

/// Whether a piece is an unpromoted Man or a promoted King.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PieceKind {
    Man,
    King,
}

/// A position on a board of a known size. Equality and ordering are only
/// meaningful between positions of the same `board_size`; comparing across
/// board sizes panics rather than silently returning a wrong answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Position {
    pub row: u8,
    pub col: u8,
    pub board_size: u8,
}

impl Position {
    pub fn new(row: u8, col: u8, board_size: u8) -> Self {
        debug_assert!(row < board_size && col < board_size, "position out of bounds");
        Self { row, col, board_size }
    }

    pub fn is_dark(self) -> bool {
        board::is_dark(self.row as i32, self.col as i32)
    }

    /// Offsets this position by `(drow, dcol)`, or `None` if the result
    /// falls off the board.
    pub fn offset(self, drow: i32, dcol: i32) -> Option<Position> {
        let r = self.row as i32 + drow;
        let c = self.col as i32 + dcol;
        if r < 0 || c < 0 || r >= self.board_size as i32 || c >= self.board_size as i32 {
            return None;
        }
        Some(Position::new(r as u8, c as u8, self.board_size))
    }

    fn assert_comparable(self, other: Position) {
        assert_eq!(
            self.board_size, other.board_size,
            "compared positions from different board sizes ({} vs {})",
            self.board_size, other.board_size
        );
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        self.assert_comparable(*other);
        self.row == other.row && self.col == other.col
    }
}

impl Eq for Position {}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

/// A piece on the board. Identity is the `id`, stable for the lifetime of
/// the game — pieces are never renumbered, and ids are never reused after
/// capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Piece {
    pub id: u32,
    pub colour: Colour,
    pub kind: PieceKind,
    pub position: Position,
}

impl PartialEq for Piece {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Piece {}

/// The kind of a move, mirroring the shape of capture sequences a player
/// may submit or receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    Simple,
    Capture,
    MultiCapture,
}

/// A fully self-describing move: replaying it against an earlier state
/// never needs to consult the rule engine again. `captured` and `promoted`
/// are authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Move {
    pub mover: u32,
    pub from: Position,
    pub to: Position,
    pub kind: MoveKind,
    pub captured: Vec<u32>,
    pub promoted: bool,
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {} -> {}", self.kind, self.from, self.to)
    }
}

/// Whether the game has concluded, and for whom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    InProgress,
    RedWins,
    BlackWins,
    Draw,
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameStatus::InProgress => write!(f, "in_progress"),
            GameStatus::RedWins => write!(f, "red_wins"),
            GameStatus::BlackWins => write!(f, "black_wins"),
            GameStatus::Draw => write!(f, "draw"),
        }
    }
}

/// Why a game ended. Despite the name, not every variant is a draw —
/// `Resignation`/`Timeout`/`OpponentTimeout` end the game with a winner;
/// the controller reports them through the same field because the wire
/// protocol's `reason` value is independent of its `result` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawReason {
    Stalemate,
    MoveLimitWithoutProgress,
    InsufficientMaterial,
    Repetition,
    Agreement,
    Timeout,
    Inactivity,
    Resignation,
    OpponentTimeout,
}

impl fmt::Display for DrawReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrawReason::Stalemate => write!(f, "game_over"),
            DrawReason::MoveLimitWithoutProgress => write!(f, "game_over"),
            DrawReason::InsufficientMaterial => write!(f, "game_over"),
            DrawReason::Repetition => write!(f, "game_over"),
            DrawReason::Agreement => write!(f, "agreement"),
            DrawReason::Timeout => write!(f, "timeout"),
            DrawReason::Inactivity => write!(f, "inactivity"),
            DrawReason::Resignation => write!(f, "resignation"),
            DrawReason::OpponentTimeout => write!(f, "opponent_timeout"),
        }
    }
}

/// The complete, share-free state of a game at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    pub pieces: Vec<Piece>,
    pub active: Colour,
    pub move_count: u32,
    pub last_move: Option<Move>,
    pub status: GameStatus,
    pub draw_reason: Option<DrawReason>,
    pub board_size: u8,
}

impl GameState {
    pub fn piece(&self, id: u32) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.id == id)
    }

    pub fn piece_at(&self, pos: Position) -> Option<&Piece> {
        self.pieces.iter().find(|p| p.position == pos)
    }

    pub fn pieces_of(&self, colour: Colour) -> impl Iterator<Item = &Piece> {
        self.pieces.iter().filter(move |p| p.colour == colour)
    }

    /// A stable hash of the dark-square piece distribution plus the active
    /// colour. Equal for any two states with the same distribution and
    /// active side; unequal otherwise with overwhelming probability.
    pub fn board_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut pieces: Vec<_> = self
            .pieces
            .iter()
            .map(|p| (p.position.row, p.position.col, p.colour, p.kind))
            .collect();
        pieces.sort_unstable_by_key(|(r, c, _, _)| (*r, *c));

        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.active.hash(&mut hasher);
        for entry in pieces {
            entry.hash(&mut hasher);
        }
        hasher.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pieces_compare_by_id_only() {
        let a = Piece {
            id: 1,
            colour: Colour::Red,
            kind: PieceKind::Man,
            position: Position::new(0, 1, 8),
        };
        let mut b = a;
        b.position = Position::new(2, 3, 8);
        assert_eq!(a, b);
    }

    #[test]
    #[should_panic]
    fn positions_from_different_boards_fail_loudly() {
        let a = Position::new(0, 1, 8);
        let b = Position::new(0, 1, 10);
        let _ = a == b;
    }

    #[test]
    fn board_hash_ignores_piece_order() {
        let p1 = Piece { id: 1, colour: Colour::Red, kind: PieceKind::Man, position: Position::new(0, 1, 8) };
        let p2 = Piece { id: 2, colour: Colour::Black, kind: PieceKind::Man, position: Position::new(7, 0, 8) };
        let s1 = GameState {
            pieces: vec![p1, p2],
            active: Colour::Red,
            move_count: 0,
            last_move: None,
            status: GameStatus::InProgress,
            draw_reason: None,
            board_size: 8,
        };
        let mut s2 = s1.clone();
        s2.pieces.reverse();
        assert_eq!(s1.board_hash(), s2.board_hash());
    }
}
