//! The sixteen named rule variants, each an immutable parameter record.
//!
//! Per the architecture's core decision, variant-specific behaviour is
//! never a class hierarchy: every quirk that doesn't fit a parameter is an
//! explicit branch keyed on `VariantId` inside [`crate::rules`]. This
//! module only owns the parameter values themselves.

use sha2::{Digest, Sha256};

use crate::board;
use crate::piece::{Colour, GameState, Piece, PieceKind, Position};

/// Tie-break applied when more than one capture sequence is available and
/// the variant mandates capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePriority {
    Free,
    MaximumCount,
    MaximumSequence,
}

/// One of the sixteen supported rule systems. Turkish, Thai, and Frisian
/// are included in diagonal-only approximation — their perpendicular and
/// orthogonal capture extensions are explicitly out of scope (see
/// `DESIGN.md`), matching the open question this registry inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantId {
    International,
    Brazilian,
    Italian,
    Spanish,
    Czech,
    Russian,
    American,
    PoolCheckers,
    Canadian,
    Armenian,
    Ghanaian,
    Malaysian,
    Frisian,
    Turkish,
    Thai,
    Portuguese,
}

impl VariantId {
    pub const ALL: [VariantId; 16] = [
        VariantId::International,
        VariantId::Brazilian,
        VariantId::Italian,
        VariantId::Spanish,
        VariantId::Czech,
        VariantId::Russian,
        VariantId::American,
        VariantId::PoolCheckers,
        VariantId::Canadian,
        VariantId::Armenian,
        VariantId::Ghanaian,
        VariantId::Malaysian,
        VariantId::Frisian,
        VariantId::Turkish,
        VariantId::Thai,
        VariantId::Portuguese,
    ];

    pub fn canonical_name(self) -> &'static str {
        match self {
            VariantId::International => "international",
            VariantId::Brazilian => "brazilian",
            VariantId::Italian => "italian",
            VariantId::Spanish => "spanish",
            VariantId::Czech => "czech",
            VariantId::Russian => "russian",
            VariantId::American => "american",
            VariantId::PoolCheckers => "pool_checkers",
            VariantId::Canadian => "canadian",
            VariantId::Armenian => "armenian",
            VariantId::Ghanaian => "ghanaian",
            VariantId::Malaysian => "malaysian",
            VariantId::Frisian => "frisian",
            VariantId::Turkish => "turkish",
            VariantId::Thai => "thai",
            VariantId::Portuguese => "portuguese",
        }
    }

    pub fn from_name(name: &str) -> Option<VariantId> {
        VariantId::ALL.into_iter().find(|v| v.canonical_name() == name)
    }
}

/// An immutable, process-wide parameter record for one rule system.
#[derive(Debug, Clone, Copy)]
pub struct Variant {
    pub id: VariantId,
    pub display_name: &'static str,
    pub board_size: u8,
    pub men_may_capture_backward: bool,
    pub kings_fly: bool,
    pub mandatory_capture: bool,
    pub capture_priority: CapturePriority,
    pub repetition_draw_enabled: bool,
    /// `[GameType NN]` header value for the notation codec. This
    /// implementation defines its own internally-consistent registry; see
    /// `DESIGN.md` for the rationale.
    pub gametype: u8,
    /// Sixteen-byte identity fingerprint, derived from `canonical_name`.
    pub fingerprint: [u8; 16],
}

impl Variant {
    /// The row on which a Man of `colour` promotes to King.
    pub fn promotion_row(&self, colour: Colour) -> u8 {
        board::promotion_row(colour, self.board_size)
    }

    /// The initial set of pieces for this variant: three full rows of Men
    /// per side on dark squares, separated by two empty rows — the layout
    /// shared by every variant in this registry.
    pub fn starting_layout(&self) -> Vec<Piece> {
        let n = self.board_size;
        let rows_per_side = (n as usize - 2) / 2;
        let mut pieces = Vec::new();
        let mut next_id = 1u32;

        for row in 0..n {
            for col in 0..n {
                if !board::is_dark(row as i32, col as i32) {
                    continue;
                }
                let colour = if (row as usize) < rows_per_side {
                    Some(Colour::Black)
                } else if (row as usize) >= n as usize - rows_per_side {
                    Some(Colour::Red)
                } else {
                    None
                };
                if let Some(colour) = colour {
                    pieces.push(Piece {
                        id: next_id,
                        colour,
                        kind: PieceKind::Man,
                        position: Position::new(row, col, n),
                    });
                    next_id += 1;
                }
            }
        }
        pieces
    }

    /// The no-capture, no-Man-advance ply threshold past which the game is
    /// drawn, halved once only kings remain on the board for variants that
    /// specify that halving.
    pub fn move_limit_without_progress(&self, state: &GameState) -> u32 {
        let only_kings = state.pieces.iter().all(|p| p.kind == PieceKind::King);
        let (default, halved) = match self.id {
            VariantId::Russian => (30, 15),
            VariantId::American => (40, 40),
            _ => (50, 25),
        };
        if only_kings { halved } else { default }
    }
}

fn fingerprint_of(name: &str) -> [u8; 16] {
    let digest = Sha256::digest(name.as_bytes());
    let mut out = [0u8; 16];
    out.copy_from_slice(&digest[..16]);
    out
}

/// Looks up the immutable parameter record for a variant. The registry is
/// plain data computed from a `match`; there is no static initialisation
/// order to worry about.
pub fn variant_by_id(id: VariantId) -> Variant {
    let (display_name, board_size, backward, flying, mandatory, priority, repetition, gametype): (
        &'static str,
        u8,
        bool,
        bool,
        bool,
        CapturePriority,
        bool,
        u8,
    ) = match id {
        VariantId::International => ("International", 10, true, true, true, CapturePriority::MaximumCount, true, 20),
        VariantId::Brazilian => ("Brazilian", 8, true, true, true, CapturePriority::MaximumCount, true, 25),
        VariantId::Italian => ("Italian", 8, false, false, true, CapturePriority::MaximumSequence, true, 22),
        VariantId::Spanish => ("Spanish", 8, true, true, true, CapturePriority::MaximumCount, true, 40),
        VariantId::Czech => ("Czech", 8, true, true, true, CapturePriority::MaximumSequence, true, 29),
        VariantId::Russian => ("Russian", 8, true, true, true, CapturePriority::Free, false, 25),
        VariantId::American => ("American", 8, false, false, true, CapturePriority::Free, false, 21),
        VariantId::PoolCheckers => ("Pool Checkers", 8, true, false, true, CapturePriority::MaximumCount, true, 26),
        VariantId::Canadian => ("Canadian", 12, true, true, true, CapturePriority::MaximumCount, true, 27),
        VariantId::Armenian => ("Armenian (Tama)", 8, true, true, true, CapturePriority::MaximumCount, true, 43),
        VariantId::Ghanaian => ("Ghanaian (Damii)", 10, true, true, true, CapturePriority::MaximumCount, true, 28),
        VariantId::Malaysian => ("Malaysian (Dama)", 8, true, false, true, CapturePriority::MaximumCount, true, 41),
        VariantId::Frisian => ("Frisian (diagonal subset)", 10, true, true, true, CapturePriority::MaximumSequence, true, 30),
        VariantId::Turkish => ("Turkish (diagonal subset)", 8, true, false, true, CapturePriority::Free, false, 31),
        VariantId::Thai => ("Thai (diagonal subset)", 8, false, false, false, CapturePriority::Free, false, 32),
        VariantId::Portuguese => ("Portuguese", 8, false, true, true, CapturePriority::MaximumCount, true, 23),
    };

    Variant {
        id,
        display_name,
        board_size,
        men_may_capture_backward: backward,
        kings_fly: flying,
        mandatory_capture: mandatory,
        capture_priority: priority,
        repetition_draw_enabled: repetition,
        gametype,
        fingerprint: fingerprint_of(id.canonical_name()),
    }
}
