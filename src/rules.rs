//! The rule engine: a pure function family over `(state, variant)`.
//!
//! No hidden state lives here. Every function takes the state and variant
//! it needs and returns a fresh value; nothing is mutated in place except
//! scratch buffers local to a single call. The sliding-piece ray-walking
//! idiom mirrors the bishop/rook/queen attack scan pattern, generalised
//! from a fixed 8x8 chessboard to a parameterised board size and to
//! multi-step flying-king capture chains.

use std::collections::HashMap;

use crate::board;
use crate::error::CoreError;
use crate::piece::{Colour, DrawReason, GameState, GameStatus, Move, MoveKind, Piece, PieceKind, Position};
use crate::variant::{CapturePriority, Variant};

/// A pure-data input to [`check_draw`]: one already-applied move's effect
/// on the no-progress counter and on the repetition ledger, with no
/// reference back to the rule engine needed once it is built. The
/// controller builds this list while replaying its own history — it is
/// the component that knows each mover's piece kind at the time of the
/// move, which the bare `Move` record (deliberately) does not carry.
#[derive(Debug, Clone, Copy)]
pub struct HistoryEntry {
    pub board_hash: u64,
    pub active_before_move: Colour,
    /// `true` when this move was a capture or a Man's simple advance —
    /// either resets the no-progress ply counter.
    pub resets_progress: bool,
}

/// A move is basically valid independent of variant-specific
/// capture/priority rules.
fn basically_valid(state: &GameState, mv: &Move) -> bool {
    let mover = match state.piece(mv.mover) {
        Some(p) if p.colour == state.active => p,
        _ => return false,
    };
    if mover.position != mv.from {
        return false;
    }
    if !mv.from.is_dark() || !mv.to.is_dark() {
        return false;
    }
    let drow = mv.to.row as i32 - mv.from.row as i32;
    let dcol = mv.to.col as i32 - mv.from.col as i32;
    if drow == 0 || drow.abs() != dcol.abs() {
        return false;
    }
    state.piece_at(mv.to).is_none()
}

fn occupancy_map(state: &GameState) -> HashMap<(u8, u8), u32> {
    state
        .pieces
        .iter()
        .map(|p| ((p.position.row, p.position.col), p.id))
        .collect()
}

fn pieces_by_id(state: &GameState) -> HashMap<u32, &Piece> {
    state.pieces.iter().map(|p| (p.id, p)).collect()
}

fn simple_directions(colour: Colour, kind: PieceKind) -> &'static [(i32, i32)] {
    const FORWARD_RED: [(i32, i32); 2] = [(-1, -1), (-1, 1)];
    const FORWARD_BLACK: [(i32, i32); 2] = [(1, -1), (1, 1)];
    const ALL: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
    match kind {
        PieceKind::King => &ALL,
        PieceKind::Man => match colour {
            Colour::Red => &FORWARD_RED,
            Colour::Black => &FORWARD_BLACK,
        },
    }
}

fn capture_directions(colour: Colour, kind: PieceKind, allow_backward: bool) -> &'static [(i32, i32)] {
    if kind == PieceKind::King || allow_backward {
        const ALL: [(i32, i32); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
        &ALL
    } else {
        simple_directions(colour, kind)
    }
}

/// Generates every non-capturing move available to `state.active`,
/// ignoring whether capture is mandatory.
fn generate_simple_moves(state: &GameState, variant: &Variant) -> Vec<Move> {
    let occ = occupancy_map(state);
    let mut moves = Vec::new();

    for piece in state.pieces_of(state.active) {
        if piece.kind == PieceKind::King && variant.kings_fly {
            for &(dr, dc) in simple_directions(piece.colour, piece.kind) {
                for (r, c) in board::iterate_diagonal(piece.position.row, piece.position.col, dr, dc, state.board_size) {
                    if occ.contains_key(&(r, c)) {
                        break;
                    }
                    moves.push(Move {
                        mover: piece.id,
                        from: piece.position,
                        to: Position::new(r, c, state.board_size),
                        kind: MoveKind::Simple,
                        captured: Vec::new(),
                        promoted: false,
                    });
                }
            }
        } else {
            for &(dr, dc) in simple_directions(piece.colour, piece.kind) {
                if let Some(to) = piece.position.offset(dr, dc)
                    && !occ.contains_key(&(to.row, to.col))
                {
                    let promoted = piece.kind == PieceKind::Man && to.row == variant.promotion_row(piece.colour);
                    moves.push(Move {
                        mover: piece.id,
                        from: piece.position,
                        to,
                        kind: MoveKind::Simple,
                        captured: Vec::new(),
                        promoted,
                    });
                }
            }
        }
    }
    moves
}

/// Recursively extends one capture chain from `cur`, recording a result
/// only at maximal (no-further-capture) endpoints — mandatory capture
/// always continues as long as a further jump is available.
#[allow(clippy::too_many_arguments)]
fn extend_captures(
    occ: &HashMap<(u8, u8), u32>,
    pieces: &HashMap<u32, &Piece>,
    colour: Colour,
    kind: PieceKind,
    allow_backward: bool,
    kings_fly: bool,
    board_size: u8,
    cur: Position,
    captured: &mut Vec<u32>,
    visited: &mut Vec<(u8, u8)>,
    out: &mut Vec<(Position, Vec<u32>)>,
) {
    let mut found_any = false;

    for &(dr, dc) in capture_directions(colour, kind, allow_backward) {
        if kind == PieceKind::King && kings_fly {
            let mut ray = board::iterate_diagonal(cur.row, cur.col, dr, dc, board_size).peekable();
            let mut victim: Option<(Position, u32)> = None;
            for (r, c) in ray.by_ref() {
                if let Some(&pid) = occ.get(&(r, c)) {
                    if !captured.contains(&pid) && pieces[&pid].colour != colour {
                        victim = Some((Position::new(r, c, board_size), pid));
                    }
                    break;
                }
            }
            let Some((victim_pos, victim_id)) = victim else { continue };
            for (r, c) in ray {
                if occ.contains_key(&(r, c)) {
                    break;
                }
                if visited.contains(&(r, c)) {
                    continue;
                }
                found_any = true;
                let landing = Position::new(r, c, board_size);
                captured.push(victim_id);
                visited.push((r, c));
                extend_captures(occ, pieces, colour, kind, allow_backward, kings_fly, board_size, landing, captured, visited, out);
                visited.pop();
                captured.pop();
            }
            let _ = victim_pos;
        } else if let Some(mid) = cur.offset(dr, dc)
            && let Some(&victim_id) = occ.get(&(mid.row, mid.col))
            && !captured.contains(&victim_id)
            && pieces[&victim_id].colour != colour
            && let Some(landing) = mid.offset(dr, dc)
            && !occ.contains_key(&(landing.row, landing.col))
            && !visited.contains(&(landing.row, landing.col))
        {
            found_any = true;
            captured.push(victim_id);
            visited.push((landing.row, landing.col));
            extend_captures(occ, pieces, colour, kind, allow_backward, kings_fly, board_size, landing, captured, visited, out);
            visited.pop();
            captured.pop();
        }
    }

    if !found_any && !captured.is_empty() {
        out.push((cur, captured.clone()));
    }
}

/// Generates every maximal capture sequence available to `state.active`,
/// with no priority filter applied yet.
fn generate_captures(state: &GameState, variant: &Variant) -> Vec<Move> {
    let occ = occupancy_map(state);
    let pieces = pieces_by_id(state);
    let mut moves = Vec::new();

    for piece in state.pieces_of(state.active) {
        let mut captured = Vec::new();
        let mut visited = vec![(piece.position.row, piece.position.col)];
        let mut results = Vec::new();
        extend_captures(
            &occ,
            &pieces,
            piece.colour,
            piece.kind,
            variant.men_may_capture_backward,
            variant.kings_fly,
            state.board_size,
            piece.position,
            &mut captured,
            &mut visited,
            &mut results,
        );
        for (final_pos, captured_ids) in results {
            let promoted = piece.kind == PieceKind::Man && final_pos.row == variant.promotion_row(piece.colour);
            let kind = if captured_ids.len() > 1 { MoveKind::MultiCapture } else { MoveKind::Capture };
            moves.push(Move {
                mover: piece.id,
                from: piece.position,
                to: final_pos,
                kind,
                captured: captured_ids,
                promoted,
            });
        }
    }
    moves
}

/// Applies the variant's capture-priority tie-break.
/// `MaximumSequence` currently collapses to `MaximumCount`.
fn apply_priority(variant: &Variant, moves: Vec<Move>) -> Vec<Move> {
    match variant.capture_priority {
        CapturePriority::Free => moves,
        CapturePriority::MaximumCount | CapturePriority::MaximumSequence => {
            let max = moves.iter().map(|m| m.captured.len()).max().unwrap_or(0);
            moves.into_iter().filter(|m| m.captured.len() == max).collect()
        }
    }
}

/// Enumerates every legal move for `state.active` under `variant`.
pub fn generate_legal_moves(state: &GameState, variant: &Variant) -> Vec<Move> {
    if state.status != GameStatus::InProgress {
        return Vec::new();
    }
    let captures = generate_captures(state, variant);
    if variant.mandatory_capture && !captures.is_empty() {
        return apply_priority(variant, captures);
    }
    let mut moves = generate_simple_moves(state, variant);
    moves.extend(captures);
    moves
}

/// Validates a candidate move: `Ok(())` if it is one of the legal moves
/// from `state` under `variant`, `Err(IllegalMove)` otherwise.
pub fn validate_move(state: &GameState, variant: &Variant, mv: &Move) -> Result<(), CoreError> {
    if !basically_valid(state, mv) {
        return Err(CoreError::IllegalMove(format!("{mv} fails basic validity")));
    }
    let legal = generate_legal_moves(state, variant);
    if legal.contains(mv) {
        Ok(())
    } else {
        Err(CoreError::IllegalMove(format!("{mv} is not among the legal moves")))
    }
}

/// Executes a move, re-verifying legality first. On success, returns a
/// fresh state with every invariant of the data model restored.
pub fn execute(state: &GameState, variant: &Variant, mv: &Move) -> Result<GameState, CoreError> {
    validate_move(state, variant, mv)?;

    let mut pieces: Vec<Piece> = state
        .pieces
        .iter()
        .filter(|p| !mv.captured.contains(&p.id))
        .cloned()
        .collect();

    for p in pieces.iter_mut() {
        if p.id == mv.mover {
            p.position = mv.to;
            if mv.promoted {
                p.kind = PieceKind::King;
            }
        }
    }

    let mut next = GameState {
        pieces,
        active: state.active.opposite(),
        move_count: state.move_count + 1,
        last_move: Some(mv.clone()),
        status: GameStatus::InProgress,
        draw_reason: None,
        board_size: state.board_size,
    };
    next.status = check_result(&next, variant);
    Ok(next)
}

/// Terminal-condition check. Stalemate counts as a loss, per
/// draughts convention, not a draw.
pub fn check_result(state: &GameState, variant: &Variant) -> GameStatus {
    if state.pieces_of(state.active).next().is_none() {
        return win_for(state.active.opposite());
    }
    if generate_legal_moves(state, variant).is_empty() {
        return win_for(state.active.opposite());
    }
    GameStatus::InProgress
}

fn win_for(colour: Colour) -> GameStatus {
    match colour {
        Colour::Red => GameStatus::RedWins,
        Colour::Black => GameStatus::BlackWins,
    }
}

/// Draw detection. `recent_history` is ordered oldest-first and
/// must not include `state` itself. `Agreement`, `Timeout`, and
/// `Inactivity` are never returned here — those are controller-only
/// events.
pub fn check_draw(state: &GameState, variant: &Variant, recent_history: &[HistoryEntry]) -> Option<DrawReason> {
    if variant.repetition_draw_enabled {
        let current = (state.board_hash(), state.active);
        let occurrences = recent_history
            .iter()
            .filter(|e| (e.board_hash, e.active_before_move) == current)
            .count()
            + 1;
        if occurrences >= 3 {
            return Some(DrawReason::Repetition);
        }
    }

    let limit = variant.move_limit_without_progress(state);
    let mut ply = 0u32;
    for entry in recent_history.iter().rev() {
        if entry.resets_progress {
            break;
        }
        ply += 1;
    }
    if ply >= limit {
        return Some(DrawReason::MoveLimitWithoutProgress);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{variant_by_id, VariantId};

    fn man(id: u32, colour: Colour, row: u8, col: u8, board_size: u8) -> Piece {
        Piece { id, colour, kind: PieceKind::Man, position: Position::new(row, col, board_size) }
    }

    fn king(id: u32, colour: Colour, row: u8, col: u8, board_size: u8) -> Piece {
        Piece { id, colour, kind: PieceKind::King, position: Position::new(row, col, board_size) }
    }

    fn state_with(pieces: Vec<Piece>, active: Colour, board_size: u8) -> GameState {
        GameState {
            pieces,
            active,
            move_count: 0,
            last_move: None,
            status: GameStatus::InProgress,
            draw_reason: None,
            board_size,
        }
    }

    #[test]
    fn american_starting_position_red_has_seven_moves() {
        let variant = variant_by_id(VariantId::American);
        let state = GameState {
            pieces: variant.starting_layout(),
            active: Colour::Red,
            move_count: 0,
            last_move: None,
            status: GameStatus::InProgress,
            draw_reason: None,
            board_size: variant.board_size,
        };
        let moves = generate_legal_moves(&state, &variant);
        assert_eq!(moves.len(), 7, "the front row of men has seven simple advances");
    }

    #[test]
    fn flying_king_single_capture_is_mandatory() {
        let variant = variant_by_id(VariantId::International);
        let bs = variant.board_size;
        // Square 46 (row 9, col 0) and square 32 (row 6, col 3) sit on the
        // same diagonal under this board's numbering; the square
        // immediately beyond 32 along that diagonal is square 28
        // (row 5, col 4), not square 27 — 27 lies on a different diagonal
        // and is not reachable from 46 in one jump over 32.
        assert_eq!(board::square_from_number(46, bs), Some((9, 0)));
        assert_eq!(board::square_from_number(32, bs), Some((6, 3)));
        assert_eq!(board::square_from_number(28, bs), Some((5, 4)));

        let red_king = king(1, Colour::Red, 9, 0, bs);
        let black_man = man(2, Colour::Black, 6, 3, bs);
        // A blocker beyond the only open landing square keeps the capture
        // to exactly one destination, mirroring a single-landing scenario.
        let blocker = man(3, Colour::Red, 4, 5, bs);
        let state = state_with(vec![red_king, black_man, blocker], Colour::Red, bs);

        let moves = generate_legal_moves(&state, &variant);
        assert_eq!(moves.len(), 1);
        let mv = &moves[0];
        assert_eq!(mv.captured, vec![2]);
        assert_eq!(mv.mover, 1);
        assert_eq!(mv.to, Position::new(5, 4, bs), "46x28: the king jumps over the man on 32 and lands on 28");
    }

    #[test]
    fn maximum_count_filter_prefers_longer_chain() {
        let variant = variant_by_id(VariantId::International);
        let bs = variant.board_size;
        // Mover 1 can capture exactly one piece; mover 3 can capture two
        // in a single sequence on a disjoint part of the board.
        let pieces = vec![
            man(1, Colour::Red, 7, 2, bs),
            man(2, Colour::Black, 6, 3, bs),
            man(3, Colour::Red, 7, 8, bs),
            man(4, Colour::Black, 6, 7, bs),
            man(5, Colour::Black, 4, 5, bs),
        ];
        let state = state_with(pieces, Colour::Red, bs);
        let moves = generate_legal_moves(&state, &variant);
        assert_eq!(moves.len(), 1, "only the 2-capture sequence survives MaximumCount");
        assert_eq!(moves[0].mover, 3);
        assert_eq!(moves[0].captured, vec![4, 5]);
    }

    #[test]
    fn man_transiting_promotion_row_does_not_promote_mid_sequence() {
        let variant = variant_by_id(VariantId::American);
        let bs = variant.board_size;
        // Red man captures toward row 0 (its promotion row) but the chain
        // continues past it via a second capture back down, and the move
        // only promotes if it TERMINATES on row 0.
        let mover = man(1, Colour::Red, 2, 3, bs);
        let victim = man(2, Colour::Black, 1, 4, bs);
        let state = state_with(vec![mover, victim], Colour::Red, bs);
        let moves = generate_legal_moves(&state, &variant);
        assert_eq!(moves.len(), 1);
        assert!(moves[0].promoted, "landing on row 0 promotes");
    }

    #[test]
    fn no_legal_moves_is_a_loss_not_a_draw() {
        let variant = variant_by_id(VariantId::American);
        let bs = variant.board_size;
        let red = man(1, Colour::Red, 0, 1, bs);
        let b1 = man(2, Colour::Black, 1, 0, bs);
        let b2 = man(3, Colour::Black, 1, 2, bs);
        let state = state_with(vec![red, b1, b2], Colour::Red, bs);
        assert_eq!(check_result(&state, &variant), GameStatus::BlackWins);
    }

    #[test]
    fn move_limit_draw_fires_at_threshold() {
        let variant = variant_by_id(VariantId::Russian);
        let bs = variant.board_size;
        let state = state_with(vec![king(1, Colour::Red, 0, 1, bs), king(2, Colour::Black, 7, 0, bs)], Colour::Red, bs);
        let history: Vec<HistoryEntry> = (0..15)
            .map(|_| HistoryEntry { board_hash: 0, active_before_move: Colour::Red, resets_progress: false })
            .collect();
        assert_eq!(check_draw(&state, &variant, &history), Some(DrawReason::MoveLimitWithoutProgress));
    }
}
