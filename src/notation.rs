//! Portable Numeric Notation: the text codec for games and move
//! sequences.
//!
//! Notation only ever carries dark-square numbers — never piece ids — so
//! parsing a move happens in two steps: [`parse_move_text`] tokenizes the
//! square numbers, and [`resolve`] matches the token against the legal
//! moves generated from a concrete state, recovering the mover id and
//! capture list the same way the relay server validates a client's move.

use crate::board;
use crate::error::{CoreError, ProtocolError};
use crate::piece::{GameState, Move};
use crate::rules;
use crate::variant::Variant;

/// The PDN-style header block: `[Event]`, `[Date]`, `[White]`,
/// `[Black]`, `[GameType NN]`, `[Result]`. Every field is optional on
/// input; `render_game` omits absent ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    pub event: Option<String>,
    pub date: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub gametype: Option<u8>,
    pub result: Option<String>,
}

/// One move as written in notation: a sequence of dark-square numbers and
/// whether the separators were `-` (simple) or `x` (capture).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveText {
    pub squares: Vec<u32>,
    pub is_capture: bool,
}

impl MoveText {
    pub fn from(&self) -> u32 {
        self.squares[0]
    }

    pub fn to(&self) -> u32 {
        *self.squares.last().unwrap()
    }
}

fn render_headers(headers: &Headers) -> String {
    let mut out = String::new();
    if let Some(event) = &headers.event {
        out.push_str(&format!("[Event \"{event}\"]\n"));
    }
    if let Some(date) = &headers.date {
        out.push_str(&format!("[Date \"{date}\"]\n"));
    }
    if let Some(white) = &headers.white {
        out.push_str(&format!("[White \"{white}\"]\n"));
    }
    if let Some(black) = &headers.black {
        out.push_str(&format!("[Black \"{black}\"]\n"));
    }
    if let Some(gametype) = headers.gametype {
        out.push_str(&format!("[GameType \"{gametype:02}\"]\n"));
    }
    if let Some(result) = &headers.result {
        out.push_str(&format!("[Result \"{result}\"]\n"));
    }
    out
}

/// Renders one move as `from-to` (simple) or `from×mid×...×to` (capture).
pub fn render_move(mv: &Move, board_size: u8) -> String {
    let from_n = board::square_number(mv.from.row, mv.from.col, board_size);
    let to_n = board::square_number(mv.to.row, mv.to.col, board_size);
    if mv.captured.is_empty() {
        format!("{from_n}-{to_n}")
    } else {
        format!("{from_n}\u{00d7}{to_n}")
    }
}

/// Renders a complete game: headers, then move text with `n. ` move-number
/// prefixes, one White/Black pair per line-worthy pair (wrapped the way a
/// reader of the move list expects: move number only on White's half).
pub fn render_game(variant: &Variant, headers: &Headers, moves: &[Move]) -> String {
    let mut headers = headers.clone();
    if headers.gametype.is_none() {
        headers.gametype = Some(variant.gametype);
    }
    let mut out = render_headers(&headers);
    out.push('\n');

    let mut text = String::new();
    for (i, mv) in moves.iter().enumerate() {
        if i % 2 == 0 {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&format!("{}.", i / 2 + 1));
        }
        text.push(' ');
        text.push_str(&render_move(mv, variant.board_size));
    }
    if let Some(result) = &headers.result {
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(result);
    }
    out.push_str(&text);
    out.push('\n');
    out
}

/// Parses one notation token, e.g. `"32-27"` or `"18\u{00d7}9\u{00d7}2"`.
pub fn parse_move_text(token: &str) -> Result<MoveText, ProtocolError> {
    let is_capture = token.contains('\u{00d7}') || token.contains('x') || token.contains('X');
    let sep: &[char] = if is_capture { &['\u{00d7}', 'x', 'X'] } else { &['-'] };
    let squares: Result<Vec<u32>, ProtocolError> = token
        .split(|c: char| sep.contains(&c))
        .map(|part| part.trim().parse::<u32>().map_err(|_| ProtocolError::NotationSyntax(token.to_string())))
        .collect();
    let squares = squares?;
    if squares.len() < 2 {
        return Err(ProtocolError::NotationSyntax(token.to_string()));
    }
    Ok(MoveText { squares, is_capture })
}

/// Parses a header block's `[Key "Value"]` lines, ignoring lines that
/// don't match the pattern (movetext and blank separators).
fn parse_headers(text: &str) -> Headers {
    let mut headers = Headers::default();
    for line in text.lines() {
        let line = line.trim();
        let Some(rest) = line.strip_prefix('[') else { continue };
        let Some(rest) = rest.strip_suffix(']') else { continue };
        let Some((key, value)) = rest.split_once(' ') else { continue };
        let value = value.trim().trim_matches('"');
        match key {
            "Event" => headers.event = Some(value.to_string()),
            "Date" => headers.date = Some(value.to_string()),
            "White" => headers.white = Some(value.to_string()),
            "Black" => headers.black = Some(value.to_string()),
            "GameType" => headers.gametype = value.parse().ok(),
            "Result" => headers.result = Some(value.to_string()),
            _ => {}
        }
    }
    headers
}

/// Parses the full move-text section into notation tokens, discarding
/// move-number prefixes (`"12."`) and a trailing result marker.
fn parse_movetext(text: &str) -> Result<Vec<MoveText>, ProtocolError> {
    let mut moves = Vec::new();
    for token in text.split_whitespace() {
        if token.ends_with('.') && token.trim_end_matches('.').chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if matches!(token, "2-0" | "0-2" | "1-1" | "*") {
            continue;
        }
        moves.push(parse_move_text(token)?);
    }
    Ok(moves)
}

/// Parses a complete notation document into its headers and move tokens.
/// Move tokens are not yet resolved against any game state — call
/// [`resolve`] against a controller's live state for each token in turn.
pub fn parse_game(text: &str) -> Result<(Headers, Vec<MoveText>), ProtocolError> {
    let split_at = text.find("\n\n").map(|i| i + 2).unwrap_or(0);
    let (header_block, movetext) = text.split_at(split_at);
    let headers = parse_headers(header_block);
    let moves = parse_movetext(movetext)?;
    Ok((headers, moves))
}

/// Resolves a notation token against the legal moves available from
/// `state`, recovering the full [`Move`] record (mover id, captured ids,
/// promotion flag) that notation alone cannot carry.
pub fn resolve(token: &MoveText, state: &GameState, variant: &Variant) -> Result<Move, CoreError> {
    let board_size = state.board_size;
    let from = board::square_from_number(token.from(), board_size)
        .ok_or_else(|| CoreError::IllegalMove(format!("square {} does not exist on a {board_size}x{board_size} board", token.from())))?;
    let to = board::square_from_number(token.to(), board_size)
        .ok_or_else(|| CoreError::IllegalMove(format!("square {} does not exist on a {board_size}x{board_size} board", token.to())))?;

    let candidates = rules::generate_legal_moves(state, variant);
    candidates
        .into_iter()
        .find(|mv| (mv.from.row, mv.from.col) == from && (mv.to.row, mv.to.col) == to)
        .ok_or_else(|| CoreError::IllegalMove(format!("no legal move from {} to {}", token.from(), token.to())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{variant_by_id, VariantId};

    #[test]
    fn simple_move_renders_with_a_hyphen() {
        let variant = variant_by_id(VariantId::American);
        let state = GameState { pieces: variant.starting_layout(), active: crate::piece::Colour::Red, move_count: 0, last_move: None, status: crate::piece::GameStatus::InProgress, draw_reason: None, board_size: variant.board_size };
        let mv = rules::generate_legal_moves(&state, &variant).into_iter().next().unwrap();
        let rendered = render_move(&mv, variant.board_size);
        assert!(rendered.contains('-'));
        assert!(!rendered.contains('\u{00d7}'));
    }

    #[test]
    fn parse_move_text_splits_a_capture_chain() {
        let parsed = parse_move_text("18\u{00d7}9\u{00d7}2").unwrap();
        assert!(parsed.is_capture);
        assert_eq!(parsed.squares, vec![18, 9, 2]);
        assert_eq!(parsed.from(), 18);
        assert_eq!(parsed.to(), 2);
    }

    #[test]
    fn parse_move_text_rejects_a_single_square() {
        assert!(parse_move_text("18").is_err());
    }

    #[test]
    fn render_then_parse_then_resolve_round_trips_a_game() {
        let variant = variant_by_id(VariantId::American);
        let state = GameState { pieces: variant.starting_layout(), active: crate::piece::Colour::Red, move_count: 0, last_move: None, status: crate::piece::GameStatus::InProgress, draw_reason: None, board_size: variant.board_size };
        let mv = rules::generate_legal_moves(&state, &variant).into_iter().next().unwrap();
        let rendered = render_move(&mv, variant.board_size);
        let parsed = parse_move_text(&rendered).unwrap();
        let resolved = resolve(&parsed, &state, &variant).unwrap();
        assert_eq!(resolved.from, mv.from);
        assert_eq!(resolved.to, mv.to);
        assert_eq!(resolved.mover, mv.mover);
    }

    #[test]
    fn headers_round_trip_through_render_and_parse() {
        let variant = variant_by_id(VariantId::American);
        let headers = Headers {
            event: Some("Club Match".to_string()),
            date: Some("2026.08.01".to_string()),
            white: Some("Red Player".to_string()),
            black: Some("Black Player".to_string()),
            gametype: None,
            result: Some("2-0".to_string()),
        };
        let rendered = render_game(&variant, &headers, &[]);
        let (parsed_headers, moves) = parse_game(&rendered).unwrap();
        assert_eq!(parsed_headers.event.as_deref(), Some("Club Match"));
        assert_eq!(parsed_headers.gametype, Some(variant.gametype));
        assert!(moves.is_empty());
    }
}
