//! The game state machine (linear history with undo/redo) and the session
//! controller that wraps it with a clock pair, player identities, and an
//! event bus.
//!
//! Mirrors the architecture's split: the rule engine (`crate::rules`) is a
//! pure function family, and this module is the only place that owns and
//! mutates a running game. Timestamps are always supplied by the caller —
//! the controller never reads wall time itself, which keeps it as
//! deterministic and testable as the engine it drives.

use std::collections::VecDeque;

use crate::clock::{ClockMode, ClockPair, Timestamp};
use crate::error::CoreError;
use crate::piece::{Colour, DrawReason, GameState, GameStatus, Move, MoveKind, PieceKind};
use crate::rules::{self, HistoryEntry};
use crate::variant::Variant;

/// Who is driving a seat at the board. The controller doesn't act
/// differently per kind — this is bookkeeping for the layer above it
/// (the relay server, or a local CLI session) to decide who may submit
/// moves for which colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerKind {
    Human,
    AI,
    RemoteNetwork,
}

/// One event drained from the controller's bus. The controller never
/// pushes these anywhere itself — callers drain `GameController::events`
/// and forward them however they see fit (a local channel for offline
/// play, a WebSocket frame for a relay room).
#[derive(Debug, Clone)]
pub enum ControllerEvent {
    StateChanged { state: GameState },
    MoveMade { mv: Move },
    GameEnded { status: GameStatus, reason: Option<DrawReason> },
    ClockExpired { colour: Colour },
}

fn initial_state(variant: &Variant) -> GameState {
    GameState {
        pieces: variant.starting_layout(),
        active: Colour::Red,
        move_count: 0,
        last_move: None,
        status: GameStatus::InProgress,
        draw_reason: None,
        board_size: variant.board_size,
    }
}

fn replay(variant: &Variant, moves: &[Move]) -> GameState {
    let mut state = initial_state(variant);
    for mv in moves {
        state = rules::execute(&state, variant, mv).expect("history only ever holds moves that were legal when applied");
    }
    state
}

/// The full controller for one running game: variant, history, clocks,
/// seats, and a pending-event queue.
pub struct GameController {
    variant: Variant,
    /// The applied move sequence up to and including the live position.
    /// Always append-only within one branch — a move applied after one or
    /// more `undo()` calls discards the pending `redo_tail` and becomes
    /// the new live branch.
    history: Vec<Move>,
    /// Moves popped off `history` by `undo()`, most-recently-undone last,
    /// ready to be pushed back by `redo()`.
    redo_tail: Vec<Move>,
    clocks: ClockPair,
    red: PlayerKind,
    black: PlayerKind,
    /// Undo/redo are disabled once a game is networked multiplayer:
    /// both become no-ops that log a warning rather than erroring
    /// loudly, since a stray client message shouldn't look like a bug.
    multiplayer: bool,
    events: VecDeque<ControllerEvent>,
    game_ended_emitted: bool,
}

impl GameController {
    pub fn new(variant: Variant, clock_mode: ClockMode, base: std::time::Duration, increment: std::time::Duration, red: PlayerKind, black: PlayerKind, multiplayer: bool) -> Self {
        let clocks = if clock_mode == ClockMode::Untimed { ClockPair::untimed() } else { ClockPair::new(clock_mode, base, increment) };
        Self {
            variant,
            history: Vec::new(),
            redo_tail: Vec::new(),
            clocks,
            red,
            black,
            multiplayer,
            events: VecDeque::new(),
            game_ended_emitted: false,
        }
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    pub fn player(&self, colour: Colour) -> PlayerKind {
        match colour {
            Colour::Red => self.red,
            Colour::Black => self.black,
        }
    }

    /// The current, live game state, freshly reconstructed from history.
    /// Never a handle into mutable controller state — a caller that holds
    /// onto this value is holding a snapshot, not a view.
    pub fn live_state(&self) -> GameState {
        replay(&self.variant, &self.history)
    }

    /// Historical snapshot at `index` (0-based into `history`; `-1` means
    /// the starting position), reconstructed without touching `history`,
    /// `redo_tail`, or the clocks. Lets a client browse a finished
    /// sequence without forfeiting the live game.
    pub fn view_at(&self, index: i64) -> Result<GameState, CoreError> {
        if index < -1 || index >= self.history.len() as i64 {
            return Err(CoreError::NoSuchHistoryIndex(index));
        }
        if index == -1 {
            return Ok(initial_state(&self.variant));
        }
        Ok(replay(&self.variant, &self.history[..=index as usize]))
    }

    /// Drains the first `Timestamp` the game clock becomes available for
    /// the now-active side; callers must still call `on_move_started`
    /// explicitly since the controller never reads wall time on its own.
    pub fn clocks(&self) -> &ClockPair {
        &self.clocks
    }

    /// Begins the active side's clock. A no-op for untimed games.
    pub fn start_clock(&mut self, now: Timestamp) {
        let active = self.live_state().active;
        self.clocks.on_move_started(active, now);
    }

    /// Applies `mv` at timestamp `now`: stops the mover's clock, executes
    /// the move through the rule engine, appends it to history, checks
    /// for a terminal or drawn result, and emits the resulting events.
    pub fn apply(&mut self, mv: Move, now: Timestamp) -> Result<(), CoreError> {
        let state = self.live_state();
        if state.piece(mv.mover).is_none() {
            return Err(CoreError::NoSuchPiece(mv.mover));
        }
        let mover_colour = state.active;
        let next = rules::execute(&state, &self.variant, &mv)?;

        self.redo_tail.clear();
        self.history.push(mv.clone());
        self.clocks.on_move_ended(mover_colour, now);

        self.events.push_back(ControllerEvent::MoveMade { mv });
        self.events.push_back(ControllerEvent::StateChanged { state: next.clone() });

        if next.status != GameStatus::InProgress {
            self.finish(next.status, None);
        } else if let Some(reason) = rules::check_draw(&next, &self.variant, &self.progress_history()) {
            self.finish(GameStatus::Draw, Some(reason));
        }
        Ok(())
    }

    /// Checks whether either clock has expired as of `now`, finishing the
    /// game with a `Timeout` draw-reason-carrying loss if so. Returns the
    /// expired colour when this call is what triggered the transition.
    pub fn check_clock_expiry(&mut self, now: Timestamp) -> Option<Colour> {
        let expired = self.clocks.check_expired(now)?;
        self.events.push_back(ControllerEvent::ClockExpired { colour: expired });
        let status = match expired {
            Colour::Red => GameStatus::BlackWins,
            Colour::Black => GameStatus::RedWins,
        };
        self.finish(status, Some(DrawReason::Timeout));
        Some(expired)
    }

    pub fn resign(&mut self, colour: Colour) {
        let status = match colour {
            Colour::Red => GameStatus::BlackWins,
            Colour::Black => GameStatus::RedWins,
        };
        self.finish(status, Some(DrawReason::Resignation));
    }

    /// Ends the game because `colour` failed to reconnect within the
    /// relay's disconnect grace window. Distinct from [`Self::resign`] so
    /// the wire protocol can report `opponent_timeout` rather than
    /// `resignation`.
    pub fn forfeit_on_timeout(&mut self, colour: Colour) {
        let status = match colour {
            Colour::Red => GameStatus::BlackWins,
            Colour::Black => GameStatus::RedWins,
        };
        self.finish(status, Some(DrawReason::OpponentTimeout));
    }

    pub fn agree_draw(&mut self) {
        self.finish(GameStatus::Draw, Some(DrawReason::Agreement));
    }

    pub fn declare_inactivity(&mut self) {
        self.finish(GameStatus::Draw, Some(DrawReason::Inactivity));
    }

    fn finish(&mut self, status: GameStatus, reason: Option<DrawReason>) {
        if self.game_ended_emitted {
            return;
        }
        self.game_ended_emitted = true;
        self.events.push_back(ControllerEvent::GameEnded { status, reason });
    }

    pub fn is_finished(&self) -> bool {
        self.game_ended_emitted
    }

    /// Undoes the most recent move, moving it onto `redo_tail`. Disabled
    /// (logged, not errored) in multiplayer mode.
    pub fn undo(&mut self) -> Result<(), CoreError> {
        if self.multiplayer {
            log::warn!("undo requested on a multiplayer game; ignoring");
            return Ok(());
        }
        let mv = self.history.pop().ok_or(CoreError::UndoRedoDisabled)?;
        self.redo_tail.push(mv);
        Ok(())
    }

    /// Re-applies the most recently undone move. Disabled (logged, not
    /// errored) in multiplayer mode.
    pub fn redo(&mut self) -> Result<(), CoreError> {
        if self.multiplayer {
            log::warn!("redo requested on a multiplayer game; ignoring");
            return Ok(());
        }
        let mv = self.redo_tail.pop().ok_or(CoreError::UndoRedoDisabled)?;
        self.history.push(mv);
        Ok(())
    }

    /// Returns the cursor to the live end of history. A no-op under this
    /// implementation's bookkeeping (the cursor and `history.len()` are
    /// always kept in lockstep), kept as an explicit operation because
    /// `view_at` callers reason about "returning to live" as a distinct
    /// step.
    pub fn return_to_live(&self) {}

    pub fn history(&self) -> &[Move] {
        &self.history
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_tail.is_empty()
    }

    /// Drains every event queued since the last drain, oldest first.
    pub fn drain_events(&mut self) -> Vec<ControllerEvent> {
        self.events.drain(..).collect()
    }

    /// Builds the `HistoryEntry` ledger `rules::check_draw` needs, by
    /// replaying `history` once. The rule engine itself never sees a
    /// piece's kind history — only the controller, which owns the move
    /// log, can say whether a given move reset the no-progress counter.
    fn progress_history(&self) -> Vec<HistoryEntry> {
        let mut entries = Vec::with_capacity(self.history.len());
        let mut state = initial_state(&self.variant);
        for mv in &self.history {
            let mover_is_man = state.piece(mv.mover).map(|p| p.kind == PieceKind::Man).unwrap_or(false);
            let resets_progress = !mv.captured.is_empty() || (mover_is_man && mv.kind == MoveKind::Simple);
            state = rules::execute(&state, &self.variant, mv).expect("history only ever holds moves that were legal when applied");
            entries.push(HistoryEntry { board_hash: state.board_hash(), active_before_move: state.active, resets_progress });
        }
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::{variant_by_id, VariantId};

    fn new_controller(variant_id: VariantId, multiplayer: bool) -> GameController {
        GameController::new(
            variant_by_id(variant_id),
            ClockMode::Untimed,
            std::time::Duration::ZERO,
            std::time::Duration::ZERO,
            PlayerKind::Human,
            PlayerKind::Human,
            multiplayer,
        )
    }

    fn first_legal_move(ctrl: &GameController) -> Move {
        let state = ctrl.live_state();
        rules::generate_legal_moves(&state, ctrl.variant()).into_iter().next().unwrap()
    }

    #[test]
    fn apply_advances_history_and_toggles_active_colour() {
        let mut ctrl = new_controller(VariantId::American, false);
        let mv = first_legal_move(&ctrl);
        ctrl.apply(mv, 0).unwrap();
        assert_eq!(ctrl.history().len(), 1);
        assert_eq!(ctrl.live_state().active, Colour::Black);
    }

    #[test]
    fn applying_a_move_for_an_unknown_piece_id_is_rejected() {
        let mut ctrl = new_controller(VariantId::American, false);
        let mut mv = first_legal_move(&ctrl);
        mv.mover = 9999;
        let err = ctrl.apply(mv, 0).unwrap_err();
        assert_eq!(err, CoreError::NoSuchPiece(9999));
        assert!(ctrl.history().is_empty(), "a rejected move must not be recorded");
    }

    #[test]
    fn undo_then_redo_restores_the_same_live_state() {
        let mut ctrl = new_controller(VariantId::American, false);
        let mv = first_legal_move(&ctrl);
        ctrl.apply(mv, 0).unwrap();
        let after = ctrl.live_state();
        ctrl.undo().unwrap();
        assert_eq!(ctrl.live_state().active, Colour::Red);
        ctrl.redo().unwrap();
        assert_eq!(ctrl.live_state().board_hash(), after.board_hash());
    }

    #[test]
    fn applying_a_new_move_after_undo_discards_the_redo_tail() {
        let mut ctrl = new_controller(VariantId::American, false);
        let mv = first_legal_move(&ctrl);
        ctrl.apply(mv, 0).unwrap();
        ctrl.undo().unwrap();
        assert!(ctrl.can_redo());
        let other = first_legal_move(&ctrl);
        ctrl.apply(other, 0).unwrap();
        assert!(!ctrl.can_redo());
    }

    #[test]
    fn undo_is_a_no_op_in_multiplayer_mode() {
        let mut ctrl = new_controller(VariantId::American, true);
        let mv = first_legal_move(&ctrl);
        ctrl.apply(mv, 0).unwrap();
        ctrl.undo().unwrap();
        assert_eq!(ctrl.history().len(), 1, "multiplayer undo must not mutate history");
    }

    #[test]
    fn view_at_does_not_disturb_the_live_cursor() {
        let mut ctrl = new_controller(VariantId::American, false);
        let mv = first_legal_move(&ctrl);
        ctrl.apply(mv, 0).unwrap();
        let snapshot = ctrl.view_at(-1).unwrap();
        assert_eq!(snapshot.active, Colour::Red, "viewing the initial position");
        assert_eq!(ctrl.live_state().active, Colour::Black, "live cursor unaffected by the view");
    }

    #[test]
    fn resignation_emits_a_single_game_ended_event() {
        let mut ctrl = new_controller(VariantId::American, false);
        ctrl.resign(Colour::Red);
        ctrl.resign(Colour::Red);
        let ended: Vec<_> = ctrl.drain_events().into_iter().filter(|e| matches!(e, ControllerEvent::GameEnded { .. })).collect();
        assert_eq!(ended.len(), 1, "finish() is idempotent once a game has ended");
    }

    #[test]
    fn fischer_clock_expiry_ends_the_game_for_the_opponent() {
        let mut ctrl = GameController::new(
            variant_by_id(VariantId::American),
            ClockMode::Fischer,
            std::time::Duration::from_secs(1),
            std::time::Duration::ZERO,
            PlayerKind::Human,
            PlayerKind::Human,
            true,
        );
        ctrl.start_clock(0);
        let expired = ctrl.check_clock_expiry(5_000);
        assert_eq!(expired, Some(Colour::Red));
        let events = ctrl.drain_events();
        assert!(events.iter().any(|e| matches!(e, ControllerEvent::GameEnded { status: GameStatus::BlackWins, reason: Some(DrawReason::Timeout) })));
    }
}
