//! Black-box coverage of the concrete scenarios that exercise the engine
//! end to end: a short real game driven purely through `GameController`,
//! archived and reloaded through `storage`, and rendered back out through
//! `notation` — checking that the pieces actually fit together rather than
//! just that each one works in isolation.

use std::time::Duration;

use draughts_core::clock::ClockMode;
use draughts_core::controller::{ControllerEvent, GameController, PlayerKind};
use draughts_core::notation::{self, Headers};
use draughts_core::piece::{Colour, DrawReason, GameStatus};
use draughts_core::rules;
use draughts_core::storage::{ArchivedGame, GameStorage};
use draughts_core::variant::{variant_by_id, VariantId};

fn play_n_plies(ctrl: &mut GameController, n: usize) {
    for i in 0..n {
        let state = ctrl.live_state();
        let legal = rules::generate_legal_moves(&state, ctrl.variant());
        let mv = legal.into_iter().next().expect("a short opening sequence always has a legal reply");
        ctrl.apply(mv, (i as u64) * 1000).unwrap();
    }
}

#[test]
fn a_played_game_archives_and_replays_to_the_same_position() {
    let variant = variant_by_id(VariantId::American);
    let mut ctrl = GameController::new(variant, ClockMode::Untimed, Duration::ZERO, Duration::ZERO, PlayerKind::Human, PlayerKind::Human, false);
    play_n_plies(&mut ctrl, 4);
    let live = ctrl.live_state();

    let dir = std::env::temp_dir().join(format!("draughts-core-test-{}", uuid::Uuid::new_v4()));
    let storage = GameStorage::new(&dir).unwrap();
    let game_id = uuid::Uuid::new_v4();
    let archive = ArchivedGame {
        game_id,
        variant_id: VariantId::American,
        board_size: variant.board_size,
        start_timestamp: 0,
        end_timestamp: 4000,
        status: live.status,
        draw_reason: live.draw_reason,
        moves: ctrl.history().to_vec(),
    };
    storage.archive_game(&archive).unwrap();

    let reloaded = storage.load_archive(&game_id).unwrap();
    let replayed = reloaded.replay_full().unwrap();
    assert_eq!(replayed.board_hash(), live.board_hash());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn rendered_notation_parses_and_resolves_back_to_the_same_moves() {
    let variant = variant_by_id(VariantId::American);
    let mut ctrl = GameController::new(variant, ClockMode::Untimed, Duration::ZERO, Duration::ZERO, PlayerKind::Human, PlayerKind::Human, false);
    play_n_plies(&mut ctrl, 4);

    let headers = Headers { event: Some("Test Game".to_string()), ..Default::default() };
    let text = notation::render_game(&variant, &headers, ctrl.history());
    let (_parsed_headers, move_texts) = notation::parse_game(&text).unwrap();
    assert_eq!(move_texts.len(), ctrl.history().len());

    let mut state = draughts_core::piece::GameState {
        pieces: variant.starting_layout(),
        active: Colour::Red,
        move_count: 0,
        last_move: None,
        status: GameStatus::InProgress,
        draw_reason: None,
        board_size: variant.board_size,
    };
    for (token, expected) in move_texts.iter().zip(ctrl.history()) {
        let resolved = notation::resolve(token, &state, &variant).unwrap();
        assert_eq!(resolved.from, expected.from);
        assert_eq!(resolved.to, expected.to);
        state = rules::execute(&state, &variant, &resolved).unwrap();
    }
}

#[test]
fn a_fischer_game_accrues_increment_across_several_moves() {
    let variant = variant_by_id(VariantId::American);
    let mut ctrl = GameController::new(
        variant,
        ClockMode::Fischer,
        Duration::from_secs(60),
        Duration::from_secs(5),
        PlayerKind::RemoteNetwork,
        PlayerKind::RemoteNetwork,
        true,
    );
    ctrl.start_clock(0);

    let state = ctrl.live_state();
    let mv = rules::generate_legal_moves(&state, ctrl.variant()).remove(0);
    // Red spends 10 seconds on its first move.
    ctrl.apply(mv, 10_000).unwrap();

    let red_clock = ctrl.clocks().clock(Colour::Red);
    assert_eq!(red_clock.remaining, Duration::from_secs(55), "60s base - 10s spent + 5s increment");
    assert!(ctrl.clocks().clock(Colour::Black).running, "black's clock starts the moment red's move lands");
}

#[test]
fn a_clock_that_runs_out_ends_the_game_for_the_opponent() {
    let variant = variant_by_id(VariantId::International);
    let mut ctrl = GameController::new(
        variant,
        ClockMode::Fischer,
        Duration::from_secs(30),
        Duration::ZERO,
        PlayerKind::RemoteNetwork,
        PlayerKind::RemoteNetwork,
        true,
    );
    ctrl.start_clock(0);

    let expired = ctrl.check_clock_expiry(31_000);
    assert_eq!(expired, Some(Colour::Red));

    let events = ctrl.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        ControllerEvent::GameEnded { status: GameStatus::BlackWins, reason: Some(DrawReason::Timeout) }
    )));
    assert!(ctrl.is_finished());
}

#[test]
fn resigning_ends_the_game_exactly_once_even_if_called_twice() {
    let variant = variant_by_id(VariantId::Russian);
    let mut ctrl = GameController::new(variant, ClockMode::Untimed, Duration::ZERO, Duration::ZERO, PlayerKind::RemoteNetwork, PlayerKind::RemoteNetwork, true);
    ctrl.resign(Colour::Black);
    ctrl.resign(Colour::Black);

    let events = ctrl.drain_events();
    let endings = events.iter().filter(|e| matches!(e, ControllerEvent::GameEnded { .. })).count();
    assert_eq!(endings, 1);
    assert!(events.iter().any(|e| matches!(e, ControllerEvent::GameEnded { status: GameStatus::RedWins, .. })));
}
