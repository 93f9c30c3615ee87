//! The relay server: room lifecycle, matchmaking, and the WebSocket wire
//! protocol.
//!
//! A singleton registry actor owns shared state (rooms and the
//! quick-match queues) and one lightweight per-connection actor forwards
//! frames to and from it. The relay never runs the rule engine itself
//! beyond what [`crate::controller::GameController`] already validates —
//! it is transport, matchmaking, and timing, nothing else.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{ClockMode, Timestamp};
use crate::controller::{ControllerEvent, GameController, PlayerKind};
use crate::notation::{self, MoveText};
use crate::piece::{Colour, Move};
use crate::variant::{variant_by_id, Variant, VariantId};

/// Clients below this version are rejected at the handshake.
pub const REQUIRED_VERSION: &str = "1.0.0";

const PING_INTERVAL: Duration = Duration::from_secs(25);
const PING_MISS_LIMIT: u8 = 2;
const DISCONNECT_GRACE: Duration = Duration::from_secs(60);
const INACTIVITY_WATCHDOG: Duration = Duration::from_secs(30 * 60);
const ROOM_CODE_LEN: usize = 6;
const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ0123456789";

fn now_ms() -> Timestamp {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as Timestamp
}

// ---------------------------------------------------------------------------
// Wire protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClockConfigWire {
    pub mode: String,
    #[serde(default)]
    pub base_secs: u64,
    #[serde(default)]
    pub increment_secs: u64,
}

impl ClockConfigWire {
    fn resolve(&self) -> (ClockMode, Duration, Duration) {
        let mode = match self.mode.as_str() {
            "fischer" => ClockMode::Fischer,
            "bronstein" => ClockMode::Bronstein,
            _ => ClockMode::Untimed,
        };
        (mode, Duration::from_secs(self.base_secs), Duration::from_secs(self.increment_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Reconnect { session_token: String, version: String },
    CreateRoom { variant: String, clock: Option<ClockConfigWire>, version: String },
    JoinRoom { code: String, version: String },
    QuickMatch { variant: String, version: String },
    CancelQuickMatch,
    MakeMove { from: u32, to: u32, #[serde(default)] via: Vec<u32> },
    Resign,
    OfferDraw,
    AcceptDraw,
    RejectDraw,
    GameEnded,
    Ping,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Connected { session_token: String },
    Reconnected { room_code: String },
    RoomCreated { room_code: String },
    OpponentJoined { room_code: String },
    GameStarted { room_code: String, variant: String, you_are: String },
    MoveMade { notation: String, status: String, draw_reason: Option<String> },
    QuickMatchSearching,
    QuickMatchFound { room_code: String },
    DrawOffered,
    DrawResponse { accepted: bool },
    OpponentDisconnected,
    OpponentReconnected,
    GameEnded { status: String, reason: Option<String> },
    Error { code: String, message: String },
    Pong,
}

fn relay_error(err: &crate::error::RelayError) -> ServerMessage {
    ServerMessage::Error { code: err.error_code().to_string(), message: err.to_string() }
}

/// Checks a client-reported `version` against `REQUIRED_VERSION`, the
/// handshake gate spec.md requires on the first message of a session.
fn version_satisfies_requirement(client_version: &str) -> bool {
    let Ok(required) = semver::Version::parse(REQUIRED_VERSION) else { return false };
    match semver::Version::parse(client_version) {
        Ok(v) => v >= required,
        Err(_) => false,
    }
}

// ---------------------------------------------------------------------------
// Registry actor messages
// ---------------------------------------------------------------------------

#[derive(Message)]
#[rtype(result = "()")]
struct Connect {
    session_id: Uuid,
    session_token: String,
    addr: Addr<RoomSession>,
}

#[derive(Message)]
#[rtype(result = "()")]
struct Disconnect {
    session_id: Uuid,
}

#[derive(Message)]
#[rtype(result = "()")]
struct Deliver(ServerMessage);

/// Tells a `RoomSession` to close its socket, used after a fatal protocol
/// error (a version mismatch) that the registry detects on the session's
/// behalf.
#[derive(Message)]
#[rtype(result = "()")]
struct CloseSession;

#[derive(Message)]
#[rtype(result = "()")]
struct Dispatch {
    session_id: Uuid,
    message: ClientMessage,
    now: Timestamp,
}

/// A point-in-time count of open rooms and connected sessions, for
/// `/health` and `/stats`.
#[derive(Message, Default, Clone, Copy)]
#[rtype(result = "RegistrySnapshotResult")]
pub struct RegistrySnapshot;

#[derive(Debug, Default, Clone, Copy, MessageResponse)]
pub struct RegistrySnapshotResult {
    pub room_count: usize,
    pub session_count: usize,
    pub connections_ever: u64,
    pub peak_concurrent_games: usize,
}

impl Handler<RegistrySnapshot> for RoomRegistry {
    type Result = RegistrySnapshotResult;
    fn handle(&mut self, _msg: RegistrySnapshot, _ctx: &mut Context<Self>) -> Self::Result {
        RegistrySnapshotResult {
            room_count: self.rooms.values().filter(|r| r.status != RoomStatus::Closed).count(),
            session_count: self.sessions.len(),
            connections_ever: self.connections_ever,
            peak_concurrent_games: self.peak_concurrent_games,
        }
    }
}

impl Handler<Deliver> for RoomSession {
    type Result = ();
    fn handle(&mut self, msg: Deliver, ctx: &mut Self::Context) {
        if let Ok(text) = serde_json::to_string(&msg.0) {
            ctx.text(text);
        }
    }
}

impl Handler<CloseSession> for RoomSession {
    type Result = ();
    fn handle(&mut self, _msg: CloseSession, ctx: &mut Self::Context) {
        ctx.close(None);
        ctx.stop();
    }
}

// ---------------------------------------------------------------------------
// Room state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomStatus {
    Open,
    Filled,
    Playing,
    Closed,
}

struct Room {
    code: String,
    variant: Variant,
    clock_config: ClockConfigWire,
    host: Uuid,
    guest: Option<Uuid>,
    status: RoomStatus,
    controller: Option<GameController>,
    last_activity_at: Instant,
    disconnected_since: HashMap<Colour, Instant>,
    pending_draw_offer: Option<Colour>,
}

impl Room {
    fn seat_of(&self, session_id: Uuid) -> Option<Colour> {
        if session_id == self.host {
            Some(Colour::Red)
        } else if self.guest == Some(session_id) {
            Some(Colour::Black)
        } else {
            None
        }
    }

    fn session_of(&self, colour: Colour) -> Option<Uuid> {
        match colour {
            Colour::Red => Some(self.host),
            Colour::Black => self.guest,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomRegistry — the singleton matchmaking and room-table actor
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct RoomRegistry {
    rooms: HashMap<String, Room>,
    session_room: HashMap<Uuid, String>,
    sessions: HashMap<Uuid, Addr<RoomSession>>,
    /// Session token (handed to the client at connect/reconnect) -> the
    /// session id it currently authenticates, so a reconnecting client can
    /// be matched back to its seat.
    tokens: HashMap<String, Uuid>,
    quick_match_queues: HashMap<VariantId, VecDeque<Uuid>>,
    connections_ever: u64,
    peak_concurrent_games: usize,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_room_code(&self) -> String {
        loop {
            let bytes = Uuid::new_v4().into_bytes();
            let code: String = bytes[..ROOM_CODE_LEN].iter().map(|b| ROOM_CODE_ALPHABET[*b as usize % ROOM_CODE_ALPHABET.len()] as char).collect();
            if !self.rooms.contains_key(&code) {
                return code;
            }
        }
    }

    fn send_to(&self, session_id: Uuid, msg: ServerMessage) {
        if let Some(addr) = self.sessions.get(&session_id) {
            addr.do_send(Deliver(msg));
        }
    }

    fn tell_both(&self, room: &Room, msg: ServerMessage) {
        self.send_to(room.host, msg.clone());
        if let Some(guest) = room.guest {
            self.send_to(guest, msg);
        }
    }

    fn start_game(&mut self, code: &str) {
        let (host, guest, variant_name) = {
            let room = self.rooms.get_mut(code).expect("room exists");
            let (mode, base, increment) = room.clock_config.resolve();
            let mut controller = GameController::new(room.variant, mode, base, increment, PlayerKind::RemoteNetwork, PlayerKind::RemoteNetwork, true);
            controller.start_clock(now_ms());
            room.controller = Some(controller);
            room.status = RoomStatus::Playing;
            room.last_activity_at = Instant::now();
            (room.host, room.guest, room.variant.id.canonical_name().to_string())
        };

        let playing_count = self.rooms.values().filter(|r| r.status == RoomStatus::Playing).count();
        self.peak_concurrent_games = self.peak_concurrent_games.max(playing_count);

        self.send_to(host, ServerMessage::GameStarted { room_code: code.to_string(), variant: variant_name.clone(), you_are: "red".to_string() });
        if let Some(guest) = guest {
            self.send_to(guest, ServerMessage::GameStarted { room_code: code.to_string(), variant: variant_name, you_are: "black".to_string() });
        }
    }

    /// Removes `session_id` from the live-connection bookkeeping and, if it
    /// held a seat in a `Playing` room, marks that seat disconnected and
    /// notifies the opponent. Returns the room code and seat colour when a
    /// disconnect-grace timer should be started for them.
    fn mark_disconnected(&mut self, session_id: Uuid) -> Option<(String, Colour)> {
        self.sessions.remove(&session_id);
        self.quick_match_queues.values_mut().for_each(|q| q.retain(|s| *s != session_id));

        let code = self.session_room.get(&session_id).cloned()?;
        let room = self.rooms.get_mut(&code)?;
        let colour = room.seat_of(session_id)?;
        if room.status != RoomStatus::Playing {
            return None;
        }
        room.disconnected_since.insert(colour, Instant::now());
        if let Some(opponent) = room.session_of(colour.opposite()) {
            self.send_to(opponent, ServerMessage::OpponentDisconnected);
        }
        Some((code, colour))
    }

    fn close_room(&mut self, code: &str) {
        if let Some(room) = self.rooms.get_mut(code) {
            room.status = RoomStatus::Closed;
            self.session_room.remove(&room.host);
            if let Some(guest) = room.guest {
                self.session_room.remove(&guest);
            }
        }
    }

    fn drain_controller_events(&mut self, code: &str) {
        let Some(room) = self.rooms.get_mut(code) else { return };
        let Some(controller) = room.controller.as_mut() else { return };
        let events = controller.drain_events();
        for event in events {
            match event {
                ControllerEvent::MoveMade { mv } => {
                    let notation = notation::render_move(&mv, room.variant.board_size);
                    let state = controller.live_state();
                    let msg = ServerMessage::MoveMade { notation, status: state.status.to_string(), draw_reason: state.draw_reason.map(|r| r.to_string()) };
                    if let Some(addr) = self.sessions.get(&room.host) {
                        addr.do_send(Deliver(msg.clone()));
                    }
                    if let Some(guest) = room.guest {
                        if let Some(addr) = self.sessions.get(&guest) {
                            addr.do_send(Deliver(msg));
                        }
                    }
                }
                ControllerEvent::GameEnded { status, reason } => {
                    let msg = ServerMessage::GameEnded { status: status.to_string(), reason: reason.map(|r| r.to_string()) };
                    if let Some(addr) = self.sessions.get(&room.host) {
                        addr.do_send(Deliver(msg.clone()));
                    }
                    if let Some(guest) = room.guest {
                        if let Some(addr) = self.sessions.get(&guest) {
                            addr.do_send(Deliver(msg));
                        }
                    }
                }
                ControllerEvent::ClockExpired { .. } | ControllerEvent::StateChanged { .. } => {}
            }
        }
    }
}

impl Actor for RoomRegistry {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.run_interval(Duration::from_secs(1), |act, _ctx| {
            let expired_rooms: Vec<String> = act
                .rooms
                .iter()
                .filter(|(_, r)| r.status == RoomStatus::Playing)
                .map(|(code, _)| code.clone())
                .collect();
            for code in expired_rooms {
                if let Some(controller) = act.rooms.get_mut(&code).and_then(|r| r.controller.as_mut()) {
                    controller.check_clock_expiry(now_ms());
                }
                act.drain_controller_events(&code);
            }
        });

        ctx.run_interval(Duration::from_secs(60), |act, _ctx| {
            let now = Instant::now();
            let stale: Vec<String> = act
                .rooms
                .iter()
                .filter(|(_, r)| {
                    r.status != RoomStatus::Closed
                        && r.clock_config.mode == "untimed"
                        && now.duration_since(r.last_activity_at) > INACTIVITY_WATCHDOG
                })
                .map(|(code, _)| code.clone())
                .collect();
            for code in stale {
                if let Some(controller) = act.rooms.get_mut(&code).and_then(|r| r.controller.as_mut()) {
                    controller.declare_inactivity();
                }
                act.drain_controller_events(&code);
                act.close_room(&code);
                log::info!("room {code} closed by the inactivity watchdog");
            }
        });
    }
}

impl Handler<Connect> for RoomRegistry {
    type Result = ();
    fn handle(&mut self, msg: Connect, _ctx: &mut Context<Self>) {
        self.sessions.insert(msg.session_id, msg.addr);
        self.tokens.insert(msg.session_token, msg.session_id);
        self.connections_ever += 1;
    }
}

impl Handler<Disconnect> for RoomRegistry {
    type Result = ();
    fn handle(&mut self, msg: Disconnect, ctx: &mut Context<Self>) {
        let Some((code, colour)) = self.mark_disconnected(msg.session_id) else { return };

        let code_for_grace = code.clone();
        ctx.run_later(DISCONNECT_GRACE, move |act, _ctx| {
            let Some(room) = act.rooms.get(&code_for_grace) else { return };
            let still_gone = room.disconnected_since.get(&colour).is_some();
            if !still_gone || room.status != RoomStatus::Playing {
                return;
            }
            if let Some(controller) = act.rooms.get_mut(&code_for_grace).and_then(|r| r.controller.as_mut()) {
                controller.forfeit_on_timeout(colour);
            }
            act.drain_controller_events(&code_for_grace);
            act.close_room(&code_for_grace);
            log::info!("room {code_for_grace} closed: disconnect grace expired for {colour:?}");
        });
    }
}

impl Handler<Dispatch> for RoomRegistry {
    type Result = ();

    /// A panic inside one frame's handling must not take the registry actor
    /// (and every other room it owns) down with it, so the actual dispatch
    /// runs behind `catch_unwind`. `&mut self` access is fine here: a panic
    /// inside one of the `handle_*` calls below is always the last thing
    /// that call does, so the registry's maps are left in whatever state
    /// they were in at the panic point, never read again for that frame.
    fn handle(&mut self, msg: Dispatch, _ctx: &mut Context<Self>) {
        let session_id = msg.session_id;
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| self.dispatch_one(msg)));
        if result.is_err() {
            log::error!("panic while handling a frame from session {session_id}, dropping it");
            self.send_to(session_id, relay_error(&crate::error::RelayError::Protocol(crate::error::ProtocolError::ParseError("internal error".to_string()))));
        }
    }
}

impl RoomRegistry {
    /// Rejects and closes a session whose reported `version` is below
    /// `REQUIRED_VERSION`. Returns `true` when the caller should stop
    /// processing the frame that carried this version.
    fn reject_if_version_mismatch(&self, session_id: Uuid, client_version: &str) -> bool {
        if version_satisfies_requirement(client_version) {
            return false;
        }
        self.send_to(
            session_id,
            relay_error(&crate::error::RelayError::VersionMismatch { required: REQUIRED_VERSION.to_string(), client: client_version.to_string() }),
        );
        if let Some(addr) = self.sessions.get(&session_id) {
            addr.do_send(CloseSession);
        }
        true
    }

    fn dispatch_one(&mut self, msg: Dispatch) {
        let Dispatch { session_id, message, now } = msg;
        match message {
            ClientMessage::Reconnect { session_token, version } => {
                if self.reject_if_version_mismatch(session_id, &version) {
                    return;
                }
                self.handle_reconnect(session_id, &session_token)
            }
            ClientMessage::CreateRoom { variant, clock, version } => {
                if self.reject_if_version_mismatch(session_id, &version) {
                    return;
                }
                self.handle_create_room(session_id, &variant, clock)
            }
            ClientMessage::JoinRoom { code, version } => {
                if self.reject_if_version_mismatch(session_id, &version) {
                    return;
                }
                self.handle_join_room(session_id, &code)
            }
            ClientMessage::QuickMatch { variant, version } => {
                if self.reject_if_version_mismatch(session_id, &version) {
                    return;
                }
                self.handle_quick_match(session_id, &variant)
            }
            ClientMessage::CancelQuickMatch => {
                self.quick_match_queues.values_mut().for_each(|q| q.retain(|s| *s != session_id));
            }
            ClientMessage::MakeMove { from, to, via } => self.handle_make_move(session_id, from, to, via, now),
            ClientMessage::Resign => self.handle_resign(session_id),
            ClientMessage::OfferDraw => self.handle_offer_draw(session_id),
            ClientMessage::AcceptDraw => self.handle_draw_response(session_id, true),
            ClientMessage::RejectDraw => self.handle_draw_response(session_id, false),
            ClientMessage::GameEnded => {}
            ClientMessage::Ping => self.send_to(session_id, ServerMessage::Pong),
        }
    }
}

impl RoomRegistry {
    fn handle_reconnect(&mut self, session_id: Uuid, token: &str) {
        let Some(&prior_session) = self.tokens.get(token) else {
            self.send_to(session_id, relay_error(&crate::error::RelayError::NoSuchSession(token.to_string())));
            return;
        };
        let Some(code) = self.session_room.remove(&prior_session) else {
            self.send_to(session_id, relay_error(&crate::error::RelayError::NoSuchRoom(String::new())));
            return;
        };
        let Some(room) = self.rooms.get_mut(&code) else { return };
        let colour = if room.host == prior_session {
            room.host = session_id;
            Colour::Red
        } else {
            room.guest = Some(session_id);
            Colour::Black
        };
        room.disconnected_since.remove(&colour);
        self.session_room.insert(session_id, code.clone());
        self.tokens.insert(token.to_string(), session_id);

        if let Some(addr) = self.sessions.get(&session_id) {
            addr.do_send(Deliver(ServerMessage::Reconnected { room_code: code.clone() }));
        }
        if let Some(opponent) = room.session_of(colour.opposite()) {
            if let Some(addr) = self.sessions.get(&opponent) {
                addr.do_send(Deliver(ServerMessage::OpponentReconnected));
            }
        }
    }

    fn handle_create_room(&mut self, session_id: Uuid, variant_name: &str, clock: Option<ClockConfigWire>) {
        let Some(variant_id) = VariantId::from_name(variant_name) else {
            self.send_to(session_id, relay_error(&crate::error::RelayError::Protocol(crate::error::ProtocolError::UnknownVariant(variant_name.to_string()))));
            return;
        };
        let code = self.generate_room_code();
        let room = Room {
            code: code.clone(),
            variant: variant_by_id(variant_id),
            clock_config: clock.unwrap_or(ClockConfigWire { mode: "untimed".to_string(), base_secs: 0, increment_secs: 0 }),
            host: session_id,
            guest: None,
            status: RoomStatus::Open,
            controller: None,
            last_activity_at: Instant::now(),
            disconnected_since: HashMap::new(),
            pending_draw_offer: None,
        };
        self.rooms.insert(code.clone(), room);
        self.session_room.insert(session_id, code.clone());
        self.send_to(session_id, ServerMessage::RoomCreated { room_code: code });
    }

    fn handle_join_room(&mut self, session_id: Uuid, code: &str) {
        let Some(room) = self.rooms.get_mut(code) else {
            self.send_to(session_id, relay_error(&crate::error::RelayError::NoSuchRoom(code.to_string())));
            return;
        };
        if room.status != RoomStatus::Open {
            self.send_to(session_id, relay_error(&crate::error::RelayError::RoomFull(code.to_string())));
            return;
        }
        room.guest = Some(session_id);
        room.status = RoomStatus::Filled;
        self.session_room.insert(session_id, code.to_string());
        if let Some(addr) = self.sessions.get(&room.host) {
            addr.do_send(Deliver(ServerMessage::OpponentJoined { room_code: code.to_string() }));
        }
        self.start_game(code);
    }

    fn handle_quick_match(&mut self, session_id: Uuid, variant_name: &str) {
        let Some(variant_id) = VariantId::from_name(variant_name) else {
            self.send_to(session_id, relay_error(&crate::error::RelayError::Protocol(crate::error::ProtocolError::UnknownVariant(variant_name.to_string()))));
            return;
        };
        let queue = self.quick_match_queues.entry(variant_id).or_default();
        if let Some(opponent) = queue.pop_front() {
            let code = self.generate_room_code();
            // Quick-match rooms are always untimed.
            let room = Room {
                code: code.clone(),
                variant: variant_by_id(variant_id),
                clock_config: ClockConfigWire { mode: "untimed".to_string(), base_secs: 0, increment_secs: 0 },
                host: opponent,
                guest: Some(session_id),
                status: RoomStatus::Filled,
                controller: None,
                last_activity_at: Instant::now(),
                disconnected_since: HashMap::new(),
                pending_draw_offer: None,
            };
            self.rooms.insert(code.clone(), room);
            self.session_room.insert(opponent, code.clone());
            self.session_room.insert(session_id, code.clone());
            self.send_to(opponent, ServerMessage::QuickMatchFound { room_code: code.clone() });
            self.send_to(session_id, ServerMessage::QuickMatchFound { room_code: code.clone() });
            self.start_game(&code);
        } else {
            queue.push_back(session_id);
            self.send_to(session_id, ServerMessage::QuickMatchSearching);
        }
    }

    fn handle_make_move(&mut self, session_id: Uuid, from: u32, to: u32, via: Vec<u32>, now: Timestamp) {
        let Some(code) = self.session_room.get(&session_id).cloned() else { return };
        let Some(room) = self.rooms.get_mut(&code) else { return };
        let Some(colour) = room.seat_of(session_id) else { return };
        let Some(controller) = room.controller.as_mut() else { return };

        let state = controller.live_state();
        if state.active != colour {
            self.send_to(session_id, relay_error(&crate::error::RelayError::Core(crate::error::CoreError::IllegalMove("not your turn".to_string()))));
            return;
        }
        let is_capture = !via.is_empty() || crate::board::square_from_number(from, state.board_size).zip(crate::board::square_from_number(to, state.board_size)).is_some_and(|((fr, fc), (tr, tc))| (fr as i32 - tr as i32).abs() > 1 || (fc as i32 - tc as i32).abs() > 1);
        let mut squares = vec![from];
        squares.extend(via);
        squares.push(to);
        let token = MoveText { squares, is_capture };
        let mv: Result<Move, _> = notation::resolve(&token, &state, &room.variant);
        match mv {
            Ok(mv) => {
                if let Err(e) = controller.apply(mv, now) {
                    self.send_to(session_id, relay_error(&crate::error::RelayError::Core(e)));
                    return;
                }
                room.last_activity_at = Instant::now();
                self.drain_controller_events(&code);
            }
            Err(e) => self.send_to(session_id, relay_error(&crate::error::RelayError::Core(e))),
        }
    }

    fn handle_resign(&mut self, session_id: Uuid) {
        let Some(code) = self.session_room.get(&session_id).cloned() else { return };
        let Some(room) = self.rooms.get_mut(&code) else { return };
        let Some(colour) = room.seat_of(session_id) else { return };
        if let Some(controller) = room.controller.as_mut() {
            controller.resign(colour);
        }
        self.drain_controller_events(&code);
    }

    fn handle_offer_draw(&mut self, session_id: Uuid) {
        let Some(code) = self.session_room.get(&session_id).cloned() else { return };
        let Some(room) = self.rooms.get_mut(&code) else { return };
        let Some(colour) = room.seat_of(session_id) else { return };
        room.pending_draw_offer = Some(colour);
        if let Some(opponent) = room.session_of(colour.opposite()) {
            self.send_to(opponent, ServerMessage::DrawOffered);
        }
    }

    fn handle_draw_response(&mut self, session_id: Uuid, accepted: bool) {
        let Some(code) = self.session_room.get(&session_id).cloned() else { return };
        let Some(room) = self.rooms.get_mut(&code) else { return };
        if room.pending_draw_offer.take().is_none() {
            return;
        }
        if let Some(opponent_colour) = room.seat_of(session_id) {
            if let Some(opponent) = room.session_of(opponent_colour.opposite()) {
                if let Some(addr) = self.sessions.get(&opponent) {
                    addr.do_send(Deliver(ServerMessage::DrawResponse { accepted }));
                }
            }
        }
        if accepted {
            if let Some(controller) = room.controller.as_mut() {
                controller.agree_draw();
            }
            self.drain_controller_events(&code);
        }
    }
}

// ---------------------------------------------------------------------------
// RoomSession — per-connection actor
// ---------------------------------------------------------------------------

pub struct RoomSession {
    session_id: Uuid,
    session_token: String,
    registry: Addr<RoomRegistry>,
    missed_pings: u8,
}

impl RoomSession {
    pub fn new(registry: Addr<RoomRegistry>) -> Self {
        Self { session_id: Uuid::new_v4(), session_token: Uuid::new_v4().to_string(), registry, missed_pings: 0 }
    }

    fn start_keepalive(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(PING_INTERVAL, |act, ctx| {
            if act.missed_pings >= PING_MISS_LIMIT {
                log::warn!("session {} missed {} keepalive pings, closing", act.session_id, act.missed_pings);
                ctx.stop();
                return;
            }
            act.missed_pings += 1;
            ctx.ping(b"");
        });
    }
}

impl Actor for RoomSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.start_keepalive(ctx);
        self.registry.do_send(Connect { session_id: self.session_id, session_token: self.session_token.clone(), addr: ctx.address() });
        ctx.text(serde_json::to_string(&ServerMessage::Connected { session_token: self.session_token.clone() }).unwrap());
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.registry.do_send(Disconnect { session_id: self.session_id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RoomSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => self.registry.do_send(Dispatch { session_id: self.session_id, message, now: now_ms() }),
                Err(e) => {
                    let err = ServerMessage::Error { code: "PARSE_ERROR".to_string(), message: e.to_string() };
                    ctx.text(serde_json::to_string(&err).unwrap());
                }
            },
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {
                self.missed_pings = 0;
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                log::error!("session {} protocol error: {e}", self.session_id);
                ctx.stop();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP upgrade entry point
// ---------------------------------------------------------------------------

/// Upgrades to a WebSocket and hands off to a fresh `RoomSession`. The
/// version handshake happens on the first WebSocket message, not here —
/// `version` is a field of the message schema (`reconnect`, `create_room`,
/// `join_room`, `quick_match`), not a connection-setup parameter, so a
/// client that completes the upgrade still must clear
/// `reject_if_version_mismatch` before the registry will act on anything
/// it sends.
pub async fn ws_connect(req: HttpRequest, stream: web::Payload, registry: web::Data<Addr<RoomRegistry>>) -> Result<HttpResponse, actix_web::Error> {
    let session = RoomSession::new(registry.get_ref().clone());
    ws::start(session, &req, stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_codes_are_the_configured_length_and_charset() {
        let registry = RoomRegistry::new();
        let code = registry.generate_room_code();
        assert_eq!(code.len(), ROOM_CODE_LEN);
        assert!(code.chars().all(|c| ROOM_CODE_ALPHABET.contains(&(c as u8))));
    }

    #[test]
    fn clock_config_defaults_to_untimed() {
        let wire = ClockConfigWire { mode: "bogus".to_string(), base_secs: 10, increment_secs: 2 };
        let (mode, _, _) = wire.resolve();
        assert_eq!(mode, ClockMode::Untimed);
    }

    #[test]
    fn creating_and_joining_a_room_starts_the_game() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);
        let code = registry.rooms.keys().next().cloned().unwrap();
        registry.handle_join_room(guest, &code);

        let room = registry.rooms.get(&code).unwrap();
        assert_eq!(room.status, RoomStatus::Playing);
        assert!(room.controller.is_some());
        assert_eq!(room.host, host);
        assert_eq!(room.guest, Some(guest));
    }

    #[test]
    fn joining_a_room_twice_is_rejected() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);
        let code = registry.rooms.keys().next().cloned().unwrap();
        registry.handle_join_room(Uuid::new_v4(), &code);
        let late_guest = Uuid::new_v4();
        registry.handle_join_room(late_guest, &code);

        let room = registry.rooms.get(&code).unwrap();
        assert_ne!(room.guest, Some(late_guest), "a Playing room must not accept a second guest");
    }

    #[test]
    fn reconnect_restores_the_seat_and_clears_the_disconnected_marker() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);
        let code = registry.rooms.keys().next().cloned().unwrap();
        registry.handle_join_room(guest, &code);

        // What a real `Connect` handler would have recorded for the host's
        // original session before it dropped.
        registry.tokens.insert("host-token".to_string(), host);
        registry.rooms.get_mut(&code).unwrap().disconnected_since.insert(Colour::Red, Instant::now());

        let reconnecting_session = Uuid::new_v4();
        registry.handle_reconnect(reconnecting_session, "host-token");

        let room = registry.rooms.get(&code).unwrap();
        assert_eq!(room.host, reconnecting_session);
        assert!(!room.disconnected_since.contains_key(&Colour::Red));
        assert_eq!(registry.session_room.get(&reconnecting_session), Some(&code));
    }

    #[test]
    fn reconnect_with_an_unknown_token_does_not_panic_or_mutate_any_room() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);
        let code = registry.rooms.keys().next().cloned().unwrap();

        registry.handle_reconnect(Uuid::new_v4(), "never-issued");

        assert_eq!(registry.rooms.get(&code).unwrap().host, host, "an unknown token must not touch the room");
    }

    #[test]
    fn disconnect_during_play_marks_the_seat_and_returns_the_grace_target() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);
        let code = registry.rooms.keys().next().cloned().unwrap();
        registry.handle_join_room(guest, &code);

        let target = registry.mark_disconnected(host);
        assert_eq!(target, Some((code.clone(), Colour::Red)));
        assert!(registry.rooms.get(&code).unwrap().disconnected_since.contains_key(&Colour::Red));
    }

    #[test]
    fn disconnect_before_the_game_starts_schedules_no_grace_window() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);

        assert_eq!(registry.mark_disconnected(host), None, "an Open room has no opponent to protect with a grace timer");
    }

    #[test]
    fn making_a_legal_move_advances_the_controller_and_flips_the_turn() {
        let mut registry = RoomRegistry::new();
        let host = Uuid::new_v4();
        let guest = Uuid::new_v4();
        registry.handle_create_room(host, "american", None);
        let code = registry.rooms.keys().next().cloned().unwrap();
        registry.handle_join_room(guest, &code);

        let state = registry.rooms.get(&code).unwrap().controller.as_ref().unwrap().live_state();
        let legal = crate::rules::generate_legal_moves(&state, &registry.rooms.get(&code).unwrap().variant).remove(0);
        let from = crate::board::square_number(legal.from.row, legal.from.col, state.board_size);
        let to = crate::board::square_number(legal.to.row, legal.to.col, state.board_size);
        registry.handle_make_move(host, from, to, Vec::new(), 0);

        let after = registry.rooms.get(&code).unwrap().controller.as_ref().unwrap().live_state();
        assert_eq!(after.active, Colour::Black, "red's move should hand the turn to black");
    }

    #[test]
    fn a_client_below_the_required_version_is_rejected() {
        assert!(!version_satisfies_requirement("0.1.0"));
        assert!(version_satisfies_requirement(REQUIRED_VERSION));
        assert!(version_satisfies_requirement("99.0.0"));
    }

    #[test]
    fn reject_if_version_mismatch_sends_an_error_and_reports_true() {
        let registry = RoomRegistry::new();
        let session = Uuid::new_v4();
        // No `Connect` was ever sent for this session, so `sessions` is
        // empty — the rejection must still report true without panicking
        // on the missing session address.
        assert!(registry.reject_if_version_mismatch(session, "0.0.1"));
        assert!(!registry.reject_if_version_mismatch(session, REQUIRED_VERSION));
    }

    #[test]
    fn disconnect_grace_expiry_ends_the_game_with_an_opponent_timeout_reason() {
        let variant = variant_by_id(VariantId::American);
        let mut controller = GameController::new(variant, ClockMode::Untimed, Duration::ZERO, Duration::ZERO, PlayerKind::RemoteNetwork, PlayerKind::RemoteNetwork, true);
        controller.forfeit_on_timeout(Colour::Red);
        let events = controller.drain_events();
        assert!(events.iter().any(|e| matches!(e, ControllerEvent::GameEnded { status: crate::piece::GameStatus::BlackWins, reason: Some(crate::piece::DrawReason::OpponentTimeout) })));
    }
}
