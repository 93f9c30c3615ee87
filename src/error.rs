//! Structured error types shared by the rule engine, controller, notation
//! codec, and relay server.
//!
//! Each error type carries an `error_code()` method; the relay layer uses
//! it to turn a `CoreError` (or `ProtocolError`, or `RelayError`) into the
//! wire protocol's `{code, message}` error frame.

use thiserror::Error;

/// Errors raised by the rule engine and game controller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("illegal move: {0}")]
    IllegalMove(String),

    #[error("no such piece: {0}")]
    NoSuchPiece(u32),

    #[error("no history entry at index {0}")]
    NoSuchHistoryIndex(i64),

    #[error("undo/redo is disabled in multiplayer mode")]
    UndoRedoDisabled,
}

impl CoreError {
    /// The wire `error_code` this error maps onto.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreError::IllegalMove(_) => "ILLEGAL_MOVE",
            CoreError::NoSuchPiece(_) => "NO_SUCH_PIECE",
            CoreError::NoSuchHistoryIndex(_) => "NO_SUCH_HISTORY_INDEX",
            CoreError::UndoRedoDisabled => "UNDO_REDO_DISABLED",
        }
    }
}

/// Errors raised while decoding notation or network protocol frames.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    ParseError(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("malformed notation: {0}")]
    NotationSyntax(String),

    #[error("unknown variant: {0}")]
    UnknownVariant(String),
}

impl ProtocolError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ProtocolError::ParseError(_) => "PARSE_ERROR",
            ProtocolError::UnknownType(_) => "UNKNOWN_TYPE",
            ProtocolError::NotationSyntax(_) => "NOTATION_SYNTAX",
            ProtocolError::UnknownVariant(_) => "UNKNOWN_VARIANT",
        }
    }
}

/// Errors raised by the relay server's room/session/matchmaking logic.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("no such session: {0}")]
    NoSuchSession(String),

    #[error("no such room: {0}")]
    NoSuchRoom(String),

    #[error("room is full: {0}")]
    RoomFull(String),

    #[error("game already started in room: {0}")]
    GameAlreadyStarted(String),

    #[error("client version {client} is below required version {required}")]
    VersionMismatch { required: String, client: String },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl RelayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            RelayError::NoSuchSession(_) => "NO_SUCH_SESSION",
            RelayError::NoSuchRoom(_) => "NO_SUCH_ROOM",
            RelayError::RoomFull(_) => "ROOM_FULL",
            RelayError::GameAlreadyStarted(_) => "GAME_ALREADY_STARTED",
            RelayError::VersionMismatch { .. } => "VERSION_MISMATCH",
            RelayError::Protocol(e) => e.error_code(),
            RelayError::Core(e) => e.error_code(),
        }
    }
}

/// Errors raised by the persistence layer. Per the error-handling
/// policy these are always logged and never surfaced to a client.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt archive: {0}")]
    Corrupt(String),

    #[error("compression error: {0}")]
    Compression(String),
}
