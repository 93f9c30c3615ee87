//! Persistent game archival with a compact binary format and zstd
//! compression.
//!
//! # Storage strategy
//!
//! - **Active games** (in progress) are written uncompressed into
//!   `active/` after every move, so a server restart can recover them.
//! - **Completed games** are compressed with zstd at level 19 into
//!   `archive/`, and the uncompressed active file is removed.
//!
//! # Binary format (`.drft`)
//!
//! ```text
//! Offset  Size   Field
//! ──────  ────   ─────
//! 0       4      Magic bytes: "DRFT"
//! 4       1      Format version (currently 1)
//! 5       16     Game UUID
//! 21      1      Variant id (index into VariantId::ALL)
//! 22      1      Board size
//! 23      8      Start timestamp (unix epoch seconds, big-endian)
//! 31      8      End timestamp (0 if ongoing)
//! 39      1      Status: 0=in progress, 1=RedWins, 2=BlackWins, 3=Draw
//! 40      1      Draw reason (0=none, 1..7 per DrawReason)
//! 41      2      Move count (big-endian u16)
//!
//! Header total: 43 bytes
//!
//! 43..    var    Encoded moves, each:
//!                  4  mover id (big-endian u32)
//!                  1  from square number
//!                  1  to square number
//!                  1  kind (0=Simple, 1=Capture, 2=MultiCapture)
//!                  1  promoted (0/1)
//!                  1  captured count N
//!                  4×N captured ids (big-endian u32 each)
//! ```
//!
//! Replaying the move list against the variant's starting layout
//! reconstructs the exact state at any point in the game; nothing but the
//! move sequence and the initiating variant need to survive on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

use crate::board;
use crate::error::StorageError;
use crate::piece::{DrawReason, GameState, Move, MoveKind};
use crate::rules;
use crate::variant::{variant_by_id, Variant, VariantId};

const MAGIC: &[u8; 4] = b"DRFT";
const FORMAT_VERSION: u8 = 1;
const ZSTD_COMPRESSION_LEVEL: i32 = 19;
const HEADER_LEN: usize = 43;

fn encode_status(status: crate::piece::GameStatus) -> u8 {
    use crate::piece::GameStatus::*;
    match status {
        InProgress => 0,
        RedWins => 1,
        BlackWins => 2,
        Draw => 3,
    }
}

fn decode_status(byte: u8) -> crate::piece::GameStatus {
    use crate::piece::GameStatus::*;
    match byte {
        1 => RedWins,
        2 => BlackWins,
        3 => Draw,
        _ => InProgress,
    }
}

fn encode_draw_reason(reason: Option<DrawReason>) -> u8 {
    match reason {
        None => 0,
        Some(DrawReason::Stalemate) => 1,
        Some(DrawReason::MoveLimitWithoutProgress) => 2,
        Some(DrawReason::InsufficientMaterial) => 3,
        Some(DrawReason::Repetition) => 4,
        Some(DrawReason::Agreement) => 5,
        Some(DrawReason::Timeout) => 6,
        Some(DrawReason::Inactivity) => 7,
        Some(DrawReason::Resignation) => 8,
        Some(DrawReason::OpponentTimeout) => 9,
    }
}

fn decode_draw_reason(byte: u8) -> Option<DrawReason> {
    match byte {
        1 => Some(DrawReason::Stalemate),
        2 => Some(DrawReason::MoveLimitWithoutProgress),
        3 => Some(DrawReason::InsufficientMaterial),
        4 => Some(DrawReason::Repetition),
        5 => Some(DrawReason::Agreement),
        6 => Some(DrawReason::Timeout),
        7 => Some(DrawReason::Inactivity),
        8 => Some(DrawReason::Resignation),
        9 => Some(DrawReason::OpponentTimeout),
        _ => None,
    }
}

fn encode_kind(kind: MoveKind) -> u8 {
    match kind {
        MoveKind::Simple => 0,
        MoveKind::Capture => 1,
        MoveKind::MultiCapture => 2,
    }
}

fn decode_kind(byte: u8) -> Result<MoveKind, StorageError> {
    match byte {
        0 => Ok(MoveKind::Simple),
        1 => Ok(MoveKind::Capture),
        2 => Ok(MoveKind::MultiCapture),
        other => Err(StorageError::Corrupt(format!("unknown move kind byte {other}"))),
    }
}

/// A complete archived game: enough to reconstruct every position via
/// [`ArchivedGame::replay`].
#[derive(Debug, Clone)]
pub struct ArchivedGame {
    pub game_id: Uuid,
    pub variant_id: VariantId,
    pub board_size: u8,
    pub start_timestamp: u64,
    pub end_timestamp: u64,
    pub status: crate::piece::GameStatus,
    pub draw_reason: Option<DrawReason>,
    pub moves: Vec<Move>,
}

impl ArchivedGame {
    pub fn move_count(&self) -> usize {
        self.moves.len()
    }

    pub fn variant(&self) -> Variant {
        variant_by_id(self.variant_id)
    }

    /// Replays the first `up_to` moves (clamped) from the variant's
    /// starting layout.
    pub fn replay(&self, up_to: usize) -> Result<GameState, StorageError> {
        let variant = self.variant();
        let mut state = GameState {
            pieces: variant.starting_layout(),
            active: crate::piece::Colour::Red,
            move_count: 0,
            last_move: None,
            status: crate::piece::GameStatus::InProgress,
            draw_reason: None,
            board_size: variant.board_size,
        };
        let limit = up_to.min(self.moves.len());
        for mv in self.moves.iter().take(limit) {
            state = rules::execute(&state, &variant, mv).map_err(|e| StorageError::Corrupt(format!("move {} failed to replay: {e}", mv)))?;
        }
        Ok(state)
    }

    pub fn replay_full(&self) -> Result<GameState, StorageError> {
        self.replay(self.moves.len())
    }
}

fn encode_move(mv: &Move, board_size: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + mv.captured.len() * 4);
    buf.extend_from_slice(&mv.mover.to_be_bytes());
    buf.push(board::square_number(mv.from.row, mv.from.col, board_size) as u8);
    buf.push(board::square_number(mv.to.row, mv.to.col, board_size) as u8);
    buf.push(encode_kind(mv.kind));
    buf.push(mv.promoted as u8);
    buf.push(mv.captured.len() as u8);
    for id in &mv.captured {
        buf.extend_from_slice(&id.to_be_bytes());
    }
    buf
}

fn decode_move(data: &[u8], board_size: u8) -> Result<(Move, usize), StorageError> {
    if data.len() < 8 {
        return Err(StorageError::Corrupt("truncated move record".into()));
    }
    let mover = u32::from_be_bytes(data[0..4].try_into().unwrap());
    let from_sq = data[4] as u32;
    let to_sq = data[5] as u32;
    let kind = decode_kind(data[6])?;
    let promoted = data[7] != 0;
    let captured_count = data[8] as usize;
    let mut offset = 9;
    let mut captured = Vec::with_capacity(captured_count);
    for _ in 0..captured_count {
        if data.len() < offset + 4 {
            return Err(StorageError::Corrupt("truncated captured-id list".into()));
        }
        captured.push(u32::from_be_bytes(data[offset..offset + 4].try_into().unwrap()));
        offset += 4;
    }
    let (from_row, from_col) = board::square_from_number(from_sq, board_size).ok_or_else(|| StorageError::Corrupt(format!("square {from_sq} out of range")))?;
    let (to_row, to_col) = board::square_from_number(to_sq, board_size).ok_or_else(|| StorageError::Corrupt(format!("square {to_sq} out of range")))?;
    let mv = Move {
        mover,
        from: crate::piece::Position::new(from_row, from_col, board_size),
        to: crate::piece::Position::new(to_row, to_col, board_size),
        kind,
        captured,
        promoted,
    };
    Ok((mv, offset))
}

/// Serializes an archived game into the `.drft` binary format.
pub fn serialize_game(archive: &ArchivedGame) -> Result<Vec<u8>, StorageError> {
    if archive.moves.len() > u16::MAX as usize {
        return Err(StorageError::Corrupt("too many moves for the u16 move-count field".into()));
    }
    let variant_index = VariantId::ALL.iter().position(|v| *v == archive.variant_id).expect("variant id always resolves") as u8;

    let mut buf = Vec::with_capacity(HEADER_LEN + archive.moves.len() * 12);
    buf.extend_from_slice(MAGIC);
    buf.push(FORMAT_VERSION);
    buf.extend_from_slice(archive.game_id.as_bytes());
    buf.push(variant_index);
    buf.push(archive.board_size);
    buf.extend_from_slice(&archive.start_timestamp.to_be_bytes());
    buf.extend_from_slice(&archive.end_timestamp.to_be_bytes());
    buf.push(encode_status(archive.status));
    buf.push(encode_draw_reason(archive.draw_reason));
    buf.extend_from_slice(&(archive.moves.len() as u16).to_be_bytes());

    for mv in &archive.moves {
        buf.extend_from_slice(&encode_move(mv, archive.board_size));
    }
    Ok(buf)
}

/// Deserializes an archived game from the `.drft` binary format.
pub fn deserialize_game(data: &[u8]) -> Result<ArchivedGame, StorageError> {
    if data.len() < HEADER_LEN {
        return Err(StorageError::Corrupt("header shorter than 43 bytes".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(StorageError::Corrupt("bad magic bytes".into()));
    }
    let version = data[4];
    if version != FORMAT_VERSION {
        return Err(StorageError::Corrupt(format!("unsupported format version {version}")));
    }
    let game_id = Uuid::from_bytes(data[5..21].try_into().unwrap());
    let variant_index = data[21] as usize;
    let variant_id = *VariantId::ALL.get(variant_index).ok_or_else(|| StorageError::Corrupt(format!("unknown variant index {variant_index}")))?;
    let board_size = data[22];
    let start_timestamp = u64::from_be_bytes(data[23..31].try_into().unwrap());
    let end_timestamp = u64::from_be_bytes(data[31..39].try_into().unwrap());
    let status = decode_status(data[39]);
    let draw_reason = decode_draw_reason(data[40]);
    let move_count = u16::from_be_bytes(data[41..43].try_into().unwrap()) as usize;

    let mut moves = Vec::with_capacity(move_count);
    let mut cursor = HEADER_LEN;
    for _ in 0..move_count {
        let (mv, consumed) = decode_move(&data[cursor..], board_size)?;
        cursor += consumed;
        moves.push(mv);
    }

    Ok(ArchivedGame { game_id, variant_id, board_size, start_timestamp, end_timestamp, status, draw_reason, moves })
}

/// Manages persistent game storage on disk, split into `active/` and
/// `archive/` subdirectories.
pub struct GameStorage {
    base_dir: PathBuf,
    active_dir: PathBuf,
    archive_dir: PathBuf,
}

impl GameStorage {
    pub fn new(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let active_dir = base_dir.join("active");
        let archive_dir = base_dir.join("archive");
        fs::create_dir_all(&active_dir)?;
        fs::create_dir_all(&archive_dir)?;
        log::info!("game storage initialized at {}", base_dir.display());
        Ok(Self { base_dir, active_dir, archive_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn active_path(&self, game_id: &Uuid) -> PathBuf {
        self.active_dir.join(format!("{game_id}.drft"))
    }

    fn archive_path(&self, game_id: &Uuid) -> PathBuf {
        self.archive_dir.join(format!("{game_id}.drft.zst"))
    }

    /// Writes an in-progress game's current state atomically (temp file,
    /// then rename) so a crash mid-write never leaves a corrupt file.
    pub fn save_active(&self, archive: &ArchivedGame) -> Result<(), StorageError> {
        let data = serialize_game(archive)?;
        let path = self.active_path(&archive.game_id);
        let temp_path = self.active_dir.join(format!("{}.drft.tmp", archive.game_id));
        fs::write(&temp_path, &data)?;
        fs::rename(&temp_path, &path)?;
        log::debug!("saved active game {} ({} bytes, {} moves)", archive.game_id, data.len(), archive.moves.len());
        Ok(())
    }

    /// Compresses a completed game into `archive/` and removes its
    /// uncompressed active file. Returns the compressed size in bytes.
    pub fn archive_game(&self, archive: &ArchivedGame) -> Result<usize, StorageError> {
        let raw = serialize_game(archive)?;
        let compressed = zstd::encode_all(raw.as_slice(), ZSTD_COMPRESSION_LEVEL).map_err(|e| StorageError::Compression(e.to_string()))?;
        fs::write(self.archive_path(&archive.game_id), &compressed)?;
        let active_path = self.active_path(&archive.game_id);
        if active_path.exists() {
            let _ = fs::remove_file(&active_path);
        }
        log::info!("archived game {}: {} -> {} bytes", archive.game_id, raw.len(), compressed.len());
        Ok(compressed.len())
    }

    pub fn load_active(&self, game_id: &Uuid) -> Result<ArchivedGame, StorageError> {
        let data = fs::read(self.active_path(game_id))?;
        deserialize_game(&data)
    }

    pub fn load_archive(&self, game_id: &Uuid) -> Result<ArchivedGame, StorageError> {
        let compressed = fs::read(self.archive_path(game_id))?;
        let decompressed = zstd::decode_all(compressed.as_slice()).map_err(|e| StorageError::Compression(e.to_string()))?;
        deserialize_game(&decompressed)
    }

    /// Loads from active storage first, falling back to the archive.
    /// Returns whether the loaded copy came from the compressed archive.
    pub fn load_any(&self, game_id: &Uuid) -> Result<(ArchivedGame, bool), StorageError> {
        if self.active_path(game_id).exists() {
            return Ok((self.load_active(game_id)?, false));
        }
        if self.archive_path(game_id).exists() {
            return Ok((self.load_archive(game_id)?, true));
        }
        Err(StorageError::Corrupt(format!("no game found with id {game_id}")))
    }

    pub fn list_archived(&self) -> Result<Vec<Uuid>, StorageError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.archive_dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if let Some(id_str) = filename.strip_suffix(".drft.zst")
                && let Ok(id) = Uuid::parse_str(id_str)
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn list_active_on_disk(&self) -> Result<Vec<Uuid>, StorageError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.active_dir)? {
            let entry = entry?;
            let filename = entry.file_name().to_string_lossy().to_string();
            if let Some(id_str) = filename.strip_suffix(".drft")
                && let Ok(id) = Uuid::parse_str(id_str)
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    pub fn stats(&self) -> Result<StorageStats, StorageError> {
        let active_ids = self.list_active_on_disk()?;
        let archived_ids = self.list_archived()?;
        let active_bytes: u64 = active_ids.iter().filter_map(|id| fs::metadata(self.active_path(id)).ok()).map(|m| m.len()).sum();
        let archive_bytes: u64 = archived_ids.iter().filter_map(|id| fs::metadata(self.archive_path(id)).ok()).map(|m| m.len()).sum();
        Ok(StorageStats {
            active_count: active_ids.len(),
            archived_count: archived_ids.len(),
            active_bytes,
            archive_bytes,
            total_bytes: active_bytes + archive_bytes,
        })
    }

    pub fn remove_active(&self, game_id: &Uuid) -> Result<(), StorageError> {
        let path = self.active_path(game_id);
        if path.exists() {
            fs::remove_file(&path)?;
        }
        Ok(())
    }

    pub fn archive_file_size(&self, game_id: &Uuid) -> Option<u64> {
        fs::metadata(self.archive_path(game_id)).ok().map(|m| m.len())
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct StorageStats {
    pub active_count: usize,
    pub archived_count: usize,
    pub active_bytes: u64,
    pub archive_bytes: u64,
    pub total_bytes: u64,
}

pub fn unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Colour;
    use crate::rules;

    fn sample_archive() -> ArchivedGame {
        let variant = variant_by_id(VariantId::American);
        let mut state = GameState {
            pieces: variant.starting_layout(),
            active: Colour::Red,
            move_count: 0,
            last_move: None,
            status: crate::piece::GameStatus::InProgress,
            draw_reason: None,
            board_size: variant.board_size,
        };
        let mut moves = Vec::new();
        for _ in 0..3 {
            let mv = rules::generate_legal_moves(&state, &variant).into_iter().next().unwrap();
            state = rules::execute(&state, &variant, &mv).unwrap();
            moves.push(mv);
        }
        ArchivedGame {
            game_id: Uuid::new_v4(),
            variant_id: VariantId::American,
            board_size: variant.board_size,
            start_timestamp: 1_740_000_000,
            end_timestamp: 0,
            status: state.status,
            draw_reason: state.draw_reason,
            moves,
        }
    }

    #[test]
    fn serialize_then_deserialize_round_trips() {
        let archive = sample_archive();
        let data = serialize_game(&archive).unwrap();
        let decoded = deserialize_game(&data).unwrap();
        assert_eq!(decoded.game_id, archive.game_id);
        assert_eq!(decoded.moves.len(), archive.moves.len());
        for (a, b) in archive.moves.iter().zip(decoded.moves.iter()) {
            assert_eq!(a.mover, b.mover);
            assert_eq!(a.from, b.from);
            assert_eq!(a.to, b.to);
            assert_eq!(a.captured, b.captured);
        }
    }

    #[test]
    fn replay_reconstructs_each_position() {
        let archive = sample_archive();
        let state = archive.replay_full().unwrap();
        assert_eq!(state.move_count, archive.moves.len() as u32);
    }

    #[test]
    fn active_games_archive_and_compress() {
        let dir = std::env::temp_dir().join(format!("draughts_core_test_{}", Uuid::new_v4()));
        let storage = GameStorage::new(&dir).unwrap();
        let archive = sample_archive();

        storage.save_active(&archive).unwrap();
        let loaded = storage.load_active(&archive.game_id).unwrap();
        assert_eq!(loaded.moves.len(), archive.moves.len());

        let compressed_size = storage.archive_game(&archive).unwrap();
        assert!(compressed_size > 0);
        assert!(!storage.active_path(&archive.game_id).exists());

        let reloaded = storage.load_archive(&archive.game_id).unwrap();
        assert_eq!(reloaded.moves.len(), archive.moves.len());

        let _ = fs::remove_dir_all(&dir);
    }
}
