use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One side of the board. Player 1 always holds white.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    White,
    Black,
}

impl Side {
    /// Side to move at a given ply. Ply 0 is white's first move.
    pub fn for_ply(ply: u32) -> Side {
        if ply % 2 == 0 {
            Side::White
        } else {
            Side::Black
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Side::White => "White",
            Side::Black => "Black",
        }
    }
}

/// Game status as reported by the backend: in progress, or a terminal
/// reason string passed through opaquely (PLAYER1_WON, DRAW, ...).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum GameStatus {
    InProgress,
    Ended(String),
}

impl From<String> for GameStatus {
    fn from(raw: String) -> Self {
        if raw == "IN_PROGRESS" {
            GameStatus::InProgress
        } else {
            GameStatus::Ended(raw)
        }
    }
}

impl GameStatus {
    pub fn in_progress(&self) -> bool {
        matches!(self, GameStatus::InProgress)
    }
}

/// Open draw offer state for the current game.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DrawOfferState {
    #[default]
    None,
    OfferedBy(i64),
    /// The backend's sentinel for an offer that was declined.
    Rejected,
}

impl DrawOfferState {
    /// Whether the draw prompt should be shown to this viewer. Never for
    /// one's own offer and never for the rejected sentinel.
    pub fn prompts(&self, viewer_id: i64) -> bool {
        matches!(self, DrawOfferState::OfferedBy(id) if *id != viewer_id)
    }
}

/// One half-move in the game history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveRecord {
    /// Ply count after this move was played (1 for white's first move).
    pub ply: u32,
    /// Side that played the move.
    pub side: Side,
    pub uci: String,
    pub san: Option<String>,
}

impl MoveRecord {
    pub fn notation(&self) -> &str {
        self.san.as_deref().unwrap_or(&self.uci)
    }
}

/// The authoritative view of one game as seen by this client.
///
/// Replace-on-write: every accepted update overwrites the fields it carries
/// and leaves the rest alone. `current_ply` never decreases across accepted
/// updates within a session.
#[derive(Debug, Clone, PartialEq)]
pub struct GameSnapshot {
    pub game_id: i64,
    /// White player.
    pub player1_id: i64,
    /// Black player.
    pub player2_id: i64,
    pub status: GameStatus,
    pub current_ply: u32,
    pub fen: String,
    /// Remaining whole seconds at the last move; `None` for an untimed game.
    pub white_time: Option<u32>,
    pub black_time: Option<u32>,
    pub last_move_at: Option<DateTime<Utc>>,
    pub draw_offer: DrawOfferState,
    pub moves: Vec<MoveRecord>,
}

impl GameSnapshot {
    pub fn side_to_move(&self) -> Side {
        Side::for_ply(self.current_ply)
    }
}

/// Which inbound channel delivered an update. The two are merged identically;
/// the source only matters for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateSource {
    Poll,
    Push,
}

/// A partial update from either channel. A `None` field was absent on the
/// wire and leaves the stored value unchanged; the nested options on the time
/// fields distinguish "absent" from "untimed".
#[derive(Debug, Clone, Default)]
pub struct GameUpdate {
    pub game_id: Option<i64>,
    pub player1_id: Option<i64>,
    pub player2_id: Option<i64>,
    pub status: Option<GameStatus>,
    pub current_ply: Option<u32>,
    pub fen: Option<String>,
    pub white_time: Option<Option<u32>>,
    pub black_time: Option<Option<u32>>,
    pub last_move_at: Option<DateTime<Utc>>,
    pub draw_offer: Option<DrawOfferState>,
    /// Full history replacement (poll payloads carry the whole list).
    pub moves: Option<Vec<MoveRecord>>,
    /// Single half-move to append (push frames report just the last move).
    pub appended_move_uci: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ply_parity_gives_side_to_move() {
        assert_eq!(Side::for_ply(0), Side::White);
        assert_eq!(Side::for_ply(1), Side::Black);
        assert_eq!(Side::for_ply(4), Side::White);
        assert_eq!(Side::for_ply(5), Side::Black);
    }

    #[test]
    fn status_parses_in_progress_and_terminal_reasons() {
        assert_eq!(GameStatus::from("IN_PROGRESS".to_string()), GameStatus::InProgress);
        assert_eq!(
            GameStatus::from("PLAYER2_WON".to_string()),
            GameStatus::Ended("PLAYER2_WON".to_string())
        );
    }

    #[test]
    fn draw_prompt_skips_own_offer_and_rejected_sentinel() {
        assert!(DrawOfferState::OfferedBy(7).prompts(5));
        assert!(!DrawOfferState::OfferedBy(5).prompts(5));
        assert!(!DrawOfferState::Rejected.prompts(5));
        assert!(!DrawOfferState::None.prompts(5));
    }
}
