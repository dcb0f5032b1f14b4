use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ClientError;
use crate::models::snapshot::{DrawOfferState, GameStatus, GameUpdate, MoveRecord, Side};

/// Game modes offered by the backend. Standard games carry no clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum GameType {
    Standard,
    Blitz,
    Rapid,
}

impl GameType {
    /// Wire spelling for the `gameType` query parameter.
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::Standard => "STANDARD",
            GameType::Blitz => "BLITZ",
            GameType::Rapid => "RAPID",
        }
    }
}

impl std::fmt::Display for GameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GameType::Standard => "standard",
            GameType::Blitz => "blitz",
            GameType::Rapid => "rapid",
        };
        write!(f, "{}", label)
    }
}

/// `drawOfferedBy` on the wire: a player id, or the string sentinel.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DrawOfferWire {
    Id(i64),
    Sentinel(String),
}

/// Map the wire draw-offer field into store state. The outer option is
/// "field absent"; the inner one is the JSON null meaning no open offer.
fn draw_offer_from_wire(
    wire: Option<Option<DrawOfferWire>>,
) -> Result<Option<DrawOfferState>, ClientError> {
    match wire {
        None => Ok(None),
        Some(None) => Ok(Some(DrawOfferState::None)),
        Some(Some(DrawOfferWire::Id(id))) => Ok(Some(DrawOfferState::OfferedBy(id))),
        Some(Some(DrawOfferWire::Sentinel(s))) if s == "REJECTED" => {
            Ok(Some(DrawOfferState::Rejected))
        }
        Some(Some(DrawOfferWire::Sentinel(s))) => Err(ClientError::MalformedPayload(format!(
            "unknown draw-offer sentinel: {}",
            s
        ))),
    }
}

/// Deserialize a field into `Option<Option<T>>` so that an absent field and
/// an explicit null stay distinguishable after parsing.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Accept both RFC 3339 instants and the backend's zone-less
/// `LocalDateTime` serialization, which is UTC by contract.
fn instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&s, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|naive| Utc.from_utc_datetime(&naive))
            })
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

/// One entry of the `moves` array in a game payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveItem {
    pub ply: u32,
    pub uci: String,
    #[serde(default)]
    pub san: Option<String>,
}

impl From<MoveItem> for MoveRecord {
    fn from(item: MoveItem) -> MoveRecord {
        MoveRecord {
            ply: item.ply,
            side: Side::for_ply(item.ply.saturating_sub(1)),
            uci: item.uci,
            san: item.san,
        }
    }
}

/// Full game payload from `GET /games/{id}` and `POST /games`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GamePayload {
    pub game_id: i64,
    pub player1_id: i64,
    pub player2_id: i64,
    pub status: GameStatus,
    #[serde(default)]
    pub game_type: Option<String>,
    pub current_ply: u32,
    pub fen: String,
    #[serde(default, deserialize_with = "double_option")]
    pub white_time: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub black_time: Option<Option<u32>>,
    #[serde(default, deserialize_with = "instant")]
    pub last_move_timestamp: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "double_option")]
    pub draw_offered_by: Option<Option<DrawOfferWire>>,
    #[serde(default)]
    pub moves: Option<Vec<MoveItem>>,
}

impl GamePayload {
    pub fn into_update(self) -> Result<GameUpdate, ClientError> {
        let draw_offer = draw_offer_from_wire(self.draw_offered_by)?;
        Ok(GameUpdate {
            game_id: Some(self.game_id),
            player1_id: Some(self.player1_id),
            player2_id: Some(self.player2_id),
            status: Some(self.status),
            current_ply: Some(self.current_ply),
            fen: Some(self.fen),
            white_time: self.white_time,
            black_time: self.black_time,
            last_move_at: self.last_move_timestamp,
            draw_offer,
            moves: self
                .moves
                .map(|list| list.into_iter().map(MoveRecord::from).collect()),
            appended_move_uci: None,
        })
    }
}

/// Body of `POST /games/{id}/move`.
#[derive(Debug, Clone, Serialize)]
pub struct MoveBody {
    pub uci: String,
}

/// Matchmaking responses carry a match id with two sentinels.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResponse {
    pub match_id: i64,
}

/// Still waiting for an opponent.
pub const MATCH_WAITING: i64 = -1;
/// The queue gave up on us.
pub const MATCH_FAILED: i64 = -2;

/// Command frame sent on the push channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ChannelCommand {
    Subscribe { topic: String },
    Publish { destination: String, uci: String },
}

/// Update frame received on the push channel. Everything past the topic is
/// optional; a frame may carry as little as a draw-offer change. Push frames
/// have no server timestamp, so the clock anchor is the receipt instant.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelUpdate {
    pub topic: String,
    #[serde(default)]
    pub fen: Option<String>,
    #[serde(default)]
    pub status: Option<GameStatus>,
    #[serde(default)]
    pub current_ply: Option<u32>,
    #[serde(default)]
    pub uci: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub white_time: Option<Option<u32>>,
    #[serde(default, deserialize_with = "double_option")]
    pub black_time: Option<Option<u32>>,
    /// "WHITE" or "BLACK". Informational only; ply is the ordering key.
    #[serde(default)]
    pub next_turn: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub draw_offered_by: Option<Option<DrawOfferWire>>,
}

impl ChannelUpdate {
    pub fn into_update(self, received_at: DateTime<Utc>) -> Result<GameUpdate, ClientError> {
        let draw_offer = draw_offer_from_wire(self.draw_offered_by)?;
        Ok(GameUpdate {
            status: self.status,
            current_ply: self.current_ply,
            fen: self.fen,
            white_time: self.white_time,
            black_time: self.black_time,
            last_move_at: Some(received_at),
            draw_offer,
            appended_move_uci: self.uci,
            ..GameUpdate::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_payload_parses_timed_game_with_history() {
        let raw = r#"{
            "gameId": 42,
            "player1Id": 5,
            "player2Id": 7,
            "status": "IN_PROGRESS",
            "gameType": "BLITZ",
            "currentPly": 2,
            "fen": "rnbqkbnr/pppp1ppp/8/4p3/4P3/8/PPPP1PPP/RNBQKBNR w KQkq - 0 2",
            "whiteTime": 175,
            "blackTime": 180,
            "lastMoveTimestamp": "2026-08-06T12:00:00",
            "drawOfferedBy": null,
            "moves": [
                {"ply": 1, "uci": "e2e4", "san": "e4"},
                {"ply": 2, "uci": "e7e5"}
            ]
        }"#;
        let payload: GamePayload = serde_json::from_str(raw).unwrap();
        let update = payload.into_update().unwrap();
        assert_eq!(update.game_id, Some(42));
        assert_eq!(update.current_ply, Some(2));
        assert_eq!(update.white_time, Some(Some(175)));
        assert_eq!(update.draw_offer, Some(DrawOfferState::None));
        let moves = update.moves.unwrap();
        assert_eq!(moves.len(), 2);
        assert_eq!(moves[0].side, Side::White);
        assert_eq!(moves[0].notation(), "e4");
        assert_eq!(moves[1].side, Side::Black);
        assert_eq!(moves[1].notation(), "e7e5");
        assert!(update.last_move_at.is_some());
    }

    #[test]
    fn untimed_game_parses_null_clocks() {
        let raw = r#"{
            "gameId": 1,
            "player1Id": 9,
            "player2Id": 9,
            "status": "IN_PROGRESS",
            "currentPly": 0,
            "fen": "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "whiteTime": null,
            "blackTime": null
        }"#;
        let update: GameUpdate = serde_json::from_str::<GamePayload>(raw)
            .unwrap()
            .into_update()
            .unwrap();
        assert_eq!(update.white_time, Some(None));
        assert_eq!(update.black_time, Some(None));
        // Absent fields stay absent rather than becoming "no offer".
        assert_eq!(update.draw_offer, None);
    }

    #[test]
    fn draw_offer_wire_maps_ids_and_sentinel() {
        let offered: GamePayload = serde_json::from_str(
            r#"{"gameId":1,"player1Id":5,"player2Id":7,"status":"IN_PROGRESS",
                "currentPly":0,"fen":"-","drawOfferedBy":7}"#,
        )
        .unwrap();
        assert_eq!(
            offered.into_update().unwrap().draw_offer,
            Some(DrawOfferState::OfferedBy(7))
        );

        let rejected: GamePayload = serde_json::from_str(
            r#"{"gameId":1,"player1Id":5,"player2Id":7,"status":"IN_PROGRESS",
                "currentPly":0,"fen":"-","drawOfferedBy":"REJECTED"}"#,
        )
        .unwrap();
        assert_eq!(
            rejected.into_update().unwrap().draw_offer,
            Some(DrawOfferState::Rejected)
        );

        let unknown: GamePayload = serde_json::from_str(
            r#"{"gameId":1,"player1Id":5,"player2Id":7,"status":"IN_PROGRESS",
                "currentPly":0,"fen":"-","drawOfferedBy":"LATER"}"#,
        )
        .unwrap();
        assert!(unknown.into_update().is_err());
    }

    #[test]
    fn channel_update_keeps_only_reported_fields() {
        let raw = r#"{"topic":"game/42","fen":"8/8/8/8/8/8/8/8 w - - 0 1","uci":"e2e4","nextTurn":"BLACK"}"#;
        let frame: ChannelUpdate = serde_json::from_str(raw).unwrap();
        let received_at = Utc.with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap();
        let update = frame.into_update(received_at).unwrap();
        assert_eq!(update.current_ply, None);
        assert_eq!(update.appended_move_uci.as_deref(), Some("e2e4"));
        assert_eq!(update.last_move_at, Some(received_at));
        assert_eq!(update.white_time, None);
        assert_eq!(update.status, None);
    }

    #[test]
    fn channel_command_frames_serialize_with_action_tag() {
        let subscribe = serde_json::to_string(&ChannelCommand::Subscribe {
            topic: "game/42".to_string(),
        })
        .unwrap();
        assert_eq!(subscribe, r#"{"action":"subscribe","topic":"game/42"}"#);

        let publish = serde_json::to_string(&ChannelCommand::Publish {
            destination: "game/42/move".to_string(),
            uci: "e2e4".to_string(),
        })
        .unwrap();
        assert_eq!(
            publish,
            r#"{"action":"publish","destination":"game/42/move","uci":"e2e4"}"#
        );
    }

    #[test]
    fn match_response_sentinels() {
        let waiting: MatchResponse = serde_json::from_str(r#"{"matchId":-1}"#).unwrap();
        assert_eq!(waiting.match_id, MATCH_WAITING);
        let found: MatchResponse = serde_json::from_str(r#"{"matchId":42}"#).unwrap();
        assert!(found.match_id > 0);
        assert_ne!(MATCH_FAILED, MATCH_WAITING);
    }
}
