use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

pub type PlayerId = Uuid;

/// Lowest selectable wall height.
pub const MIN_HEIGHT: u8 = 1;
/// Highest selectable wall height.
pub const MAX_HEIGHT: u8 = 10;

pub const MIN_NAME_LEN: usize = 2;
pub const MAX_NAME_LEN: usize = 20;

/// Length of a room code. Codes are uppercase alphanumeric.
pub const ROOM_CODE_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub is_ready: bool,
    pub is_host: bool,
    pub score: i32,
    pub current_height: Option<u8>,
    pub is_connected: bool,
}

impl Player {
    pub fn new(id: PlayerId) -> Self {
        Self {
            id,
            name: String::new(),
            is_ready: false,
            is_host: false,
            score: 0,
            current_height: None,
            is_connected: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "kebab-case")]
pub enum RoomPhase {
    Lobby,
    WaitingReady,
    Selection,
    Revealing,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum GuessOutcome {
    Exact,
    Below,
    Above,
}

/// One player's line in a `wall-revealed` broadcast. Players who never
/// selected a height this round (disconnected mid-game) carry no guess,
/// no outcome and a zero delta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RoundResultEntry {
    pub player_id: PlayerId,
    pub player_name: String,
    pub guess: Option<u8>,
    pub outcome: Option<GuessOutcome>,
    pub points: i32,
    pub total_score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RoundScore {
    pub player_id: PlayerId,
    pub player_name: String,
    pub score: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct FinalScore {
    pub player_id: PlayerId,
    pub player_name: String,
    pub score: i32,
    pub rank: u32,
    pub is_winner: bool,
}

/// Room state as sent to clients. Never carries the current target —
/// the wall height is only ever disclosed through `wall-revealed`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct RoomSnapshot {
    pub code: String,
    pub phase: RoomPhase,
    pub round: u32,
    pub max_rounds: u32,
    pub players: Vec<Player>,
    pub created_at: String, // ISO 8601 string
}
