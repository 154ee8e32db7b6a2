use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::{FinalScore, Player, PlayerId, RoomSnapshot, RoundResultEntry, RoundScore};

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum ClientMessage {
    CreateRoom,
    JoinRoom { code: String },
    SetName { name: String },
    MarkReady,
    SubmitGuess { height: u8 },
    GiveRestartConsent,
    Heartbeat,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    RoomCreated { code: String, player_id: PlayerId },
    RoomJoined { room: RoomSnapshot },
    RoomError { message: String },
    PlayerListUpdated { players: Vec<Player> },
    GameStarted { max_rounds: u32 },
    RoundStarted { round_number: u32, duration_seconds: u64 },
    SelectionLocked,
    WallRevealed { target: u8, results: Vec<RoundResultEntry> },
    RoundEnded { scores: Vec<RoundScore> },
    GameEnded { final_scores: Vec<FinalScore> },
    RestartStatus { consents: usize, total: usize },
    PlayerDisconnected { player_id: PlayerId },
    PlayerLeft { player_id: PlayerId, player_name: String },
}
