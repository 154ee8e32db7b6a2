use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

/// Everything that can go wrong with a player action. Each variant is
/// terminal for the attempt that produced it and is reported to the acting
/// connection only, never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum RoomError {
    #[error("room {code} not found")]
    RoomNotFound { code: String },
    #[error("you are not in a room")]
    PlayerNotInRoom,
    #[error("you are already in a room")]
    AlreadyInRoom,
    #[error("that action is not allowed right now")]
    InvalidPhase,
    #[error("a name must be set before readying up")]
    NameRequired,
    #[error("the name {name:?} is already taken")]
    NameTaken { name: String },
    #[error("names must be {min} to {max} characters")]
    NameLength { min: usize, max: usize },
    #[error("height must be between {min} and {max}")]
    HeightOutOfRange { min: u8, max: u8 },
    #[error("the room is full")]
    RoomFull,
    #[error("the server cannot host more rooms right now")]
    TooManyRooms,
    #[error("room code space exhausted")]
    CodeSpaceExhausted,
}
