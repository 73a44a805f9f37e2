//! Lobby / auth / routing error taxonomy, returned by the Room
//! Coordinator, Session Store, and Connection Multiplexer.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("INVALID_ROOM_CODE: room codes are 4 letters A-Z")]
    InvalidRoomCode,

    #[error("USERNAME_INVALID: username must be 1-20 characters and not whitespace-only")]
    UsernameInvalid,

    #[error("ROOM_NOT_FOUND: no room with that code exists")]
    RoomNotFound,

    #[error("ROOM_FULL: the room has no empty slot")]
    RoomFull,

    #[error("GAME_ALREADY_STARTED: the game has already started")]
    GameAlreadyStarted,

    #[error("USERNAME_TAKEN: that username is already in this room")]
    UsernameTaken,

    #[error("GAME_NOT_STARTED: the game has not started yet")]
    GameNotStarted,

    #[error("NOT_IN_GAME: you do not hold a slot in this room")]
    NotInGame,

    #[error("TOKEN_NOT_FOUND: no session exists for that token")]
    TokenNotFound,

    #[error("TOKEN_MISMATCH: that token does not match the named player")]
    TokenMismatch,

    #[error("INVALID_PLAYER_ID: player id must be 0-3")]
    InvalidPlayerId,

    #[error("GAME_PAUSED: the game is paused")]
    GamePaused,

    #[error("GAME_COMPLETED: the game has ended")]
    GameCompleted,
}

impl CoordinatorError {
    pub fn code(&self) -> &'static str {
        match self {
            CoordinatorError::InvalidRoomCode => "INVALID_ROOM_CODE",
            CoordinatorError::UsernameInvalid => "USERNAME_INVALID",
            CoordinatorError::RoomNotFound => "ROOM_NOT_FOUND",
            CoordinatorError::RoomFull => "ROOM_FULL",
            CoordinatorError::GameAlreadyStarted => "GAME_ALREADY_STARTED",
            CoordinatorError::UsernameTaken => "USERNAME_TAKEN",
            CoordinatorError::GameNotStarted => "GAME_NOT_STARTED",
            CoordinatorError::NotInGame => "NOT_IN_GAME",
            CoordinatorError::TokenNotFound => "TOKEN_NOT_FOUND",
            CoordinatorError::TokenMismatch => "TOKEN_MISMATCH",
            CoordinatorError::InvalidPlayerId => "INVALID_PLAYER_ID",
            CoordinatorError::GamePaused => "GAME_PAUSED",
            CoordinatorError::GameCompleted => "GAME_COMPLETED",
        }
    }
}
