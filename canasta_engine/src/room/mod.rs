//! Lobby lifecycle and room management: the `RoomCoordinator` owns every
//! `ActiveGame` behind its own lock and is the only place room codes are
//! minted or player slots are assigned.

pub mod active_game;
pub mod coordinator;
pub mod errors;
pub mod room_code;

pub use active_game::{
    ActiveGame, ActiveGameHandle, PlayerSlot, RoomConfig, RoomStatus, Token, LOBBY_TTL,
};
pub use coordinator::{validate_username, RoomCoordinator};
pub use errors::CoordinatorError;
pub use room_code::{generate_unique_code, normalize_room_code};
