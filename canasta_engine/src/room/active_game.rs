//! `PlayerSlot`, `ActiveGame`, and the lobby-level `RoomConfig`.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::game::{Game, PlayerId};

pub type Token = String;

/// Lobby-level per-slot record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSlot {
    pub username: String,
    pub token: Token,
    pub connected: bool,
    pub ready: bool,
    pub joined_at: chrono::DateTime<chrono::Utc>,
}

impl PlayerSlot {
    pub fn empty() -> Self {
        Self {
            username: String::new(),
            token: String::new(),
            connected: false,
            ready: false,
            joined_at: chrono::Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty()
    }
}

impl Default for PlayerSlot {
    fn default() -> Self {
        Self::empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomConfig {
    pub player_order: [String; 4],
    pub random_team_order: bool,
}

impl RoomConfig {
    pub fn new(random_team_order: bool) -> Self {
        Self {
            player_order: Default::default(),
            random_team_order,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoomStatus {
    Lobby,
    Playing,
    Paused,
    Completed,
}

/// The room-level container: `{roomCode, game, config, status, players[4],
/// createdAt, updatedAt, lobbyExpiry}`. The per-game mutex (see
/// `room::coordinator`) wraps this whole struct, since the lock must guard
/// both the lobby fields and the inner `Game`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveGame {
    pub room_code: String,
    pub game: Option<Game>,
    pub config: RoomConfig,
    pub status: RoomStatus,
    pub players: [PlayerSlot; 4],
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub lobby_expiry: chrono::DateTime<chrono::Utc>,
}

pub const LOBBY_TTL: Duration = Duration::from_secs(10 * 60);

impl ActiveGame {
    pub fn new(room_code: String, random_team_order: bool) -> Self {
        let now = chrono::Utc::now();
        Self {
            room_code,
            game: None,
            config: RoomConfig::new(random_team_order),
            status: RoomStatus::Lobby,
            players: Default::default(),
            created_at: now,
            updated_at: now,
            lobby_expiry: now + chrono::Duration::from_std(LOBBY_TTL).unwrap(),
        }
    }

    pub fn find_slot_by_token(&self, token: &str) -> Option<PlayerId> {
        self.players.iter().position(|s| s.token == token)
    }

    pub fn lowest_empty_slot(&self) -> Option<PlayerId> {
        self.players.iter().position(|s| s.is_empty())
    }

    pub fn all_ready(&self) -> bool {
        self.players.iter().all(|s| !s.is_empty() && s.ready)
    }

    pub fn is_expired(&self, now: SystemTime) -> bool {
        let now: chrono::DateTime<chrono::Utc> = now.into();
        self.status == RoomStatus::Lobby && now >= self.lobby_expiry
    }
}

/// Shared handle type used throughout the coordinator: the per-`ActiveGame`
/// mutex, held across the whole move-processing critical section
/// (pre-state capture -> ExecuteMove -> persist -> broadcast).
pub type ActiveGameHandle = Arc<Mutex<ActiveGame>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_active_game_has_four_empty_slots() {
        let ag = ActiveGame::new("ABCD".into(), false);
        assert!(ag.players.iter().all(|s| s.is_empty()));
        assert_eq!(ag.status, RoomStatus::Lobby);
    }

    #[test]
    fn all_ready_requires_every_slot_filled_and_ready() {
        let mut ag = ActiveGame::new("ABCD".into(), false);
        assert!(!ag.all_ready());
        for i in 0..4 {
            ag.players[i] = PlayerSlot {
                username: format!("p{i}"),
                token: format!("t{i}"),
                connected: true,
                ready: true,
                joined_at: chrono::Utc::now(),
            };
        }
        assert!(ag.all_ready());
        ag.players[2].ready = false;
        assert!(!ag.all_ready());
    }
}
