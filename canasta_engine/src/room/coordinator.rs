//! Room Coordinator: owns `rooms: roomCode -> ActiveGame` and
//! `usedCodes`, under a coarse coordinator lock that guards the maps only.
//! Per-room mutation goes through the `ActiveGame`'s own mutex instead of
//! the coordinator's.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rand::rng;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::game::{engine, Game, PlayerId};
use crate::room::active_game::{ActiveGame, ActiveGameHandle, PlayerSlot, RoomStatus, Token};
use crate::room::errors::CoordinatorError;
use crate::room::room_code::{generate_unique_code, normalize_room_code};

/// Validate a username: 1-20 UTF-8 characters, not whitespace-only.
pub fn validate_username(username: &str) -> Result<(), CoordinatorError> {
    let len = username.chars().count();
    if len == 0 || len > 20 {
        return Err(CoordinatorError::UsernameInvalid);
    }
    if username.trim().is_empty() {
        return Err(CoordinatorError::UsernameInvalid);
    }
    Ok(())
}

fn new_token() -> Token {
    Uuid::new_v4().to_string()
}

pub struct RoomCoordinator {
    rooms: RwLock<HashMap<String, ActiveGameHandle>>,
    used_codes: RwLock<HashSet<String>>,
    token_index: RwLock<HashMap<Token, String>>,
}

impl Default for RoomCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomCoordinator {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            used_codes: RwLock::new(HashSet::new()),
            token_index: RwLock::new(HashMap::new()),
        }
    }

    /// Used by the Lifecycle Supervisor at startup to repopulate the
    /// in-memory coordinator from persisted state, and by the Room-code
    /// Generator's uniqueness check.
    pub async fn restore_room(&self, active_game: ActiveGame) {
        let code = active_game.room_code.clone();
        for slot in active_game.players.iter() {
            if !slot.is_empty() {
                self.token_index
                    .write()
                    .await
                    .insert(slot.token.clone(), code.clone());
            }
        }
        self.used_codes.write().await.insert(code.clone());
        self.rooms
            .write()
            .await
            .insert(code, Arc::new(Mutex::new(active_game)));
    }

    pub async fn restore_used_code(&self, code: String) {
        self.used_codes.write().await.insert(code);
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }

    pub async fn get_game(&self, room_code: &str) -> Option<ActiveGameHandle> {
        self.rooms.read().await.get(room_code).cloned()
    }

    pub async fn get_game_by_token(&self, token: &str) -> Option<ActiveGameHandle> {
        let room_code = self.token_index.read().await.get(token).cloned()?;
        self.get_game(&room_code).await
    }

    /// `CreateGame(username, randomTeamOrder) -> (ActiveGame, token)`.
    pub async fn create_game(
        &self,
        username: &str,
        random_team_order: bool,
    ) -> Result<(ActiveGameHandle, Token), CoordinatorError> {
        validate_username(username)?;
        let code = {
            let used = self.used_codes.read().await;
            generate_unique_code(&used, &mut rng()).ok_or(CoordinatorError::RoomNotFound)?
        };
        self.used_codes.write().await.insert(code.clone());

        let mut active_game = ActiveGame::new(code.clone(), random_team_order);
        let token = new_token();
        active_game.players[0] = PlayerSlot {
            username: username.to_string(),
            token: token.clone(),
            connected: true,
            ready: false,
            joined_at: chrono::Utc::now(),
        };
        active_game.config.player_order[0] = username.to_string();

        let handle = Arc::new(Mutex::new(active_game));
        self.rooms.write().await.insert(code.clone(), handle.clone());
        self.token_index.write().await.insert(token.clone(), code);
        Ok((handle, token))
    }

    /// `JoinGame(code, username)`.
    pub async fn join_game(
        &self,
        room_code: &str,
        username: &str,
    ) -> Result<(ActiveGameHandle, Token, PlayerId), CoordinatorError> {
        let code = normalize_room_code(room_code).ok_or(CoordinatorError::InvalidRoomCode)?;
        validate_username(username)?;
        let handle = self
            .get_game(&code)
            .await
            .ok_or(CoordinatorError::RoomNotFound)?;

        let (token, slot) = {
            let mut active_game = handle.lock().await;
            if active_game.status != RoomStatus::Lobby {
                return Err(CoordinatorError::GameAlreadyStarted);
            }
            if active_game
                .players
                .iter()
                .any(|s| !s.is_empty() && s.username == username)
            {
                return Err(CoordinatorError::UsernameTaken);
            }
            let slot = active_game
                .lowest_empty_slot()
                .ok_or(CoordinatorError::RoomFull)?;
            let token = new_token();
            active_game.players[slot] = PlayerSlot {
                username: username.to_string(),
                token: token.clone(),
                connected: true,
                ready: false,
                joined_at: chrono::Utc::now(),
            };
            active_game.config.player_order[slot] = username.to_string();
            active_game.updated_at = chrono::Utc::now();
            (token, slot)
        };
        self.token_index.write().await.insert(token.clone(), code);
        Ok((handle, token, slot))
    }

    /// `SetReady(code, token, ready) -> allReady`.
    pub async fn set_ready(
        &self,
        handle: &ActiveGameHandle,
        token: &str,
        ready: bool,
    ) -> Result<bool, CoordinatorError> {
        let mut active_game = handle.lock().await;
        if active_game.status != RoomStatus::Lobby {
            return Err(CoordinatorError::GameAlreadyStarted);
        }
        let slot = active_game
            .find_slot_by_token(token)
            .ok_or(CoordinatorError::TokenNotFound)?;
        active_game.players[slot].ready = ready;
        active_game.updated_at = chrono::Utc::now();
        Ok(active_game.all_ready())
    }

    /// `UpdateTeamOrder(code, token, newOrder)`; caller must occupy slot 0.
    pub async fn update_team_order(
        &self,
        handle: &ActiveGameHandle,
        token: &str,
        new_order: [String; 4],
    ) -> Result<(), CoordinatorError> {
        let mut active_game = handle.lock().await;
        let slot = active_game
            .find_slot_by_token(token)
            .ok_or(CoordinatorError::TokenNotFound)?;
        if slot != 0 {
            return Err(CoordinatorError::NotInGame);
        }
        let mut current: Vec<&str> = active_game
            .config
            .player_order
            .iter()
            .map(|s| s.as_str())
            .collect();
        let mut proposed: Vec<&str> = new_order.iter().map(|s| s.as_str()).collect();
        current.sort_unstable();
        proposed.sort_unstable();
        if current != proposed {
            return Err(CoordinatorError::InvalidPlayerId);
        }
        active_game.config.player_order = new_order;
        active_game.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// `LeaveGame(code, token)`.
    pub async fn leave_game(
        &self,
        handle: &ActiveGameHandle,
        token: &str,
    ) -> Result<(), CoordinatorError> {
        let mut active_game = handle.lock().await;
        if active_game.status != RoomStatus::Lobby {
            return Err(CoordinatorError::GameAlreadyStarted);
        }
        let slot = active_game
            .find_slot_by_token(token)
            .ok_or(CoordinatorError::TokenNotFound)?;
        active_game.players[slot].connected = false;
        active_game.players[slot].ready = false;

        if slot == 0 {
            if let Some(promoted) = active_game
                .players
                .iter()
                .position(|s| s.connected && !s.is_empty())
            {
                active_game.players.swap(0, promoted);
                active_game.players[0].ready = false;
                let order = active_game
                    .players
                    .iter()
                    .map(|s| s.username.clone())
                    .collect::<Vec<_>>();
                active_game.config.player_order = [
                    order[0].clone(),
                    order[1].clone(),
                    order[2].clone(),
                    order[3].clone(),
                ];
            }
        }

        if active_game.players.iter().all(|s| !s.connected) {
            active_game.lobby_expiry = chrono::Utc::now();
        }
        active_game.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// `StartGame(code)`; requires `allReady`.
    pub async fn start_game(&self, handle: &ActiveGameHandle) -> Result<(), CoordinatorError> {
        let mut active_game = handle.lock().await;
        if !active_game.all_ready() {
            return Err(CoordinatorError::GameNotStarted);
        }
        if active_game.config.random_team_order {
            use rand::seq::SliceRandom;
            active_game.config.player_order.shuffle(&mut rng());
        }
        let order = active_game.config.player_order.clone();
        let game = engine::new_game(active_game.room_code.clone(), order, None);
        active_game.game = Some(game);
        active_game.status = RoomStatus::Playing;
        active_game.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// `MarkPlayerDisconnected(token) -> shouldPause`.
    pub async fn mark_player_disconnected(
        &self,
        handle: &ActiveGameHandle,
        token: &str,
    ) -> Result<(bool, PlayerId), CoordinatorError> {
        let mut active_game = handle.lock().await;
        let slot = active_game
            .find_slot_by_token(token)
            .ok_or(CoordinatorError::TokenNotFound)?;
        active_game.players[slot].connected = false;
        let should_pause = active_game.status == RoomStatus::Playing;
        if should_pause {
            active_game.status = RoomStatus::Paused;
        }
        active_game.updated_at = chrono::Utc::now();
        Ok((should_pause, slot))
    }

    /// `ReconnectPlayer(token, roomCode, playerId) -> resumed`.
    pub async fn reconnect_player(
        &self,
        handle: &ActiveGameHandle,
        token: &str,
        player_id: PlayerId,
    ) -> Result<bool, CoordinatorError> {
        if player_id > 3 {
            return Err(CoordinatorError::InvalidPlayerId);
        }
        let mut active_game = handle.lock().await;
        if active_game.players[player_id].token != token {
            return Err(CoordinatorError::TokenMismatch);
        }
        active_game.players[player_id].connected = true;
        let resumed = active_game.status == RoomStatus::Paused
            && active_game.players.iter().all(|s| s.connected);
        if resumed {
            active_game.status = RoomStatus::Playing;
        }
        active_game.updated_at = chrono::Utc::now();
        Ok(resumed)
    }

    /// Renders a `RoomStatus` the way the wire protocol expects it.
    pub fn game_status_string(status: RoomStatus) -> &'static str {
        match status {
            RoomStatus::Lobby => "Lobby",
            RoomStatus::Playing => "Playing",
            RoomStatus::Paused => "Paused",
            RoomStatus::Completed => "Completed",
        }
    }

    /// GC sweep: drop rooms whose lobby has expired with nobody connected.
    /// Returns the room codes removed, so the persistence layer can delete
    /// them too.
    pub async fn reap_expired_lobbies(&self) -> Vec<String> {
        let now = std::time::SystemTime::now();
        let mut removed = Vec::new();
        let mut rooms = self.rooms.write().await;
        let expired: Vec<String> = {
            let mut codes = Vec::new();
            for (code, handle) in rooms.iter() {
                let active_game = handle.lock().await;
                if active_game.is_expired(now) {
                    codes.push(code.clone());
                }
            }
            codes
        };
        for code in expired {
            rooms.remove(&code);
            removed.push(code);
        }
        removed
    }

    pub async fn all_handles(&self) -> Vec<ActiveGameHandle> {
        self.rooms.read().await.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_join_fills_lowest_empty_slot() {
        let coordinator = RoomCoordinator::new();
        let (handle, _token) = coordinator.create_game("Alice", false).await.unwrap();
        let (handle2, _t, slot) = coordinator.join_game(
            &handle.lock().await.room_code.clone(),
            "Bob",
        )
        .await
        .unwrap();
        assert_eq!(slot, 1);
        assert!(Arc::ptr_eq(&handle, &handle2));
    }

    #[tokio::test]
    async fn join_rejects_duplicate_username_case_sensitive() {
        let coordinator = RoomCoordinator::new();
        let (handle, _token) = coordinator.create_game("Alice", false).await.unwrap();
        let code = handle.lock().await.room_code.clone();
        let err = coordinator.join_game(&code, "Alice").await.unwrap_err();
        assert_eq!(err, CoordinatorError::UsernameTaken);
        // Different case is a different username.
        coordinator.join_game(&code, "alice").await.unwrap();
    }

    #[tokio::test]
    async fn join_accepts_lowercase_room_code() {
        let coordinator = RoomCoordinator::new();
        let (handle, _token) = coordinator.create_game("Alice", false).await.unwrap();
        let code = handle.lock().await.room_code.clone();
        coordinator
            .join_game(&code.to_lowercase(), "Bob")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn room_full_after_four_players() {
        let coordinator = RoomCoordinator::new();
        let (handle, _token) = coordinator.create_game("Alice", false).await.unwrap();
        let code = handle.lock().await.room_code.clone();
        coordinator.join_game(&code, "Bob").await.unwrap();
        coordinator.join_game(&code, "Carol").await.unwrap();
        coordinator.join_game(&code, "Dave").await.unwrap();
        let err = coordinator.join_game(&code, "Eve").await.unwrap_err();
        assert_eq!(err, CoordinatorError::RoomFull);
    }

    #[tokio::test]
    async fn start_game_requires_all_ready() {
        let coordinator = RoomCoordinator::new();
        let (handle, token_a) = coordinator.create_game("Alice", false).await.unwrap();
        let code = handle.lock().await.room_code.clone();
        let (_, token_b, _) = coordinator.join_game(&code, "Bob").await.unwrap();
        let (_, token_c, _) = coordinator.join_game(&code, "Carol").await.unwrap();
        let (_, token_d, _) = coordinator.join_game(&code, "Dave").await.unwrap();

        assert!(coordinator.start_game(&handle).await.is_err());

        for (token, _) in [
            (token_a.as_str(), 0),
            (token_b.as_str(), 1),
            (token_c.as_str(), 2),
            (token_d.as_str(), 3),
        ] {
            coordinator.set_ready(&handle, token, true).await.unwrap();
        }
        coordinator.start_game(&handle).await.unwrap();
        let active_game = handle.lock().await;
        assert_eq!(active_game.status, RoomStatus::Playing);
        assert!(active_game.game.is_some());
    }

    #[tokio::test]
    async fn leave_promotes_next_connected_player_to_slot_zero() {
        let coordinator = RoomCoordinator::new();
        let (handle, token_a) = coordinator.create_game("Alice", false).await.unwrap();
        let code = handle.lock().await.room_code.clone();
        coordinator.join_game(&code, "Bob").await.unwrap();
        coordinator.leave_game(&handle, &token_a).await.unwrap();
        let active_game = handle.lock().await;
        assert_eq!(active_game.players[0].username, "Bob");
    }

    #[tokio::test]
    async fn disconnect_during_play_pauses_and_reconnect_resumes() {
        let coordinator = RoomCoordinator::new();
        let (handle, token_a) = coordinator.create_game("Alice", false).await.unwrap();
        let code = handle.lock().await.room_code.clone();
        let (_, token_b, _) = coordinator.join_game(&code, "Bob").await.unwrap();
        let (_, token_c, _) = coordinator.join_game(&code, "Carol").await.unwrap();
        let (_, token_d, _) = coordinator.join_game(&code, "Dave").await.unwrap();
        for token in [&token_a, &token_b, &token_c, &token_d] {
            coordinator.set_ready(&handle, token, true).await.unwrap();
        }
        coordinator.start_game(&handle).await.unwrap();

        let (should_pause, player_id) = coordinator
            .mark_player_disconnected(&handle, &token_a)
            .await
            .unwrap();
        assert!(should_pause);
        assert_eq!(player_id, 0);
        assert_eq!(handle.lock().await.status, RoomStatus::Paused);

        let resumed = coordinator
            .reconnect_player(&handle, &token_a, 0)
            .await
            .unwrap();
        assert!(resumed);
        assert_eq!(handle.lock().await.status, RoomStatus::Playing);
    }
}
