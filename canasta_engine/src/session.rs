//! Session Store: `token -> Session`, surviving disconnection.
//! Backed by a `tokio::sync::RwLock<HashMap<...>>`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::game::PlayerId;

/// `{token, roomCode, playerID, username}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub room_code: String,
    pub player_id: PlayerId,
    pub username: String,
}

#[derive(Default)]
pub struct SessionStore {
    tokens: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Session) {
        self.tokens.write().await.insert(session.token.clone(), session);
    }

    pub async fn get(&self, token: &str) -> Option<Session> {
        self.tokens.read().await.get(token).cloned()
    }

    pub async fn remove(&self, token: &str) -> Option<Session> {
        self.tokens.write().await.remove(token)
    }

    pub async fn all(&self) -> Vec<Session> {
        self.tokens.read().await.values().cloned().collect()
    }

    /// Used by the Lifecycle Supervisor to repopulate the store from
    /// `LoadAllSessions` at startup.
    pub async fn restore(&self, session: Session) {
        self.insert(session).await;
    }
}
