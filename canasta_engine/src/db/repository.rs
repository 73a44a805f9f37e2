//! Repository trait definitions for the persistence layer:
//! `games`, `sessions`, `room_codes`. Trait-based so the coordinator and
//! lifecycle supervisor are testable without a live Postgres instance.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use thiserror::Error;

use crate::room::active_game::{ActiveGame, RoomStatus};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// A session row: `{token, roomCode, playerID, username}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub token: String,
    pub room_code: String,
    pub player_id: i32,
    pub username: String,
}

/// `games(room_code PK, status, game_data JSONB, created_at, updated_at)`.
#[async_trait]
pub trait GameRepository: Send + Sync {
    async fn save_game(&self, game: &ActiveGame) -> RepositoryResult<()>;
    async fn load_game(&self, room_code: &str) -> RepositoryResult<Option<ActiveGame>>;
    /// `status != Completed`, used to repopulate the coordinator at startup.
    async fn load_all_active_games(&self) -> RepositoryResult<Vec<ActiveGame>>;
    /// Also frees the room code (`room_codes.in_use = false`); cascades to
    /// `sessions` via `ON DELETE CASCADE`.
    async fn delete_game(&self, room_code: &str) -> RepositoryResult<()>;
    /// Deletes `Completed` games whose `updated_at` predates `older_than`,
    /// freeing their room codes. Returns the deleted room codes.
    async fn cleanup_old_games(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> RepositoryResult<Vec<String>>;
}

/// `sessions(token PK, room_code FK ON DELETE CASCADE, player_id, username,
/// created_at)`.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn save_session(&self, session: &SessionRecord) -> RepositoryResult<()>;
    async fn load_session(&self, token: &str) -> RepositoryResult<Option<SessionRecord>>;
    async fn load_all_sessions(&self) -> RepositoryResult<Vec<SessionRecord>>;
    async fn delete_session(&self, token: &str) -> RepositoryResult<()>;
}

/// `room_codes(code PK, in_use, created_at)`.
#[async_trait]
pub trait RoomCodeRepository: Send + Sync {
    async fn save_room_code(&self, code: &str) -> RepositoryResult<()>;
    async fn load_used_room_codes(&self) -> RepositoryResult<Vec<String>>;
}

fn status_to_str(status: RoomStatus) -> &'static str {
    match status {
        RoomStatus::Lobby => "lobby",
        RoomStatus::Playing => "playing",
        RoomStatus::Paused => "paused",
        RoomStatus::Completed => "completed",
    }
}

/// Raw-query Postgres implementation (no `query!` macro, so the crate
/// compiles without a live database).
pub struct PgGameRepository {
    pool: PgPool,
}

impl PgGameRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GameRepository for PgGameRepository {
    async fn save_game(&self, game: &ActiveGame) -> RepositoryResult<()> {
        let data = serde_json::to_value(game)?;
        sqlx::query(
            "INSERT INTO games (room_code, status, game_data, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (room_code) DO UPDATE
               SET status = EXCLUDED.status,
                   game_data = EXCLUDED.game_data,
                   updated_at = EXCLUDED.updated_at",
        )
        .bind(&game.room_code)
        .bind(status_to_str(game.status))
        .bind(data)
        .bind(game.created_at)
        .bind(game.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_game(&self, room_code: &str) -> RepositoryResult<Option<ActiveGame>> {
        let row = sqlx::query("SELECT game_data FROM games WHERE room_code = $1")
            .bind(room_code)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(r) => {
                let data: serde_json::Value = r.get("game_data");
                Ok(Some(serde_json::from_value(data)?))
            }
            None => Ok(None),
        }
    }

    async fn load_all_active_games(&self) -> RepositoryResult<Vec<ActiveGame>> {
        let rows = sqlx::query("SELECT game_data FROM games WHERE status != 'completed'")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|r| {
                let data: serde_json::Value = r.get("game_data");
                Ok(serde_json::from_value(data)?)
            })
            .collect()
    }

    async fn delete_game(&self, room_code: &str) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM games WHERE room_code = $1")
            .bind(room_code)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE room_codes SET in_use = FALSE WHERE code = $1")
            .bind(room_code)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn cleanup_old_games(
        &self,
        older_than: chrono::DateTime<chrono::Utc>,
    ) -> RepositoryResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT room_code FROM games WHERE status = 'completed' AND updated_at < $1",
        )
        .bind(older_than)
        .fetch_all(&self.pool)
        .await?;
        let codes: Vec<String> = rows.into_iter().map(|r| r.get("room_code")).collect();
        for code in &codes {
            self.delete_game(code).await?;
        }
        Ok(codes)
    }
}

pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn save_session(&self, session: &SessionRecord) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO sessions (token, room_code, player_id, username, created_at)
             VALUES ($1, $2, $3, $4, NOW())
             ON CONFLICT (token) DO UPDATE
               SET room_code = EXCLUDED.room_code,
                   player_id = EXCLUDED.player_id,
                   username = EXCLUDED.username",
        )
        .bind(&session.token)
        .bind(&session.room_code)
        .bind(session.player_id)
        .bind(&session.username)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_session(&self, token: &str) -> RepositoryResult<Option<SessionRecord>> {
        let row = sqlx::query(
            "SELECT token, room_code, player_id, username FROM sessions WHERE token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| SessionRecord {
            token: r.get("token"),
            room_code: r.get("room_code"),
            player_id: r.get("player_id"),
            username: r.get("username"),
        }))
    }

    async fn load_all_sessions(&self) -> RepositoryResult<Vec<SessionRecord>> {
        let rows = sqlx::query("SELECT token, room_code, player_id, username FROM sessions")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|r| SessionRecord {
                token: r.get("token"),
                room_code: r.get("room_code"),
                player_id: r.get("player_id"),
                username: r.get("username"),
            })
            .collect())
    }

    async fn delete_session(&self, token: &str) -> RepositoryResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgRoomCodeRepository {
    pool: PgPool,
}

impl PgRoomCodeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoomCodeRepository for PgRoomCodeRepository {
    async fn save_room_code(&self, code: &str) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO room_codes (code, in_use, created_at) VALUES ($1, TRUE, NOW())
             ON CONFLICT (code) DO UPDATE SET in_use = TRUE",
        )
        .bind(code)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_used_room_codes(&self) -> RepositoryResult<Vec<String>> {
        let rows = sqlx::query("SELECT code FROM room_codes")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get("code")).collect())
    }
}

/// In-memory stand-ins used by the coordinator/lifecycle-supervisor tests
/// and by `canasta_server`'s integration tests, so neither needs a live
/// Postgres.
#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MockGameRepository {
        games: Mutex<HashMap<String, ActiveGame>>,
    }

    #[async_trait]
    impl GameRepository for MockGameRepository {
        async fn save_game(&self, game: &ActiveGame) -> RepositoryResult<()> {
            self.games
                .lock()
                .unwrap()
                .insert(game.room_code.clone(), game.clone());
            Ok(())
        }

        async fn load_game(&self, room_code: &str) -> RepositoryResult<Option<ActiveGame>> {
            Ok(self.games.lock().unwrap().get(room_code).cloned())
        }

        async fn load_all_active_games(&self) -> RepositoryResult<Vec<ActiveGame>> {
            Ok(self
                .games
                .lock()
                .unwrap()
                .values()
                .filter(|g| g.status != RoomStatus::Completed)
                .cloned()
                .collect())
        }

        async fn delete_game(&self, room_code: &str) -> RepositoryResult<()> {
            self.games.lock().unwrap().remove(room_code);
            Ok(())
        }

        async fn cleanup_old_games(
            &self,
            older_than: chrono::DateTime<chrono::Utc>,
        ) -> RepositoryResult<Vec<String>> {
            let mut games = self.games.lock().unwrap();
            let stale: Vec<String> = games
                .values()
                .filter(|g| g.status == RoomStatus::Completed && g.updated_at < older_than)
                .map(|g| g.room_code.clone())
                .collect();
            for code in &stale {
                games.remove(code);
            }
            Ok(stale)
        }
    }

    #[derive(Default)]
    pub struct MockSessionRepository {
        sessions: Mutex<HashMap<String, SessionRecord>>,
    }

    #[async_trait]
    impl SessionRepository for MockSessionRepository {
        async fn save_session(&self, session: &SessionRecord) -> RepositoryResult<()> {
            self.sessions
                .lock()
                .unwrap()
                .insert(session.token.clone(), session.clone());
            Ok(())
        }

        async fn load_session(&self, token: &str) -> RepositoryResult<Option<SessionRecord>> {
            Ok(self.sessions.lock().unwrap().get(token).cloned())
        }

        async fn load_all_sessions(&self) -> RepositoryResult<Vec<SessionRecord>> {
            Ok(self.sessions.lock().unwrap().values().cloned().collect())
        }

        async fn delete_session(&self, token: &str) -> RepositoryResult<()> {
            self.sessions.lock().unwrap().remove(token);
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct MockRoomCodeRepository {
        codes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RoomCodeRepository for MockRoomCodeRepository {
        async fn save_room_code(&self, code: &str) -> RepositoryResult<()> {
            self.codes.lock().unwrap().push(code.to_string());
            Ok(())
        }

        async fn load_used_room_codes(&self) -> RepositoryResult<Vec<String>> {
            Ok(self.codes.lock().unwrap().clone())
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn mock_game_repository_round_trips() {
            let repo = MockGameRepository::default();
            let game = ActiveGame::new("ABCD".into(), false);
            repo.save_game(&game).await.unwrap();
            let loaded = repo.load_game("ABCD").await.unwrap().unwrap();
            assert_eq!(loaded.room_code, "ABCD");
            assert_eq!(repo.load_all_active_games().await.unwrap().len(), 1);
            repo.delete_game("ABCD").await.unwrap();
            assert!(repo.load_game("ABCD").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn mock_session_repository_round_trips() {
            let repo = MockSessionRepository::default();
            let session = SessionRecord {
                token: "t1".into(),
                room_code: "ABCD".into(),
                player_id: 0,
                username: "Alice".into(),
            };
            repo.save_session(&session).await.unwrap();
            assert_eq!(
                repo.load_session("t1").await.unwrap().unwrap().username,
                "Alice"
            );
            repo.delete_session("t1").await.unwrap();
            assert!(repo.load_session("t1").await.unwrap().is_none());
        }

        #[tokio::test]
        async fn mock_cleanup_old_games_deletes_completed_and_stale_only() {
            let repo = MockGameRepository::default();
            let mut stale = ActiveGame::new("AAAA".into(), false);
            stale.status = RoomStatus::Completed;
            stale.updated_at = chrono::Utc::now() - chrono::Duration::hours(48);
            let mut fresh = ActiveGame::new("BBBB".into(), false);
            fresh.status = RoomStatus::Completed;
            fresh.updated_at = chrono::Utc::now();
            repo.save_game(&stale).await.unwrap();
            repo.save_game(&fresh).await.unwrap();
            let deleted = repo
                .cleanup_old_games(chrono::Utc::now() - chrono::Duration::hours(24))
                .await
                .unwrap();
            assert_eq!(deleted, vec!["AAAA".to_string()]);
            assert!(repo.load_game("BBBB").await.unwrap().is_some());
        }
    }
}
