//! Lifecycle Supervisor for the partnership Canasta lobby and game server.
//!
//! Startup order: open the store and run migrations, reload active games,
//! used room codes, and sessions into memory, spawn the periodic save,
//! cleanup, inactive-connection reaper, and abandoned-lobby reaper tasks,
//! then start accepting connections. On Ctrl+C, broadcast `server_shutdown`
//! to every live connection, save every in-memory game, and close the
//! store, all bounded by a deadline so a stuck task can't hang the process
//! forever.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Error;
use pico_args::Arguments;
use tracing::{error, info, warn};
use uuid::Uuid;

use canasta_engine::db::{
    Database, GameRepository, PgGameRepository, PgRoomCodeRepository, PgSessionRepository,
    RoomCodeRepository, SessionRepository,
};
use canasta_engine::{ConnectionMultiplexer, RoomCoordinator, Session, SessionStore};

use canasta_server::api;
use canasta_server::api::websocket::{encode, ActivityLog, ConnHandle, OutboundFrame};
use canasta_server::api::AppState;
use canasta_server::config::ServerConfig;
use canasta_server::logging;

const HELP: &str = "\
Run the partnership Canasta lobby and game server

USAGE:
  canasta_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:6969]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  CORS_ALLOWED_ORIGIN      Single trusted origin in production; permissive if unset
  (See .env file for all configuration options)
";

const PERIODIC_SAVE_INTERVAL: Duration = Duration::from_secs(30);
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60 * 60);
const CLEANUP_RETENTION: chrono::Duration = chrono::Duration::hours(24);
const REAPER_INTERVAL: Duration = Duration::from_secs(60);
const INACTIVE_CONNECTION_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const LOBBY_REAP_INTERVAL: Duration = Duration::from_secs(60);
const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists.
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let bind_override: Option<SocketAddr> = pargs.opt_value_from_str("--bind")?;
    let db_url_override: Option<String> = pargs.opt_value_from_str("--db-url")?;

    logging::init();

    let server_config = ServerConfig::from_env(bind_override, db_url_override)?;
    server_config.validate()?;

    info!(bind = %server_config.bind, "starting canasta server");

    // (a) open the store and apply migrations.
    let db = Database::new(&server_config.database).await?;
    db.migrate().await?;
    info!("database migrations applied");

    let pool = db.pool().clone();
    let games: Arc<dyn GameRepository> = Arc::new(PgGameRepository::new(pool.clone()));
    let session_repo: Arc<dyn SessionRepository> =
        Arc::new(PgSessionRepository::new(pool.clone()));
    let room_codes: Arc<dyn RoomCodeRepository> = Arc::new(PgRoomCodeRepository::new(pool));

    let coordinator = Arc::new(RoomCoordinator::new());
    let sessions = Arc::new(SessionStore::new());
    let connections: Arc<ConnectionMultiplexer<Uuid, ConnHandle>> =
        Arc::new(ConnectionMultiplexer::new());
    let activity = Arc::new(ActivityLog::default());

    // (b) LoadAllActiveGames -> repopulate the coordinator's room map.
    let active_games = games.load_all_active_games().await?;
    let restored_games = active_games.len();
    for active_game in active_games {
        coordinator.restore_room(active_game).await;
    }
    info!(count = restored_games, "restored active games");

    // (c) LoadUsedRoomCodes -> repopulate the collision set.
    let used_codes = room_codes.load_used_room_codes().await?;
    let restored_codes = used_codes.len();
    for code in used_codes {
        coordinator.restore_used_code(code).await;
    }
    info!(count = restored_codes, "restored used room codes");

    // (d) LoadAllSessions -> repopulate the token->session cache.
    let all_sessions = session_repo.load_all_sessions().await?;
    let restored_sessions = all_sessions.len();
    for record in all_sessions {
        sessions
            .restore(Session {
                token: record.token,
                room_code: record.room_code,
                player_id: record.player_id as usize,
                username: record.username,
            })
            .await;
    }
    info!(count = restored_sessions, "restored sessions");

    let state = AppState {
        coordinator: coordinator.clone(),
        sessions,
        connections: connections.clone(),
        activity: activity.clone(),
        games: games.clone(),
        session_repo,
        room_codes,
    };

    // (e) periodic save: every 30s, persist every in-memory game.
    let save_task = tokio::spawn({
        let coordinator = coordinator.clone();
        let games = games.clone();
        async move {
            let mut tick = tokio::time::interval(PERIODIC_SAVE_INTERVAL);
            loop {
                tick.tick().await;
                save_all_games(&coordinator, &games).await;
            }
        }
    });

    // (f) periodic cleanup: every hour, drop completed games older than a day.
    let cleanup_task = tokio::spawn({
        let games = games.clone();
        async move {
            let mut tick = tokio::time::interval(CLEANUP_INTERVAL);
            loop {
                tick.tick().await;
                let cutoff = chrono::Utc::now() - CLEANUP_RETENTION;
                match games.cleanup_old_games(cutoff).await {
                    Ok(deleted) if !deleted.is_empty() => {
                        info!(count = deleted.len(), "cleaned up completed games");
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "cleanup_old_games failed"),
                }
            }
        }
    });

    // (g) inactive-connection reaper: close connections silent for 5 minutes.
    let reaper_task = tokio::spawn({
        let activity = activity.clone();
        let connections = connections.clone();
        async move {
            let mut tick = tokio::time::interval(REAPER_INTERVAL);
            loop {
                tick.tick().await;
                let cutoff = Instant::now() - INACTIVE_CONNECTION_TIMEOUT;
                for conn_id in activity.stale_since(cutoff).await {
                    if let Some(tx) = connections.get_connection(&conn_id).await {
                        let _ = tx.send(OutboundFrame::Close);
                    }
                    connections.remove_connection(&conn_id).await;
                    activity.remove(&conn_id).await;
                }
            }
        }
    });

    // (g.5) abandoned-lobby reaper: drop rooms whose lobby TTL elapsed with
    // nobody connected, and delete their persisted rows so they don't come
    // back on the next restart.
    let lobby_reaper_task = tokio::spawn({
        let coordinator = coordinator.clone();
        let games = games.clone();
        async move {
            let mut tick = tokio::time::interval(LOBBY_REAP_INTERVAL);
            loop {
                tick.tick().await;
                let reaped = coordinator.reap_expired_lobbies().await;
                for room_code in reaped {
                    if let Err(e) = games.delete_game(&room_code).await {
                        error!(error = %e, room_code, "failed to delete reaped lobby");
                    } else {
                        info!(room_code, "reaped abandoned lobby");
                    }
                }
            }
        }
    });

    // (h) start accepting connections.
    let app = api::create_router(state.clone(), server_config.cors_allowed_origin.clone());
    let listener = tokio::net::TcpListener::bind(server_config.bind).await?;
    info!(
        bind = %server_config.bind,
        "server is running. Press Ctrl+C to stop."
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown signal received, entering graceful shutdown");
    save_task.abort();
    cleanup_task.abort();
    reaper_task.abort();
    lobby_reaper_task.abort();

    let shutdown = async {
        for (_, tx) in state.connections.all_connections().await {
            let _ = tx.send(OutboundFrame::Text(encode(
                "server_shutdown",
                serde_json::json!({}),
            )));
        }
        save_all_games(&coordinator, &games).await;
    };
    if tokio::time::timeout(SHUTDOWN_DEADLINE, shutdown)
        .await
        .is_err()
    {
        warn!("graceful shutdown exceeded its deadline");
    }

    db.close().await;
    info!("server stopped");
    Ok(())
}

/// Save every room the coordinator currently holds, under each room's own
/// lock, one at a time. Used by both the periodic save task and the
/// shutdown sequence.
async fn save_all_games(coordinator: &RoomCoordinator, games: &Arc<dyn GameRepository>) {
    for handle in coordinator.all_handles().await {
        let active_game = handle.lock().await;
        if let Err(e) = games.save_game(&active_game).await {
            error!(error = %e, room_code = %active_game.room_code, "periodic save failed");
        }
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
}
