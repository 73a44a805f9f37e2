//! Request Router / Broadcaster: the single WebSocket endpoint through
//! which every client action flows.
//!
//! # Connection Flow
//!
//! 1. Client connects via `GET /ws` (no token required up front).
//! 2. Client sends `create_game`, `join_game`, or `reconnect` to bind the
//!    connection to a room and player slot.
//! 3. From then on the connection is identified by its bound token; moves,
//!    readiness changes, and team-order edits flow through it.
//! 4. On disconnect, the bound player is marked disconnected; if the game
//!    is in progress this pauses it until the player reconnects.
//!
//! # Message Envelope
//!
//! Every inbound and outbound frame is `{"type": "...", "payload": {...}}`.
//! The inbound tag set and outbound tag set are both closed (see the
//! `handle_envelope` match and the `send_*` helpers below); anything else
//! is rejected with an `error` frame.

use std::collections::HashMap;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use canasta_engine::db::{GameRepository, RoomCodeRepository, SessionRecord, SessionRepository};
use canasta_engine::{
    execute_move, personalize, validate_username, ActiveGameHandle, ClientState, CoordinatorError,
    GameStateMessage, Move, MoveResult, MoveType, PlayerId, RoomStatus, Session,
};

use super::AppState;
use crate::api::rate_limiter::RateLimiter;

/// What the per-connection writer task forwards to the socket.
pub enum OutboundFrame {
    Text(String),
    Close,
}

/// Abstract handle the connection multiplexer stores for each connection:
/// an unbounded channel into the writer task, the same shape as the
/// teacher's `TableActor.subscribers: HashMap<i64, mpsc::Sender<...>>`.
pub type ConnHandle = mpsc::UnboundedSender<OutboundFrame>;

/// Registry keyed by opaque connection id, so the Connection Multiplexer
/// doesn't need to know about Axum sockets.
pub type ConnMux = canasta_engine::ConnectionMultiplexer<Uuid, ConnHandle>;

/// Tracks last-activity time per connection for the inactive-connection
/// reaper; separate from `ConnMux` since activity bookkeeping isn't part
/// of the token<->connection bimap's invariants.
#[derive(Default)]
pub struct ActivityLog {
    seen: RwLock<HashMap<Uuid, Instant>>,
}

impl ActivityLog {
    pub async fn touch(&self, conn_id: Uuid) {
        self.seen.write().await.insert(conn_id, Instant::now());
    }

    pub async fn remove(&self, conn_id: &Uuid) {
        self.seen.write().await.remove(conn_id);
    }

    pub async fn stale_since(&self, cutoff: Instant) -> Vec<Uuid> {
        self.seen
            .read()
            .await
            .iter()
            .filter(|(_, &last)| last < cutoff)
            .map(|(id, _)| *id)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    tag: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OutboundEnvelope<'a, T: Serialize> {
    #[serde(rename = "type")]
    tag: &'a str,
    payload: T,
}

pub(crate) fn encode<T: Serialize>(tag: &str, payload: T) -> String {
    serde_json::to_string(&OutboundEnvelope { tag, payload }).unwrap_or_else(|e| {
        tracing::error!(error = %e, tag, "failed to encode outbound frame");
        format!("{{\"type\":\"error\",\"payload\":{{\"code\":\"INTERNAL\",\"message\":\"encode failure\"}}}}")
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateGamePayload {
    username: String,
    #[serde(default)]
    random_team_order: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GameCreatedPayload {
    room_code: String,
    token: String,
    player_id: PlayerId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JoinGamePayload {
    room_code: String,
    username: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GameJoinedPayload {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    player_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReconnectPayload {
    token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReconnectedPayload {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    room_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    player_id: Option<PlayerId>,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetReadyPayload {
    ready: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateTeamOrderPayload {
    player_order: [String; 4],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteMovePayload {
    #[serde(rename = "type")]
    move_type: MoveType,
    #[serde(default)]
    id: Option<i64>,
    #[serde(default)]
    ids: Option<Vec<u32>>,
    #[serde(default)]
    from_foot: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LobbySlotView {
    username: String,
    ready: bool,
    connected: bool,
    is_you: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LobbyUpdatePayload {
    room_code: String,
    status: String,
    random_team_order: bool,
    all_ready: bool,
    players: Vec<LobbySlotView>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayerConnectionPayload {
    player_id: PlayerId,
    username: String,
    connected: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct PausedResumedPayload {
    room_code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionRequestedPayload {
    requesting_player: PlayerId,
    requesting_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionResponsePayload {
    approved: bool,
}

#[derive(Debug, Serialize)]
struct ErrorPayload {
    code: String,
    message: String,
}

fn error_payload(message: impl Into<String>) -> ErrorPayload {
    let message = message.into();
    let code = message
        .split_once(':')
        .map(|(code, _)| code.to_string())
        .unwrap_or_else(|| "ERROR".to_string());
    ErrorPayload { code, message }
}

/// Per-connection state the read loop mutates as `create_game`/`join_game`/
/// `reconnect` bind this socket to a room and player slot.
#[derive(Default)]
struct ConnState {
    room_code: Option<String>,
    player_id: Option<PlayerId>,
    token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundFrame>();

    state.connections.add_connection(conn_id, tx.clone()).await;
    state.activity.touch(conn_id).await;

    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match frame {
                OutboundFrame::Text(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    let mut conn_state = ConnState::default();
    let mut limiter = RateLimiter::burst();

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                state.activity.touch(conn_id).await;
                if !limiter.check() {
                    let _ = tx.send(OutboundFrame::Text(encode(
                        "error",
                        error_payload("RATE_LIMIT_EXCEEDED: too many messages, slow down"),
                    )));
                    continue;
                }
                handle_text(&text, conn_id, &tx, &mut conn_state, &state).await;
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!(error = %e, %conn_id, "websocket error");
                break;
            }
            _ => {}
        }
    }

    writer.abort();
    state.connections.remove_connection(&conn_id).await;
    state.activity.remove(&conn_id).await;
    handle_disconnect(conn_state, &state).await;
    tracing::info!(%conn_id, "websocket disconnected");
}

async fn handle_text(
    text: &str,
    conn_id: Uuid,
    tx: &ConnHandle,
    conn_state: &mut ConnState,
    state: &AppState,
) {
    let envelope: InboundEnvelope = match serde_json::from_str(text) {
        Ok(env) => env,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_JSON: {e}")),
            )));
            return;
        }
    };

    match envelope.tag.as_str() {
        "ping" => {
            let _ = tx.send(OutboundFrame::Text(encode("pong", serde_json::json!({}))));
        }
        "create_game" => handle_create_game(envelope.payload, conn_id, tx, conn_state, state).await,
        "join_game" => handle_join_game(envelope.payload, conn_id, tx, conn_state, state).await,
        "reconnect" => handle_reconnect(envelope.payload, conn_id, tx, conn_state, state).await,
        "set_ready" => handle_set_ready(envelope.payload, tx, conn_state, state).await,
        "update_team_order" => handle_update_team_order(envelope.payload, tx, conn_state, state).await,
        "leave_game" => handle_leave_game(tx, conn_state, state).await,
        "execute_move" => handle_execute_move(envelope.payload, tx, conn_state, state).await,
        other => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_MESSAGE_TYPE: {other}")),
            )));
        }
    }
}

async fn handle_create_game(
    payload: serde_json::Value,
    conn_id: Uuid,
    tx: &ConnHandle,
    conn_state: &mut ConnState,
    state: &AppState,
) {
    let req: CreateGamePayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_PAYLOAD: {e}")),
            )));
            return;
        }
    };

    if let Err(e) = validate_username(&req.username) {
        let _ = tx.send(OutboundFrame::Text(encode("error", error_payload(e.to_string()))));
        return;
    }

    match state
        .coordinator
        .create_game(&req.username, req.random_team_order)
        .await
    {
        Ok((handle, token)) => {
            let room_code = handle.lock().await.room_code.clone();
            state
                .connections
                .add_connection_with_token(conn_id, tx.clone(), token.clone())
                .await;
            conn_state.room_code = Some(room_code.clone());
            conn_state.player_id = Some(0);
            conn_state.token = Some(token.clone());

            let session = Session {
                token: token.clone(),
                room_code: room_code.clone(),
                player_id: 0,
                username: req.username.clone(),
            };
            state.sessions.insert(session).await;

            if let Err(e) = state.room_codes.save_room_code(&room_code).await {
                tracing::error!(error = %e, "failed to persist room code");
            }
            if let Err(e) = state
                .session_repo
                .save_session(&SessionRecord {
                    token: token.clone(),
                    room_code: room_code.clone(),
                    player_id: 0,
                    username: req.username.clone(),
                })
                .await
            {
                tracing::error!(error = %e, "failed to persist session");
            }
            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist new game");
                }
            }

            let _ = tx.send(OutboundFrame::Text(encode(
                "game_created",
                GameCreatedPayload {
                    room_code,
                    token,
                    player_id: 0,
                },
            )));
        }
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode("error", error_payload(e.to_string()))));
        }
    }
}

async fn handle_join_game(
    payload: serde_json::Value,
    conn_id: Uuid,
    tx: &ConnHandle,
    conn_state: &mut ConnState,
    state: &AppState,
) {
    let req: JoinGamePayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_PAYLOAD: {e}")),
            )));
            return;
        }
    };

    match state.coordinator.join_game(&req.room_code, &req.username).await {
        Ok((handle, token, player_id)) => {
            state
                .connections
                .add_connection_with_token(conn_id, tx.clone(), token.clone())
                .await;
            let room_code = handle.lock().await.room_code.clone();
            conn_state.room_code = Some(room_code.clone());
            conn_state.player_id = Some(player_id);
            conn_state.token = Some(token.clone());

            let session = Session {
                token: token.clone(),
                room_code: room_code.clone(),
                player_id,
                username: req.username.clone(),
            };
            state.sessions.insert(session).await;
            if let Err(e) = state
                .session_repo
                .save_session(&SessionRecord {
                    token: token.clone(),
                    room_code: room_code.clone(),
                    player_id: player_id as i32,
                    username: req.username.clone(),
                })
                .await
            {
                tracing::error!(error = %e, "failed to persist session");
            }
            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist game after join");
                }
            }

            let _ = tx.send(OutboundFrame::Text(encode(
                "game_joined",
                GameJoinedPayload {
                    success: true,
                    room_code: Some(room_code),
                    token: Some(token),
                    player_id: Some(player_id),
                    message: None,
                },
            )));
            broadcast_lobby_update(&handle, state).await;
        }
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "game_joined",
                GameJoinedPayload {
                    success: false,
                    room_code: None,
                    token: None,
                    player_id: None,
                    message: Some(e.to_string()),
                },
            )));
        }
    }
}

async fn handle_reconnect(
    payload: serde_json::Value,
    conn_id: Uuid,
    tx: &ConnHandle,
    conn_state: &mut ConnState,
    state: &AppState,
) {
    let req: ReconnectPayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_PAYLOAD: {e}")),
            )));
            return;
        }
    };

    let handle = match state.coordinator.get_game_by_token(&req.token).await {
        Some(h) => h,
        None => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "reconnected",
                ReconnectedPayload {
                    success: false,
                    room_code: None,
                    player_id: None,
                    message: CoordinatorError::TokenNotFound.to_string(),
                },
            )));
            return;
        }
    };

    let player_id = match handle.lock().await.find_slot_by_token(&req.token) {
        Some(id) => id,
        None => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "reconnected",
                ReconnectedPayload {
                    success: false,
                    room_code: None,
                    player_id: None,
                    message: CoordinatorError::TokenNotFound.to_string(),
                },
            )));
            return;
        }
    };

    match state
        .coordinator
        .reconnect_player(&handle, &req.token, player_id)
        .await
    {
        Ok(resumed) => {
            if let Some(old_conn) = state
                .connections
                .add_connection_with_token(conn_id, tx.clone(), req.token.clone())
                .await
            {
                if let Some(old_tx) = state.connections.get_connection(&old_conn).await {
                    let _ = old_tx.send(OutboundFrame::Text(encode(
                        "disconnected_elsewhere",
                        serde_json::json!({}),
                    )));
                    let _ = old_tx.send(OutboundFrame::Close);
                }
            }

            let room_code = handle.lock().await.room_code.clone();
            conn_state.room_code = Some(room_code.clone());
            conn_state.player_id = Some(player_id);
            conn_state.token = Some(req.token.clone());

            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist game after reconnect");
                }
            }

            let _ = tx.send(OutboundFrame::Text(encode(
                "reconnected",
                ReconnectedPayload {
                    success: true,
                    room_code: Some(room_code.clone()),
                    player_id: Some(player_id),
                    message: "reconnected".to_string(),
                },
            )));

            if resumed {
                let username = handle.lock().await.players[player_id].username.clone();
                broadcast_to_room(
                    &handle,
                    state,
                    "player_reconnected",
                    PlayerConnectionPayload { player_id, username, connected: true },
                )
                .await;
                broadcast_to_room(
                    &handle,
                    state,
                    "game_resumed",
                    PausedResumedPayload { room_code: room_code.clone() },
                )
                .await;
            }

            let status = handle.lock().await.status;
            if status == RoomStatus::Lobby {
                broadcast_lobby_update(&handle, state).await;
            } else {
                broadcast_game_state(&handle, state).await;
            }
        }
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "reconnected",
                ReconnectedPayload {
                    success: false,
                    room_code: None,
                    player_id: None,
                    message: e.to_string(),
                },
            )));
        }
    }
}

async fn handle_set_ready(
    payload: serde_json::Value,
    tx: &ConnHandle,
    conn_state: &ConnState,
    state: &AppState,
) {
    let Some(handle) = bound_handle(conn_state, state).await else {
        send_not_in_game(tx);
        return;
    };
    let req: SetReadyPayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_PAYLOAD: {e}")),
            )));
            return;
        }
    };
    let token = conn_state.token.clone().unwrap_or_default();

    match state.coordinator.set_ready(&handle, &token, req.ready).await {
        Ok(all_ready) => {
            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist game after set_ready");
                }
            }
            broadcast_lobby_update(&handle, state).await;
            if all_ready {
                if let Err(e) = state.coordinator.start_game(&handle).await {
                    tracing::error!(error = %e, "start_game failed after all_ready");
                } else {
                    {
                        let active_game = handle.lock().await;
                        if let Err(e) = state.games.save_game(&active_game).await {
                            tracing::error!(error = %e, "failed to persist game after start");
                        }
                    }
                    let room_code = handle.lock().await.room_code.clone();
                    broadcast_to_room(
                        &handle,
                        state,
                        "game_started",
                        PausedResumedPayload { room_code },
                    )
                    .await;
                    broadcast_game_state(&handle, state).await;
                }
            }
        }
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode("error", error_payload(e.to_string()))));
        }
    }
}

async fn handle_update_team_order(
    payload: serde_json::Value,
    tx: &ConnHandle,
    conn_state: &ConnState,
    state: &AppState,
) {
    let Some(handle) = bound_handle(conn_state, state).await else {
        send_not_in_game(tx);
        return;
    };
    let req: UpdateTeamOrderPayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "error",
                error_payload(format!("INVALID_PAYLOAD: {e}")),
            )));
            return;
        }
    };
    let token = conn_state.token.clone().unwrap_or_default();

    match state
        .coordinator
        .update_team_order(&handle, &token, req.player_order)
        .await
    {
        Ok(()) => {
            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist game after update_team_order");
                }
            }
            broadcast_lobby_update(&handle, state).await;
        }
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode("error", error_payload(e.to_string()))));
        }
    }
}

async fn handle_leave_game(tx: &ConnHandle, conn_state: &mut ConnState, state: &AppState) {
    let Some(handle) = bound_handle(conn_state, state).await else {
        send_not_in_game(tx);
        return;
    };
    let token = conn_state.token.clone().unwrap_or_default();

    match state.coordinator.leave_game(&handle, &token).await {
        Ok(()) => {
            if let Some(conn) = state.connections.get_connection_by_token(&token).await {
                state.connections.remove_connection(&conn).await;
            }
            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist game after leave");
                }
            }
            broadcast_lobby_update(&handle, state).await;
            conn_state.room_code = None;
            conn_state.player_id = None;
            conn_state.token = None;
        }
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode("error", error_payload(e.to_string()))));
        }
    }
}

async fn handle_execute_move(
    payload: serde_json::Value,
    tx: &ConnHandle,
    conn_state: &ConnState,
    state: &AppState,
) {
    let Some(handle) = bound_handle(conn_state, state).await else {
        let _ = tx.send(OutboundFrame::Text(encode(
            "move_result",
            MoveResult::err(CoordinatorError::NotInGame.to_string()),
        )));
        return;
    };
    let Some(player_id) = conn_state.player_id else {
        let _ = tx.send(OutboundFrame::Text(encode(
            "move_result",
            MoveResult::err(CoordinatorError::NotInGame.to_string()),
        )));
        return;
    };
    let req: ExecuteMovePayload = match serde_json::from_value(payload) {
        Ok(r) => r,
        Err(e) => {
            let _ = tx.send(OutboundFrame::Text(encode(
                "move_result",
                MoveResult::err(format!("INVALID_PAYLOAD: {e}")),
            )));
            return;
        }
    };
    let mv = Move {
        player_id,
        move_type: req.move_type,
        id: req.id,
        ids: req.ids,
        from_foot: req.from_foot,
    };

    let mut active_game = handle.lock().await;
    if active_game.status == RoomStatus::Paused {
        drop(active_game);
        let _ = tx.send(OutboundFrame::Text(encode(
            "move_result",
            MoveResult::err(CoordinatorError::GamePaused.to_string()),
        )));
        return;
    }
    if active_game.status == RoomStatus::Completed {
        drop(active_game);
        let _ = tx.send(OutboundFrame::Text(encode(
            "move_result",
            MoveResult::err(CoordinatorError::GameCompleted.to_string()),
        )));
        return;
    }
    let Some(game) = active_game.game.as_mut() else {
        drop(active_game);
        let _ = tx.send(OutboundFrame::Text(encode(
            "move_result",
            MoveResult::err(CoordinatorError::GameNotStarted.to_string()),
        )));
        return;
    };

    match execute_move(game, &mv) {
        Ok(outcome) => {
            active_game.updated_at = chrono::Utc::now();
            if let Err(e) = state.games.save_game(&active_game).await {
                tracing::error!(error = %e, "failed to persist game after move");
            }

            if let Some((requester, partner)) = outcome.go_out_requested {
                let requesting_name = active_game.players[requester].username.clone();
                let partner_token = active_game.players[partner].token.clone();
                if let Some(conn) = state.connections.get_connection_by_token(&partner_token).await {
                    if let Some(partner_tx) = state.connections.get_connection(&conn).await {
                        let _ = partner_tx.send(OutboundFrame::Text(encode(
                            "permission_requested",
                            PermissionRequestedPayload {
                                requesting_player: requester,
                                requesting_name,
                            },
                        )));
                    }
                }
            }
            if let Some((requester, approved)) = outcome.go_out_responded {
                let requester_token = active_game.players[requester].token.clone();
                if let Some(conn) = state.connections.get_connection_by_token(&requester_token).await
                {
                    if let Some(requester_tx) = state.connections.get_connection(&conn).await {
                        let _ = requester_tx.send(OutboundFrame::Text(encode(
                            "permission_response",
                            PermissionResponsePayload { approved },
                        )));
                    }
                }
            }

            let room_code = active_game.room_code.clone();
            if outcome.hand_ended {
                send_snapshot_to_room(&active_game, state, "hand_ended", &room_code).await;
            }
            if outcome.game_ended {
                active_game.status = RoomStatus::Completed;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist completed game");
                }
                send_snapshot_to_room(&active_game, state, "game_ended", &room_code).await;
            }

            send_game_state_to_room(&active_game, state).await;
            drop(active_game);
            let _ = tx.send(OutboundFrame::Text(encode("move_result", MoveResult::ok())));
        }
        Err(e) => {
            drop(active_game);
            let _ = tx.send(OutboundFrame::Text(encode(
                "move_result",
                MoveResult::err(e.to_string()),
            )));
        }
    }
}

async fn handle_disconnect(conn_state: ConnState, state: &AppState) {
    let (Some(room_code), Some(token)) = (conn_state.room_code, conn_state.token) else {
        return;
    };
    let Some(handle) = state.coordinator.get_game(&room_code).await else {
        return;
    };
    match state.coordinator.mark_player_disconnected(&handle, &token).await {
        Ok((should_pause, player_id)) => {
            let username = handle.lock().await.players[player_id].username.clone();
            broadcast_to_room(
                &handle,
                state,
                "player_disconnected",
                PlayerConnectionPayload { player_id, username, connected: false },
            )
            .await;
            if should_pause {
                broadcast_to_room(
                    &handle,
                    state,
                    "game_paused",
                    PausedResumedPayload { room_code: room_code.clone() },
                )
                .await;
            }
            {
                let active_game = handle.lock().await;
                if let Err(e) = state.games.save_game(&active_game).await {
                    tracing::error!(error = %e, "failed to persist game after disconnect");
                }
            }
        }
        Err(e) => {
            tracing::debug!(error = %e, "mark_player_disconnected failed on socket close");
        }
    }
}

async fn bound_handle(conn_state: &ConnState, state: &AppState) -> Option<ActiveGameHandle> {
    let room_code = conn_state.room_code.as_ref()?;
    state.coordinator.get_game(room_code).await
}

fn send_not_in_game(tx: &ConnHandle) {
    let _ = tx.send(OutboundFrame::Text(encode(
        "error",
        error_payload(CoordinatorError::NotInGame.to_string()),
    )));
}

async fn broadcast_lobby_update(handle: &ActiveGameHandle, state: &AppState) {
    let active_game = handle.lock().await;
    let all_ready = active_game.all_ready();
    let status = super_status_string(active_game.status);
    let players: Vec<LobbySlotView> = active_game
        .players
        .iter()
        .map(|slot| LobbySlotView {
            username: slot.username.clone(),
            ready: slot.ready,
            connected: slot.connected,
            is_you: false,
        })
        .collect();
    let room_code = active_game.room_code.clone();
    let random_team_order = active_game.config.random_team_order;

    for slot in active_game.players.iter() {
        if slot.is_empty() {
            continue;
        }
        let Some(conn) = state.connections.get_connection_by_token(&slot.token).await else {
            continue;
        };
        let Some(tx) = state.connections.get_connection(&conn).await else {
            continue;
        };
        let mut players = players.clone();
        for (i, p) in players.iter_mut().enumerate() {
            p.is_you = active_game.players[i].token == slot.token;
        }
        let _ = tx.send(OutboundFrame::Text(encode(
            "lobby_update",
            LobbyUpdatePayload {
                room_code: room_code.clone(),
                status: status.clone(),
                random_team_order,
                all_ready,
                players,
            },
        )));
    }
}

async fn broadcast_game_state(handle: &ActiveGameHandle, state: &AppState) {
    let active_game = handle.lock().await;
    send_game_state_to_room(&active_game, state).await;
}

async fn send_game_state_to_room(
    active_game: &canasta_engine::ActiveGame,
    state: &AppState,
) {
    let Some(game) = active_game.game.as_ref() else {
        return;
    };
    let status = super_status_string(active_game.status);
    for (i, slot) in active_game.players.iter().enumerate() {
        if slot.is_empty() {
            continue;
        }
        let Some(conn) = state.connections.get_connection_by_token(&slot.token).await else {
            continue;
        };
        let Some(tx) = state.connections.get_connection(&conn).await else {
            continue;
        };
        let view: ClientState = personalize(game, i);
        let _ = tx.send(OutboundFrame::Text(encode(
            "game_state",
            GameStateMessage {
                state: view,
                current_player: game.current_player,
                phase: game.phase,
                status: status.clone(),
            },
        )));
    }
}

async fn send_snapshot_to_room(
    active_game: &canasta_engine::ActiveGame,
    state: &AppState,
    tag: &str,
    room_code: &str,
) {
    for slot in active_game.players.iter() {
        if slot.is_empty() {
            continue;
        }
        let Some(conn) = state.connections.get_connection_by_token(&slot.token).await else {
            continue;
        };
        let Some(tx) = state.connections.get_connection(&conn).await else {
            continue;
        };
        let _ = tx.send(OutboundFrame::Text(encode(
            tag,
            PausedResumedPayload { room_code: room_code.to_string() },
        )));
    }
}

async fn broadcast_to_room<T: Serialize + Clone>(
    handle: &ActiveGameHandle,
    state: &AppState,
    tag: &str,
    payload: T,
) {
    let active_game = handle.lock().await;
    for slot in active_game.players.iter() {
        if slot.is_empty() {
            continue;
        }
        let Some(conn) = state.connections.get_connection_by_token(&slot.token).await else {
            continue;
        };
        let Some(tx) = state.connections.get_connection(&conn).await else {
            continue;
        };
        let _ = tx.send(OutboundFrame::Text(encode(tag, payload.clone())));
    }
}

fn super_status_string(status: RoomStatus) -> String {
    canasta_engine::RoomCoordinator::game_status_string(status).to_string()
}
