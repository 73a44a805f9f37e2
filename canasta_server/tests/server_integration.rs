//! Integration tests for the HTTP/WebSocket server surface.
//!
//! Run against an in-process router with mock repositories — no live
//! Postgres required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;

use canasta_engine::db::repository::mock::{
    MockGameRepository, MockRoomCodeRepository, MockSessionRepository,
};
use canasta_engine::{ConnectionMultiplexer, RoomCoordinator, SessionStore};
use canasta_server::api::websocket::ActivityLog;
use canasta_server::api::{create_router, AppState};

fn test_state() -> AppState {
    AppState {
        coordinator: Arc::new(RoomCoordinator::new()),
        sessions: Arc::new(SessionStore::new()),
        connections: Arc::new(ConnectionMultiplexer::new()),
        activity: Arc::new(ActivityLog::default()),
        games: Arc::new(MockGameRepository::default()),
        session_repo: Arc::new(MockSessionRepository::default()),
        room_codes: Arc::new(MockRoomCodeRepository::default()),
    }
}

#[tokio::test]
async fn health_check_reports_zero_rooms_on_a_fresh_server() {
    let app = create_router(test_state(), None);

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["rooms"], 0);
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn ws_endpoint_rejects_a_plain_get_without_upgrade_headers() {
    let app = create_router(test_state(), None);

    let request = Request::builder()
        .uri("/ws")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_ne!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unrestricted_cors_origin_allows_any_request() {
    let app = create_router(test_state(), None);

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/health")
        .header("origin", "https://example.com")
        .header("access-control-request-method", "GET")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn four_players_can_create_join_ready_and_start() {
    let coordinator = RoomCoordinator::new();

    let (handle, _host_token) = coordinator.create_game("Alice".into(), false).await.unwrap();
    let room_code = handle.lock().await.room_code.clone();

    for name in ["Bob", "Carol", "Dave"] {
        coordinator.join_game(&room_code, name.into()).await.unwrap();
    }

    for token in handle
        .lock()
        .await
        .players
        .iter()
        .map(|slot| slot.token.clone())
        .collect::<Vec<_>>()
    {
        let all_ready = coordinator.set_ready(&handle, &token, true).await.unwrap();
        if all_ready {
            coordinator.start_game(&handle).await.unwrap();
        }
    }

    let active_game = handle.lock().await;
    assert!(active_game.game.is_some());
    assert_eq!(active_game.status, canasta_engine::RoomStatus::Playing);
}

#[tokio::test]
async fn room_codes_are_accepted_case_insensitively_on_join() {
    let coordinator = RoomCoordinator::new();
    let (handle, _token) = coordinator.create_game("Alice".into(), false).await.unwrap();
    let room_code = handle.lock().await.room_code.clone();

    let joined = coordinator
        .join_game(&room_code.to_lowercase(), "Bob".into())
        .await;
    assert!(joined.is_ok());
}

#[tokio::test]
async fn duplicate_username_in_the_same_room_is_rejected() {
    let coordinator = RoomCoordinator::new();
    let (handle, _token) = coordinator.create_game("Alice".into(), false).await.unwrap();
    let room_code = handle.lock().await.room_code.clone();

    let result = coordinator.join_game(&room_code, "Alice".into()).await;
    assert!(matches!(
        result,
        Err(canasta_engine::CoordinatorError::UsernameTaken)
    ));
}
