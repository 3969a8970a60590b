//! HTTP API endpoints for observing rooms.
//!
//! Read-only: every change goes through the websocket command path.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::SessionError;
use crate::protocol::ServerMessage;
use crate::state::room::{CommandRecord, Room};
use crate::state::AppState;
use crate::store::room_path;
use crate::types::Phase;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/rooms/{code}", get(get_room))
        .route("/api/rooms/{code}/store", get(get_room_document))
        .route("/api/rooms/{code}/log", get(get_command_log))
}

fn error_response(status: StatusCode, e: SessionError) -> Response {
    (status, Json(ServerMessage::from(e))).into_response()
}

fn not_found(code: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, SessionError::RoomNotFound(code.to_string()))
}

/// Raw room data names every role, so it is only served while nothing is
/// hidden: in the lobby and once a winner is known
fn check_inspectable(room: &Room) -> Result<(), Response> {
    if room.session.phase == Phase::Lobby || room.is_over() {
        Ok(())
    } else {
        Err(error_response(
            StatusCode::CONFLICT,
            SessionError::WrongPhase {
                action: "inspect the room",
                phase: room.session.phase,
            },
        ))
    }
}

/// Spectator snapshot of a room.
///
/// GET /api/rooms/{code}
pub async fn get_room(State(state): State<Arc<AppState>>, Path(code): Path<String>) -> Response {
    match state.snapshot_for(&code, None).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(_) => not_found(&code),
    }
}

/// The room as last written to the session store.
///
/// GET /api/rooms/{code}/store
pub async fn get_room_document(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    {
        let rooms = state.rooms.read().await;
        let Some(room) = rooms.get(&code) else {
            return not_found(&code);
        };
        if let Err(response) = check_inspectable(room) {
            return response;
        }
    }
    match state.store.read(&room_path(&code)).await {
        Some(document) => Json(document).into_response(),
        None => not_found(&code),
    }
}

/// Accepted commands in the order they were applied.
///
/// GET /api/rooms/{code}/log
pub async fn get_command_log(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Response {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(&code) else {
        return not_found(&code);
    };
    if let Err(response) = check_inspectable(room) {
        return response;
    }
    let log: Vec<CommandRecord> = room.command_log().to_vec();
    Json(log).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::state::room::Command;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_room_endpoints() {
        let state = Arc::new(AppState::new(ServerConfig::default()));
        let ticket = state.create_room("Host".to_string()).await.unwrap();
        state
            .execute(&ticket.room_code, &ticket.participant_id, Command::FillWithBots)
            .await
            .unwrap();
        let app = routes().with_state(state.clone());

        let (status, json) = get_json(app.clone(), &format!("/api/rooms/{}", ticket.room_code)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["session"]["phase"], "LOBBY");
        assert_eq!(json["participants"].as_array().unwrap().len(), 8);

        let (status, json) =
            get_json(app.clone(), &format!("/api/rooms/{}/store", ticket.room_code)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["participants"].as_object().unwrap().len(), 8);

        let (status, json) = get_json(app.clone(), &format!("/api/rooms/{}/log", ticket.room_code)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[0]["command"]["t"], "fill_with_bots");

        let (status, json) = get_json(app, "/api/rooms/NOPE42").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "ROOM_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_raw_room_data_hidden_during_session() {
        let state = Arc::new(AppState::new(ServerConfig::default()));
        let ticket = state.create_room("Host".to_string()).await.unwrap();
        let code = ticket.room_code.clone();
        for command in [Command::FillWithBots, Command::Start] {
            state
                .execute(&code, &ticket.participant_id, command)
                .await
                .unwrap();
        }
        let app = routes().with_state(state.clone());

        for uri in [format!("/api/rooms/{}/store", code), format!("/api/rooms/{}/log", code)] {
            let (status, json) = get_json(app.clone(), &uri).await;
            assert_eq!(status, StatusCode::CONFLICT);
            assert_eq!(json["code"], "WRONG_PHASE");
        }

        // The spectator view stays available and shows no roles
        let (status, json) = get_json(app.clone(), &format!("/api/rooms/{}", code)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["participants"]
            .as_array()
            .unwrap()
            .iter()
            .all(|p| p["role"].is_null()));

        if let Some(room) = state.rooms.write().await.get_mut(&code) {
            room.adjust_resources(100, 0);
        }
        let (status, json) = get_json(app, &format!("/api/rooms/{}/log", code)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json[1]["command"]["t"], "start");
    }
}
