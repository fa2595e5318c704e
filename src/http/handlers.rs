use super::state::{AppState, SessionInfo};
use crate::session::SessionCoordinator;
use axum::{
    extract::ws::{WebSocket, WebSocketUpgrade},
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub count: usize,
    pub sessions: Vec<SessionSummary>,
}

/// GET /sessions/ws
/// Upgrade to the live session WebSocket; one coordinator per connection
pub async fn session_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_session(state, socket))
}

async fn handle_session(state: AppState, socket: WebSocket) {
    let session_id = format!("session-{}", uuid::Uuid::new_v4());

    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(
            session_id.clone(),
            SessionInfo {
                started_at: Utc::now(),
            },
        );
    }

    // Managers and timers all report through this one channel; the
    // coordinator's dispatch loop is the sole consumer.
    let (events_tx, events_rx) = mpsc::channel(256);
    let coordinator = SessionCoordinator::new(
        session_id.clone(),
        state.config.clone(),
        state.llm.clone(),
        state.search.clone(),
        events_tx,
    );
    coordinator.run(socket, events_rx).await;

    {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id);
    }

    info!("Session {} released", session_id);
}

/// GET /sessions
/// List active sessions
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    let summaries: Vec<SessionSummary> = sessions
        .iter()
        .map(|(id, info)| SessionSummary {
            session_id: id.clone(),
            started_at: info.started_at,
        })
        .collect();

    Json(SessionsResponse {
        count: summaries.len(),
        sessions: summaries,
    })
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
