use axum::{extract::State, Json};
use serde::Serialize;

use rampart_core::SUBPROTOCOL;

use crate::websocket::GatewayState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: String,
}

pub async fn health_check() -> Json<HealthStatus> {
    Json(HealthStatus {
        status: "ok".to_string(),
    })
}

/// Snapshot of the session for dashboards and lobby pages.
#[derive(Serialize)]
pub struct StatusResponse {
    pub active_players: usize,
    pub current_player: String,
    pub time_left: i32,
    pub is_somebody_playing: bool,
    pub using_game_clock: bool,
    pub server_version: &'static str,
    pub protocol_version: &'static str,
}

pub async fn status(State(state): State<GatewayState>) -> Json<StatusResponse> {
    let report = state.session.lock().await.status();
    Json(StatusResponse {
        active_players: report.active_players,
        current_player: report.current_player,
        time_left: report.time_left,
        is_somebody_playing: report.is_somebody_playing,
        using_game_clock: report.using_game_clock,
        server_version: env!("CARGO_PKG_VERSION"),
        protocol_version: SUBPROTOCOL,
    })
}
