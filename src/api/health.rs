//! Health check and statistics endpoints.

use axum::{extract::State, Json};
use serde::Serialize;
use std::collections::HashMap;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub connections: ConnectionHealthResponse,
}

#[derive(Debug, Serialize)]
pub struct ConnectionHealthResponse {
    pub total: usize,
    pub rooms: usize,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub connections: usize,
    pub rooms: usize,
    pub room_sizes: HashMap<String, usize>,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let stats = state.hub.stats();

    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        connections: ConnectionHealthResponse {
            total: stats.connections,
            rooms: stats.rooms,
        },
    })
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    let stats = state.hub.stats();

    Json(StatsResponse {
        connections: stats.connections,
        rooms: stats.rooms,
        room_sizes: stats.room_sizes,
    })
}
