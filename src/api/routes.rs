use axum::{
    routing::{get, post},
    Router,
};

use crate::server::AppState;

use super::health::{health, stats};
use super::push::{push_to_connection, push_to_room};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        // Health & Stats
        .route("/health", get(health))
        .route("/stats", get(stats))
        // Server-push endpoints
        .nest(
            "/api/v1",
            Router::new()
                .route("/rooms/{room_id}/broadcast", post(push_to_room))
                .route("/connections/{connection_id}/send", post(push_to_connection)),
        )
}
