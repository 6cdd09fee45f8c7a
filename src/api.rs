//! HTTP surface: router assembly and the health endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::CollabState;
use crate::ws;

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Documents with at least one joined connection
    pub rooms: usize,
    pub connections: usize,
    pub registry_revision: u64,
}

/// GET /health
pub async fn health(State(state): State<CollabState>) -> Json<HealthResponse> {
    let stats = state.registry.stats().await;
    Json(HealthResponse {
        status: "ok",
        rooms: stats.rooms,
        connections: stats.connections,
        registry_revision: stats.revision,
    })
}

pub fn router(state: CollabState) -> Router {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
