use std::sync::Arc;

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Users with a live WebSocket right now
    pub connections: usize,
    pub accepting_connections: bool,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service health status", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<Arc<GatewayState>>) -> Json<HealthResponse> {
    let accepting_connections = state.registry.is_accepting().await;

    Json(HealthResponse {
        status: if accepting_connections { "ok" } else { "draining" }.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        connections: state.registry.connected_count().await,
        accepting_connections,
    })
}
