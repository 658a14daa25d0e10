//! Live-only announcements to every connected user

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use curalink_realtime::{Event, EventKind};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::middleware::CurrentUser;
use crate::rest::notification::RouteResponse;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct BroadcastRequest {
    /// For example `new_forum` or `new_post`
    pub topic: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
}

/// Create broadcast routes
pub fn create_broadcast_routes() -> Router<Arc<GatewayState>> {
    Router::new().route("/broadcasts", post(create_broadcast))
}

#[utoipa::path(
    post,
    path = "/api/broadcasts",
    tag = "Broadcasts",
    request_body = BroadcastRequest,
    responses(
        (status = 202, description = "Broadcast pushed to live connections", body = RouteResponse),
        (status = 400, description = "Invalid broadcast", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn create_broadcast(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<BroadcastRequest>,
) -> GatewayResult<impl IntoResponse> {
    let topic = payload.topic.trim();
    if topic.is_empty() {
        return Err(GatewayError::InvalidRequest("Topic must not be empty".to_string()));
    }

    let routed = state
        .dispatcher
        .route(Event::broadcast(
            Some(user_id),
            EventKind::Broadcast {
                topic: topic.to_string(),
                payload: payload.payload,
            },
        ))
        .await?;

    Ok((StatusCode::ACCEPTED, Json(RouteResponse::from(&routed))))
}
