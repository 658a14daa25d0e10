//! Video call signalling endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use curalink_realtime::CallAction;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayResult};
use crate::middleware::CurrentUser;
use crate::rest::notification::RouteResponse;
use crate::state::GatewayState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartCallRequest {
    pub to: i64,
    /// Room token shared by both sides; generated when omitted
    pub room: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartCallResponse {
    /// Id of the callee's invite notification; used to answer the call
    pub invite_id: i64,
    pub room: String,
    pub delivery: RouteResponse,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RespondToCallRequest {
    /// `accept` or `decline`; past-tense forms are accepted too
    #[schema(value_type = String, example = "accept")]
    pub action: CallAction,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RespondToCallResponse {
    pub action: String,
    /// Only present when the call was accepted
    pub room: Option<String>,
    pub delivery: RouteResponse,
}

/// Create video call routes
pub fn create_call_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/notifications/video-call", post(start_call))
        .route("/notifications/video-call/:invite_id/respond", post(respond_to_call))
}

#[utoipa::path(
    post,
    path = "/api/notifications/video-call",
    tag = "Calls",
    request_body = StartCallRequest,
    responses(
        (status = 201, description = "Invite sent to the callee", body = StartCallResponse),
        (status = 400, description = "Invalid call request", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn start_call(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<StartCallRequest>,
) -> GatewayResult<impl IntoResponse> {
    let room = payload
        .room
        .filter(|room| !room.trim().is_empty())
        .unwrap_or_else(cuid2::cuid);

    let invite = state.calls.invite(user_id, payload.to, &room).await?;

    let response = StartCallResponse {
        invite_id: invite.session.invite_id,
        room: invite.session.room,
        delivery: RouteResponse::from(&invite.routed),
    };
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/api/notifications/video-call/{invite_id}/respond",
    tag = "Calls",
    params(("invite_id" = i64, Path, description = "Invite notification ID")),
    request_body = RespondToCallRequest,
    responses(
        (status = 200, description = "Call answered", body = RespondToCallResponse),
        (status = 403, description = "Only the callee can answer", body = ErrorResponse),
        (status = 404, description = "Unknown invite", body = ErrorResponse),
        (status = 409, description = "Invite already answered", body = ErrorResponse)
    )
)]
pub async fn respond_to_call(
    Path(invite_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<RespondToCallRequest>,
) -> GatewayResult<Json<RespondToCallResponse>> {
    let response = state
        .calls
        .respond(invite_id, user_id, payload.action)
        .await?;

    Ok(Json(RespondToCallResponse {
        action: response.action.as_str().to_string(),
        room: response.room,
        delivery: RouteResponse::from(&response.routed),
    }))
}
