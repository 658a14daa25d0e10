//! Meeting request REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use curalink_database::{MeetingRequest, ScheduledMeeting};
use curalink_realtime::{MeetingDecision, MeetingTransition};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{ErrorResponse, GatewayResult};
use crate::middleware::CurrentUser;
use crate::rest::notification::RouteResponse;
use crate::state::GatewayState;

#[derive(Debug, Serialize, ToSchema)]
pub struct MeetingRequestResponse {
    pub id: i64,
    pub requester_id: i64,
    pub expert_id: i64,
    pub message: String,
    pub preferred_time: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<MeetingRequest> for MeetingRequestResponse {
    fn from(request: MeetingRequest) -> Self {
        Self {
            id: request.id,
            requester_id: request.requester_id,
            expert_id: request.expert_id,
            message: request.message,
            preferred_time: request.preferred_time,
            status: request.status.to_string(),
            created_at: request.created_at,
            updated_at: request.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ScheduledMeetingResponse {
    pub id: i64,
    pub organizer_id: i64,
    pub participant_id: i64,
    pub scheduled_for: String,
    pub duration_minutes: i64,
}

impl From<ScheduledMeeting> for ScheduledMeetingResponse {
    fn from(meeting: ScheduledMeeting) -> Self {
        Self {
            id: meeting.id,
            organizer_id: meeting.organizer_id,
            participant_id: meeting.participant_id,
            scheduled_for: meeting.scheduled_for,
            duration_minutes: meeting.duration_minutes,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeetingDetailResponse {
    pub request: MeetingRequestResponse,
    pub meeting: Option<ScheduledMeetingResponse>,
    /// How the counterpart was notified, when this call notified anyone
    pub delivery: Option<RouteResponse>,
}

impl From<MeetingTransition> for MeetingDetailResponse {
    fn from(transition: MeetingTransition) -> Self {
        Self {
            delivery: Some(RouteResponse::from(&transition.routed)),
            request: transition.request.into(),
            meeting: transition.meeting.map(Into::into),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeetingListResponse {
    pub sent: Vec<MeetingRequestResponse>,
    pub received: Vec<MeetingRequestResponse>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateMeetingRequestBody {
    pub expert_id: i64,
    pub message: String,
    /// RFC 3339 time the requester would like to meet
    pub preferred_time: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMeetingStatusRequest {
    /// `accepted` or `rejected`; `accept` and `reject` work too
    #[schema(value_type = String, example = "accepted")]
    pub status: MeetingDecision,
}

/// Create meeting routes
pub fn create_meeting_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/meetings", get(list_meetings).post(create_meeting))
        .route("/meetings/:request_id", get(get_meeting).delete(delete_meeting))
        .route("/meetings/:request_id/status", put(update_meeting_status))
        .route("/meetings/:request_id/cancel", post(cancel_meeting))
}

#[utoipa::path(
    post,
    path = "/api/meetings",
    tag = "Meetings",
    request_body = CreateMeetingRequestBody,
    responses(
        (status = 201, description = "Meeting request created", body = MeetingDetailResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 404, description = "Expert not found", body = ErrorResponse),
        (status = 409, description = "A request is already pending", body = ErrorResponse)
    )
)]
pub async fn create_meeting(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<CreateMeetingRequestBody>,
) -> GatewayResult<impl IntoResponse> {
    let transition = state
        .meetings
        .create(user_id, payload.expert_id, &payload.message, payload.preferred_time)
        .await?;

    Ok((StatusCode::CREATED, Json(MeetingDetailResponse::from(transition))))
}

#[utoipa::path(
    get,
    path = "/api/meetings",
    tag = "Meetings",
    responses(
        (status = 200, description = "Requests sent and received", body = MeetingListResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn list_meetings(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<Json<MeetingListResponse>> {
    let overview = state.meetings.list_for_user(user_id).await?;

    Ok(Json(MeetingListResponse {
        sent: overview.sent.into_iter().map(Into::into).collect(),
        received: overview.received.into_iter().map(Into::into).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/api/meetings/{request_id}",
    tag = "Meetings",
    params(("request_id" = i64, Path, description = "Meeting request ID")),
    responses(
        (status = 200, description = "Meeting request", body = MeetingDetailResponse),
        (status = 403, description = "Not a party to the request", body = ErrorResponse),
        (status = 404, description = "Meeting request not found", body = ErrorResponse)
    )
)]
pub async fn get_meeting(
    Path(request_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<Json<MeetingDetailResponse>> {
    let request = state.meetings.get(request_id, user_id).await?;
    let meeting = state.meetings.scheduled_meeting(request_id, user_id).await?;

    Ok(Json(MeetingDetailResponse {
        request: request.into(),
        meeting: meeting.map(Into::into),
        delivery: None,
    }))
}

#[utoipa::path(
    put,
    path = "/api/meetings/{request_id}/status",
    tag = "Meetings",
    params(("request_id" = i64, Path, description = "Meeting request ID")),
    request_body = UpdateMeetingStatusRequest,
    responses(
        (status = 200, description = "Meeting request resolved", body = MeetingDetailResponse),
        (status = 403, description = "Only the expert can respond", body = ErrorResponse),
        (status = 404, description = "Meeting request not found", body = ErrorResponse),
        (status = 409, description = "Meeting request is no longer pending", body = ErrorResponse)
    )
)]
pub async fn update_meeting_status(
    Path(request_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<UpdateMeetingStatusRequest>,
) -> GatewayResult<Json<MeetingDetailResponse>> {
    let transition = state
        .meetings
        .respond(request_id, user_id, payload.status)
        .await?;

    Ok(Json(transition.into()))
}

#[utoipa::path(
    post,
    path = "/api/meetings/{request_id}/cancel",
    tag = "Meetings",
    params(("request_id" = i64, Path, description = "Meeting request ID")),
    responses(
        (status = 200, description = "Meeting request cancelled", body = MeetingRequestResponse),
        (status = 403, description = "Only the requester can cancel", body = ErrorResponse),
        (status = 409, description = "Meeting request is no longer pending", body = ErrorResponse)
    )
)]
pub async fn cancel_meeting(
    Path(request_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<Json<MeetingRequestResponse>> {
    let request = state.meetings.cancel(request_id, user_id).await?;
    Ok(Json(request.into()))
}

#[utoipa::path(
    delete,
    path = "/api/meetings/{request_id}",
    tag = "Meetings",
    params(("request_id" = i64, Path, description = "Meeting request ID")),
    responses(
        (status = 204, description = "Meeting request deleted"),
        (status = 403, description = "Only the requester can delete", body = ErrorResponse),
        (status = 409, description = "Meeting request is no longer pending", body = ErrorResponse)
    )
)]
pub async fn delete_meeting(
    Path(request_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<StatusCode> {
    state.meetings.delete(request_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
