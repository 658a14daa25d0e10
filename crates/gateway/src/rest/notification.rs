//! Notification REST endpoints

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use curalink_database::{ListOrder, Notification};
use curalink_realtime::{Event, EventKind, Routed};
use futures_util::{future, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ErrorResponse, GatewayError, GatewayResult};
use crate::middleware::CurrentUser;
use crate::state::GatewayState;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationResponse {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub notification_type: String,
    pub title: String,
    pub message: String,
    pub sender_id: Option<i64>,
    pub meeting_id: Option<i64>,
    pub call_room: Option<String>,
    /// `invited`, `accepted` or `declined`; only on video call invites
    pub call_status: Option<String>,
    pub message_preview: Option<String>,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

impl From<Notification> for NotificationResponse {
    fn from(notification: Notification) -> Self {
        Self {
            id: notification.id,
            user_id: notification.user_id,
            notification_type: notification.notification_type.to_string(),
            title: notification.title,
            message: notification.message,
            sender_id: notification.sender_id,
            meeting_id: notification.meeting_id,
            call_room: notification.call_room,
            call_status: notification.call_status.map(|status| status.to_string()),
            message_preview: notification.message_preview,
            action_url: notification.action_url,
            is_read: notification.is_read,
            created_at: notification.created_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NotificationListResponse {
    pub notifications: Vec<NotificationResponse>,
    pub unread_count: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListNotificationsQuery {
    /// `newest_first` (default) or `oldest_first`
    pub order: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
    pub unread_only: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCountResponse {
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkAllReadResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub to: i64,
    pub message: String,
}

/// How the dispatcher handled an event sent through REST
#[derive(Debug, Serialize, ToSchema)]
pub struct RouteResponse {
    /// `delivered_live`, `queued_as_notification` or `dropped`
    pub outcome: String,
    pub notification_id: Option<i64>,
    pub delivered: usize,
}

impl From<&Routed> for RouteResponse {
    fn from(routed: &Routed) -> Self {
        Self {
            outcome: routed.outcome.as_str().to_string(),
            notification_id: routed.notification.as_ref().map(|n| n.id),
            delivered: routed.delivered,
        }
    }
}

/// Create notification routes
pub fn create_notification_routes() -> Router<Arc<GatewayState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/message", post(send_message))
        .route("/notifications/:notification_id/read", put(mark_read))
        .route("/notifications/:notification_id", delete(delete_notification))
}

fn parse_order(order: Option<&str>) -> GatewayResult<ListOrder> {
    match order {
        None | Some("newest_first") | Some("newest") => Ok(ListOrder::NewestFirst),
        Some("oldest_first") | Some("oldest") => Ok(ListOrder::OldestFirst),
        Some(other) => Err(GatewayError::InvalidRequest(format!(
            "Unknown order '{other}', expected newest_first or oldest_first"
        ))),
    }
}

#[utoipa::path(
    get,
    path = "/api/notifications",
    tag = "Notifications",
    params(ListNotificationsQuery),
    responses(
        (status = 200, description = "Notifications for the current user", body = NotificationListResponse),
        (status = 400, description = "Invalid query", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn list_notifications(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Query(params): Query<ListNotificationsQuery>,
) -> GatewayResult<Json<NotificationListResponse>> {
    let order = parse_order(params.order.as_deref())?;
    let limit = params.limit.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
    let unread_only = params.unread_only.unwrap_or(false);

    let notifications: Vec<NotificationResponse> = state
        .notifications
        .list_for_user(user_id, order)
        .try_filter(|notification| future::ready(!unread_only || !notification.is_read))
        .skip(params.offset.unwrap_or(0))
        .take(limit)
        .map_ok(NotificationResponse::from)
        .try_collect()
        .await?;

    let unread_count = state.notifications.unread_count(user_id).await?;

    Ok(Json(NotificationListResponse {
        notifications,
        unread_count,
    }))
}

#[utoipa::path(
    get,
    path = "/api/notifications/unread-count",
    tag = "Notifications",
    responses(
        (status = 200, description = "Unread notification count", body = UnreadCountResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn unread_count(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<Json<UnreadCountResponse>> {
    let count = state.notifications.unread_count(user_id).await?;
    Ok(Json(UnreadCountResponse { count }))
}

#[utoipa::path(
    put,
    path = "/api/notifications/{notification_id}/read",
    tag = "Notifications",
    params(("notification_id" = i64, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Notification marked as read"),
        (status = 403, description = "Notification belongs to another user", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
pub async fn mark_read(
    Path(notification_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<StatusCode> {
    state.notifications.mark_read(notification_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/api/notifications/read-all",
    tag = "Notifications",
    responses(
        (status = 200, description = "All notifications marked as read", body = MarkAllReadResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn mark_all_read(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<Json<MarkAllReadResponse>> {
    let updated = state.notifications.mark_all_read(user_id).await?;
    Ok(Json(MarkAllReadResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/api/notifications/{notification_id}",
    tag = "Notifications",
    params(("notification_id" = i64, Path, description = "Notification ID")),
    responses(
        (status = 204, description = "Notification deleted"),
        (status = 403, description = "Notification belongs to another user", body = ErrorResponse),
        (status = 404, description = "Notification not found", body = ErrorResponse)
    )
)]
pub async fn delete_notification(
    Path(notification_id): Path<i64>,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> GatewayResult<StatusCode> {
    state.notifications.delete(notification_id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/api/notifications/message",
    tag = "Notifications",
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message routed", body = RouteResponse),
        (status = 400, description = "Invalid message", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    )
)]
pub async fn send_message(
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
    Json(payload): Json<SendMessageRequest>,
) -> GatewayResult<impl IntoResponse> {
    if payload.message.trim().is_empty() {
        return Err(GatewayError::InvalidRequest("Message must not be empty".to_string()));
    }

    let routed = state
        .dispatcher
        .route(Event::direct(
            Some(user_id),
            payload.to,
            EventKind::Chat {
                message: payload.message,
            },
        ))
        .await?;

    Ok((StatusCode::CREATED, Json(RouteResponse::from(&routed))))
}
