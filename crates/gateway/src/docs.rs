//! OpenAPI document for the REST surface

use utoipa::OpenApi;

use crate::error::ErrorResponse;
use crate::rest;

#[derive(OpenApi)]
#[openapi(
    paths(
        rest::health::health_check,
        rest::notification::list_notifications,
        rest::notification::unread_count,
        rest::notification::mark_read,
        rest::notification::mark_all_read,
        rest::notification::delete_notification,
        rest::notification::send_message,
        rest::call::start_call,
        rest::call::respond_to_call,
        rest::meeting::create_meeting,
        rest::meeting::list_meetings,
        rest::meeting::get_meeting,
        rest::meeting::update_meeting_status,
        rest::meeting::cancel_meeting,
        rest::meeting::delete_meeting,
        rest::broadcast::create_broadcast,
    ),
    components(
        schemas(
            ErrorResponse,
            rest::health::HealthResponse,
            rest::notification::NotificationResponse,
            rest::notification::NotificationListResponse,
            rest::notification::UnreadCountResponse,
            rest::notification::MarkAllReadResponse,
            rest::notification::SendMessageRequest,
            rest::notification::RouteResponse,
            rest::call::StartCallRequest,
            rest::call::StartCallResponse,
            rest::call::RespondToCallRequest,
            rest::call::RespondToCallResponse,
            rest::meeting::MeetingRequestResponse,
            rest::meeting::ScheduledMeetingResponse,
            rest::meeting::MeetingDetailResponse,
            rest::meeting::MeetingListResponse,
            rest::meeting::CreateMeetingRequestBody,
            rest::meeting::UpdateMeetingStatusRequest,
            rest::broadcast::BroadcastRequest,
        )
    ),
    tags(
        (name = "Health", description = "Service health"),
        (name = "Notifications", description = "Durable per-user notifications"),
        (name = "Calls", description = "Video call signalling"),
        (name = "Meetings", description = "Meeting requests between patients and experts"),
        (name = "Broadcasts", description = "Live announcements to connected users"),
    )
)]
pub struct ApiDoc;
