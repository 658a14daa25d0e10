//! Notification entity definitions

use serde::{Deserialize, Serialize};

/// Durable, per-recipient notification record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub sender_id: Option<i64>,
    pub meeting_id: Option<i64>,
    pub call_room: Option<String>,
    pub call_status: Option<CallStatus>,
    pub message_preview: Option<String>,
    pub action_url: Option<String>,
    pub is_read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateNotificationRequest {
    pub user_id: i64,
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub sender_id: Option<i64>,
    pub meeting_id: Option<i64>,
    pub call_room: Option<String>,
    pub call_status: Option<CallStatus>,
    pub message_preview: Option<String>,
    pub action_url: Option<String>,
    /// RFC 3339 timestamp; assigned on insert when absent.
    pub created_at: Option<String>,
}

impl CreateNotificationRequest {
    pub fn new(
        user_id: i64,
        notification_type: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            notification_type,
            title: title.into(),
            message: message.into(),
            sender_id: None,
            meeting_id: None,
            call_room: None,
            call_status: None,
            message_preview: None,
            action_url: None,
            created_at: None,
        }
    }

    pub fn with_sender(mut self, sender_id: i64) -> Self {
        self.sender_id = Some(sender_id);
        self
    }

    pub fn with_meeting(mut self, meeting_id: i64) -> Self {
        self.meeting_id = Some(meeting_id);
        self
    }

    pub fn with_call_room(mut self, room: impl Into<String>) -> Self {
        self.call_room = Some(room.into());
        self
    }

    pub fn with_call_status(mut self, status: CallStatus) -> Self {
        self.call_status = Some(status);
        self
    }

    pub fn with_preview(mut self, preview: impl Into<String>) -> Self {
        self.message_preview = Some(preview.into());
        self
    }

    pub fn with_action_url(mut self, url: impl Into<String>) -> Self {
        self.action_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Info,
    Warning,
    Success,
    Error,
    VideoCall,
    Message,
    MeetingRequest,
    MeetingAccepted,
    MeetingDeclined,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::Info => "info",
            NotificationType::Warning => "warning",
            NotificationType::Success => "success",
            NotificationType::Error => "error",
            NotificationType::VideoCall => "video_call",
            NotificationType::Message => "message",
            NotificationType::MeetingRequest => "meeting_request",
            NotificationType::MeetingAccepted => "meeting_accepted",
            NotificationType::MeetingDeclined => "meeting_declined",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(NotificationType::Info),
            "warning" => Ok(NotificationType::Warning),
            "success" => Ok(NotificationType::Success),
            "error" => Ok(NotificationType::Error),
            "video_call" => Ok(NotificationType::VideoCall),
            "message" => Ok(NotificationType::Message),
            "meeting_request" => Ok(NotificationType::MeetingRequest),
            "meeting_accepted" => Ok(NotificationType::MeetingAccepted),
            "meeting_declined" => Ok(NotificationType::MeetingDeclined),
            other => Err(other.to_string()),
        }
    }
}

/// Answer state carried by `video_call` invite notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    Invited,
    Accepted,
    Declined,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Invited => "invited",
            CallStatus::Accepted => "accepted",
            CallStatus::Declined => "declined",
        }
    }
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CallStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invited" => Ok(CallStatus::Invited),
            "accepted" => Ok(CallStatus::Accepted),
            "declined" => Ok(CallStatus::Declined),
            other => Err(other.to_string()),
        }
    }
}

/// Ordering for a user's notification listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    NewestFirst,
    OldestFirst,
}
