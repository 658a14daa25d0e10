//! Event union carried between users, plus connection-local control frames.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use curalink_database::{MeetingStatus, NotificationType};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub type UserId = i64;
pub type ConnectionId = u64;

/// Who an event is addressed to. On the wire a user id or the string `"all"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    User(UserId),
    All,
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Target::User(id) => serializer.serialize_i64(*id),
            Target::All => serializer.serialize_str("all"),
        }
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTarget {
            Id(i64),
            Text(String),
        }

        match RawTarget::deserialize(deserializer)? {
            RawTarget::Id(id) => Ok(Target::User(id)),
            RawTarget::Text(text) if text.eq_ignore_ascii_case("all") => Ok(Target::All),
            RawTarget::Text(text) => text.trim().parse().map(Target::User).map_err(|_| {
                serde::de::Error::custom(format!("invalid target {text:?}: expected a user id or \"all\""))
            }),
        }
    }
}

/// Severity of a free-form notification event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    #[default]
    Info,
    Warning,
    Success,
    Error,
}

impl From<NotificationLevel> for NotificationType {
    fn from(level: NotificationLevel) -> Self {
        match level {
            NotificationLevel::Info => NotificationType::Info,
            NotificationLevel::Warning => NotificationType::Warning,
            NotificationLevel::Success => NotificationType::Success,
            NotificationLevel::Error => NotificationType::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Chat {
        #[serde(alias = "payload")]
        message: String,
    },
    Notification {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
        #[serde(alias = "payload")]
        message: String,
        #[serde(default)]
        level: NotificationLevel,
    },
    /// Live-only announcement such as `new_forum` or `new_post`.
    Broadcast {
        topic: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
    MeetingRequest {
        request_id: i64,
        message: String,
    },
    MeetingStatus {
        request_id: i64,
        status: MeetingStatus,
    },
    VideoCallInvite {
        room: String,
    },
    VideoCallResponse {
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room: Option<String>,
    },
}

impl EventKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::Chat { .. } => "chat",
            EventKind::Notification { .. } => "notification",
            EventKind::Broadcast { .. } => "broadcast",
            EventKind::MeetingRequest { .. } => "meeting_request",
            EventKind::MeetingStatus { .. } => "meeting_status",
            EventKind::VideoCallInvite { .. } => "video_call_invite",
            EventKind::VideoCallResponse { .. } => "video_call_response",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(flatten)]
    pub kind: EventKind,
    #[serde(rename = "from", default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(rename = "to")]
    pub target: Target,
    /// Id of the persisted notification this event was projected into, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_id: Option<i64>,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(sender: Option<UserId>, target: Target, kind: EventKind) -> Self {
        Self {
            kind,
            sender,
            sender_name: None,
            target,
            notification_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn direct(sender: Option<UserId>, recipient: UserId, kind: EventKind) -> Self {
        Self::new(sender, Target::User(recipient), kind)
    }

    pub fn broadcast(sender: Option<UserId>, kind: EventKind) -> Self {
        Self::new(sender, Target::All, kind)
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_sender_name(mut self, name: impl Into<String>) -> Self {
        self.sender_name = Some(name.into());
        self
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.type_name()
    }

    pub fn recipient(&self) -> Option<UserId> {
        match self.target {
            Target::User(id) => Some(id),
            Target::All => None,
        }
    }
}

/// Replies that concern one connection only and never go through the dispatcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    Hello {
        user_id: UserId,
        connection_id: ConnectionId,
    },
    Pong,
    Error {
        message: String,
    },
    Ack {
        event_type: String,
        outcome: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        notification_id: Option<i64>,
    },
}

/// What travels down a connection's outbound queue.
#[derive(Debug, Clone)]
pub enum Outbound {
    Event(Arc<Event>),
    Control(ControlFrame),
}

impl Outbound {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl Serialize for Outbound {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outbound::Event(event) => event.as_ref().serialize(serializer),
            Outbound::Control(frame) => frame.serialize(serializer),
        }
    }
}
