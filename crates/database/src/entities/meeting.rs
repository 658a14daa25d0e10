//! Meeting request entity definitions

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub id: i64,
    pub requester_id: i64,
    pub expert_id: i64,
    pub message: String,
    pub preferred_time: Option<String>,
    pub status: MeetingStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMeetingRequest {
    pub requester_id: i64,
    pub expert_id: i64,
    pub message: String,
    pub preferred_time: Option<String>,
}

/// Scheduling record written when a request is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledMeeting {
    pub id: i64,
    pub request_id: i64,
    pub organizer_id: i64,
    pub participant_id: i64,
    pub scheduled_for: String,
    pub duration_minutes: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingStatus {
    Pending,
    Accepted,
    Rejected,
    Cancelled,
}

impl MeetingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeetingStatus::Pending => "pending",
            MeetingStatus::Accepted => "accepted",
            MeetingStatus::Rejected => "rejected",
            MeetingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, MeetingStatus::Pending)
    }
}

impl std::fmt::Display for MeetingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MeetingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(MeetingStatus::Pending),
            "accepted" => Ok(MeetingStatus::Accepted),
            "rejected" => Ok(MeetingStatus::Rejected),
            "cancelled" => Ok(MeetingStatus::Cancelled),
            other => Err(other.to_string()),
        }
    }
}
