//! Domain entities for the database layer

pub mod meeting;
pub mod notification;
pub mod session;
pub mod user;

pub use meeting::{CreateMeetingRequest, MeetingRequest, MeetingStatus, ScheduledMeeting};
pub use notification::{
    CallStatus, CreateNotificationRequest, ListOrder, Notification, NotificationType,
};
pub use session::Session;
pub use user::{CreateUserRequest, User};
