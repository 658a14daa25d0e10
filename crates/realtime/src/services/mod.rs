//! Notification, meeting and call lifecycles built on the dispatcher.

pub mod call_service;
pub mod meeting_service;
pub mod notification_store;

pub use call_service::{CallAction, CallInvite, CallResponse, CallService, CallSession};
pub use meeting_service::{MeetingDecision, MeetingOverview, MeetingService, MeetingTransition};
pub use notification_store::NotificationStore;
