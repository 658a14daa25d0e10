//! Repository implementations over the SQLite pool

pub mod meeting_repository;
pub mod notification_repository;
pub mod session_repository;
pub mod user_repository;

pub use meeting_repository::MeetingRequestRepository;
pub use notification_repository::NotificationRepository;
pub use session_repository::SessionRepository;
pub use user_repository::UserRepository;
