//! Shared types and result types for the database layer

pub mod errors;

pub use errors::{AuthError, DatabaseError, MeetingError, NotificationError, UserError};

pub type DatabaseResult<T> = Result<T, DatabaseError>;
pub type UserResult<T> = Result<T, UserError>;
pub type NotificationResult<T> = Result<T, NotificationError>;
pub type MeetingResult<T> = Result<T, MeetingError>;
pub type AuthResult<T> = Result<T, AuthError>;

/// Current time in the fixed-width RFC 3339 form stored in every `*_at` column.
///
/// Fixed width keeps lexical and chronological order identical.
pub fn timestamp_now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}
