//! Shared types for the realtime crate

pub mod errors;
pub mod events;

pub use errors::{RealtimeError, RealtimeResult};
pub use events::{
    ConnectionId, ControlFrame, Event, EventKind, NotificationLevel, Outbound, Target, UserId,
};
