//! Routes events to live channels and projects them into durable notifications.
//!
//! Directed events are written to the notification store before the live push,
//! so a recipient who is offline (or drops mid-send) still finds them later in
//! the order they were routed. Broadcasts are live only.
//!
//! Services that change other state together with the notification use the
//! split form: [`Dispatcher::stage`], store the draft in their own transaction,
//! then [`Dispatcher::deliver`] after commit.

use std::sync::Arc;

use curalink_database::{
    CallStatus, CreateNotificationRequest, MeetingStatus, Notification, NotificationType,
    UserRepository,
};
use serde::Serialize;
use tracing::{debug, warn};

use crate::registry::ConnectionRegistry;
use crate::services::NotificationStore;
use crate::types::{Event, EventKind, RealtimeError, RealtimeResult, Target, UserId};

/// What happened to a routed event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteOutcome {
    DeliveredLive,
    QueuedAsNotification,
    Dropped,
}

impl RouteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteOutcome::DeliveredLive => "delivered_live",
            RouteOutcome::QueuedAsNotification => "queued_as_notification",
            RouteOutcome::Dropped => "dropped",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Routed {
    pub outcome: RouteOutcome,
    /// The stored projection, for directed events.
    pub notification: Option<Notification>,
    /// Live channels the event reached.
    pub delivered: usize,
}

/// A directed event with its notification drafted but not yet stored.
#[derive(Debug, Clone)]
pub struct Staged {
    event: Event,
    recipient: UserId,
    draft: CreateNotificationRequest,
}

impl Staged {
    pub fn draft(&self) -> &CreateNotificationRequest {
        &self.draft
    }

    pub fn recipient(&self) -> UserId {
        self.recipient
    }
}

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    store: NotificationStore,
    users: UserRepository,
    preview_length: usize,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        store: NotificationStore,
        users: UserRepository,
        preview_length: usize,
    ) -> Self {
        Self {
            registry,
            store,
            users,
            preview_length,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub async fn route(&self, mut event: Event) -> RealtimeResult<Routed> {
        self.enrich(&mut event).await;

        if matches!(event.kind, EventKind::Broadcast { .. }) {
            self.route_broadcast(event).await
        } else {
            self.route_direct(event).await
        }
    }

    async fn route_direct(&self, event: Event) -> RealtimeResult<Routed> {
        let staged = self.stage(event)?;
        let notification = self.store.create(staged.draft.clone()).await?;
        Ok(self.deliver(staged, notification).await)
    }

    /// Validate a directed event and draft its notification. Nothing is written.
    pub fn stage(&self, event: Event) -> RealtimeResult<Staged> {
        let recipient = match event.target {
            Target::User(id) => id,
            Target::All => {
                return Err(RealtimeError::invalid_input(format!(
                    "{} events need a single recipient",
                    event.event_type()
                )))
            }
        };
        if event.sender == Some(recipient) {
            return Err(RealtimeError::invalid_input(
                "cannot address an event to yourself",
            ));
        }

        let draft = self.projection(&event, recipient).ok_or_else(|| {
            RealtimeError::invalid_input(format!(
                "{} events cannot be stored as notifications",
                event.event_type()
            ))
        })?;
        Ok(Staged {
            event,
            recipient,
            draft,
        })
    }

    /// Push a staged event whose notification is already committed.
    pub async fn deliver(&self, staged: Staged, notification: Notification) -> Routed {
        let Staged {
            mut event,
            recipient,
            ..
        } = staged;
        event.notification_id = Some(notification.id);

        let event_type = event.event_type();
        let delivered = self.registry.send(recipient, event).await;
        let outcome = if delivered {
            RouteOutcome::DeliveredLive
        } else {
            RouteOutcome::QueuedAsNotification
        };

        debug!(
            event_type,
            recipient,
            notification_id = notification.id,
            outcome = outcome.as_str(),
            "event routed"
        );
        Routed {
            outcome,
            notification: Some(notification),
            delivered: usize::from(delivered),
        }
    }

    async fn route_broadcast(&self, event: Event) -> RealtimeResult<Routed> {
        if event.target != Target::All {
            return Err(RealtimeError::invalid_input(
                "broadcast events must be addressed to all",
            ));
        }

        let exclude = event.sender;
        let delivered = self.registry.broadcast(event, exclude).await;
        let outcome = if delivered > 0 {
            RouteOutcome::DeliveredLive
        } else {
            RouteOutcome::Dropped
        };

        Ok(Routed {
            outcome,
            notification: None,
            delivered,
        })
    }

    async fn enrich(&self, event: &mut Event) {
        if event.sender_name.is_some() {
            return;
        }
        if let Some(sender) = event.sender {
            event.sender_name = self.sender_name(sender).await;
        }
    }

    /// Display name for a sender. A failed lookup yields `None`; it never blocks delivery.
    pub async fn sender_name(&self, sender: UserId) -> Option<String> {
        match self.users.display_name(sender).await {
            Ok(name) => name,
            Err(error) => {
                warn!(sender, %error, "sender name lookup failed");
                None
            }
        }
    }

    fn projection(&self, event: &Event, recipient: UserId) -> Option<CreateNotificationRequest> {
        let name = event.sender_name.as_deref().unwrap_or("Someone");

        let request = match &event.kind {
            EventKind::Chat { message } => CreateNotificationRequest::new(
                recipient,
                NotificationType::Message,
                "New Message",
                format!("New message from {name}"),
            )
            .with_preview(preview(message, self.preview_length)),
            EventKind::Notification {
                title,
                message,
                level,
            } => CreateNotificationRequest::new(
                recipient,
                (*level).into(),
                title.clone().unwrap_or_else(|| "Notification".to_string()),
                message.clone(),
            ),
            EventKind::MeetingRequest { request_id, .. } => CreateNotificationRequest::new(
                recipient,
                NotificationType::MeetingRequest,
                "New Meeting Request",
                format!("{name} has requested a meeting with you"),
            )
            .with_meeting(*request_id)
            .with_action_url("/meetings"),
            EventKind::MeetingStatus { request_id, status } => {
                let (kind, title, verb) = match status {
                    MeetingStatus::Accepted => {
                        (NotificationType::MeetingAccepted, "Meeting Request Accepted", "accepted")
                    }
                    MeetingStatus::Rejected => {
                        (NotificationType::MeetingDeclined, "Meeting Request Rejected", "rejected")
                    }
                    MeetingStatus::Cancelled => {
                        (NotificationType::Info, "Meeting Request Cancelled", "cancelled")
                    }
                    MeetingStatus::Pending => {
                        (NotificationType::Info, "Meeting Request Updated", "updated")
                    }
                };
                CreateNotificationRequest::new(
                    recipient,
                    kind,
                    title,
                    format!("{name} has {verb} your meeting request"),
                )
                .with_meeting(*request_id)
                .with_action_url("/meetings")
            }
            EventKind::VideoCallInvite { room } => CreateNotificationRequest::new(
                recipient,
                NotificationType::VideoCall,
                "Incoming Video Call",
                format!("{name} is calling you"),
            )
            .with_call_room(room.clone())
            .with_call_status(CallStatus::Invited),
            EventKind::VideoCallResponse {
                accepted: true,
                room,
            } => {
                let request = CreateNotificationRequest::new(
                    recipient,
                    NotificationType::VideoCall,
                    "Call Accepted",
                    format!("{name} accepted your video call"),
                );
                match room {
                    Some(room) => request.with_call_room(room.clone()),
                    None => request,
                }
            }
            EventKind::VideoCallResponse {
                accepted: false, ..
            } => CreateNotificationRequest::new(
                recipient,
                NotificationType::Info,
                "Call Declined",
                format!("{name} declined your video call"),
            ),
            EventKind::Broadcast { .. } => return None,
        };

        Some(match event.sender {
            Some(sender) => request.with_sender(sender),
            None => request,
        })
    }
}

/// First `limit` characters of `text`, with `...` appended when it was cut.
pub fn preview(text: &str, limit: usize) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(limit).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use crate::types::{NotificationLevel, Outbound};
    use curalink_database::ListOrder;

    #[test]
    fn preview_counts_characters_not_bytes() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("exactly10!", 10), "exactly10!");
        assert_eq!(preview("héllo wörld", 5), "héllo...");
        assert_eq!(preview("", 3), "");
    }

    #[tokio::test]
    async fn chat_to_offline_user_is_queued_with_preview() {
        let harness = Harness::new().await;
        let alice = harness.user("Alice").await;
        let bob = harness.user("Bob").await;
        let long = "x".repeat(150);

        let routed = harness
            .dispatcher
            .route(Event::direct(Some(alice), bob, EventKind::Chat { message: long }))
            .await
            .unwrap();

        assert_eq!(routed.outcome, RouteOutcome::QueuedAsNotification);
        let stored = routed.notification.unwrap();
        assert_eq!(stored.notification_type, NotificationType::Message);
        assert_eq!(stored.title, "New Message");
        assert_eq!(stored.message, "New message from Alice");
        assert_eq!(stored.sender_id, Some(alice));
        let preview = stored.message_preview.unwrap();
        assert_eq!(preview.chars().count(), 103);
        assert!(preview.ends_with("..."));
    }

    #[tokio::test]
    async fn live_delivery_carries_sender_name_and_notification_id() {
        let harness = Harness::new().await;
        let alice = harness.user("Alice").await;
        let bob = harness.user("Bob").await;
        let (tx, mut rx) = ConnectionRegistry::channel(4);
        harness.registry.register(bob, tx).await.unwrap();

        let routed = harness
            .dispatcher
            .route(Event::direct(
                Some(alice),
                bob,
                EventKind::Notification {
                    title: Some("Heads up".into()),
                    message: "Lab results ready".into(),
                    level: NotificationLevel::Success,
                },
            ))
            .await
            .unwrap();

        assert_eq!(routed.outcome, RouteOutcome::DeliveredLive);
        let stored = routed.notification.unwrap();
        assert_eq!(stored.notification_type, NotificationType::Success);

        match rx.recv().await.unwrap() {
            Outbound::Event(event) => {
                assert_eq!(event.sender_name.as_deref(), Some("Alice"));
                assert_eq!(event.notification_id, Some(stored.id));
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn staged_event_is_pushed_only_when_delivered() {
        let harness = Harness::new().await;
        let alice = harness.user("Alice").await;
        let bob = harness.user("Bob").await;
        let (tx, mut rx) = ConnectionRegistry::channel(4);
        harness.registry.register(bob, tx).await.unwrap();

        let staged = harness
            .dispatcher
            .stage(
                Event::direct(Some(alice), bob, EventKind::Chat { message: "hi".into() })
                    .with_sender_name("Alice"),
            )
            .unwrap();
        assert_eq!(staged.recipient(), bob);
        assert_eq!(staged.draft().message, "New message from Alice");
        assert!(rx.try_recv().is_err());

        let stored = harness.store.create(staged.draft().clone()).await.unwrap();
        let routed = harness.dispatcher.deliver(staged, stored.clone()).await;
        assert_eq!(routed.outcome, RouteOutcome::DeliveredLive);
        match rx.recv().await.unwrap() {
            Outbound::Event(event) => assert_eq!(event.notification_id, Some(stored.id)),
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_sender_still_routes() {
        let harness = Harness::new().await;
        let bob = harness.user("Bob").await;

        let routed = harness
            .dispatcher
            .route(Event::direct(Some(9_999), bob, EventKind::Chat { message: "hi".into() }))
            .await
            .unwrap();

        assert_eq!(
            routed.notification.unwrap().message,
            "New message from Someone"
        );
    }

    #[tokio::test]
    async fn broadcast_without_listeners_is_dropped() {
        let harness = Harness::new().await;
        let alice = harness.user("Alice").await;
        let (tx, _rx) = ConnectionRegistry::channel(4);
        harness.registry.register(alice, tx).await.unwrap();

        let routed = harness
            .dispatcher
            .route(Event::broadcast(
                Some(alice),
                EventKind::Broadcast {
                    topic: "new_forum".into(),
                    payload: serde_json::json!({"forum_id": 3}),
                },
            ))
            .await
            .unwrap();

        assert_eq!(routed.outcome, RouteOutcome::Dropped);
        assert!(routed.notification.is_none());
        assert!(harness
            .store
            .collect_for_user(alice, ListOrder::NewestFirst)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn misaddressed_events_are_rejected() {
        let harness = Harness::new().await;
        let alice = harness.user("Alice").await;

        let to_all = Event::broadcast(Some(alice), EventKind::Chat { message: "hi".into() });
        assert!(matches!(
            harness.dispatcher.route(to_all).await,
            Err(RealtimeError::InvalidInput { .. })
        ));

        let to_self = Event::direct(Some(alice), alice, EventKind::Chat { message: "me".into() });
        assert!(matches!(
            harness.dispatcher.route(to_self).await,
            Err(RealtimeError::InvalidInput { .. })
        ));

        let directed_broadcast = Event::direct(
            Some(alice),
            alice + 1,
            EventKind::Broadcast {
                topic: "new_post".into(),
                payload: serde_json::Value::Null,
            },
        );
        assert!(matches!(
            harness.dispatcher.route(directed_broadcast).await,
            Err(RealtimeError::InvalidInput { .. })
        ));
    }
}
