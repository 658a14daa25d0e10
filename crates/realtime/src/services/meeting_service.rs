//! Meeting request lifecycle: pending until the expert accepts or rejects it,
//! or the requester withdraws it.

use std::sync::Arc;

use curalink_database::{
    CreateMeetingRequest, MeetingError, MeetingRequest, MeetingRequestRepository, MeetingStatus,
    ScheduledMeeting, UserRepository,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatcher::{Dispatcher, Routed};
use crate::types::{Event, EventKind, RealtimeError, RealtimeResult, UserId};

/// The expert's answer to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeetingDecision {
    #[serde(alias = "accepted")]
    Accept,
    #[serde(alias = "rejected", alias = "decline", alias = "declined")]
    Reject,
}

impl MeetingDecision {
    pub fn status(self) -> MeetingStatus {
        match self {
            MeetingDecision::Accept => MeetingStatus::Accepted,
            MeetingDecision::Reject => MeetingStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MeetingOverview {
    pub sent: Vec<MeetingRequest>,
    pub received: Vec<MeetingRequest>,
}

#[derive(Debug, Clone)]
pub struct MeetingTransition {
    pub request: MeetingRequest,
    /// Present once an accepted request has been scheduled.
    pub meeting: Option<ScheduledMeeting>,
    pub routed: Routed,
}

#[derive(Clone)]
pub struct MeetingService {
    repo: MeetingRequestRepository,
    users: UserRepository,
    dispatcher: Arc<Dispatcher>,
}

impl MeetingService {
    pub fn new(
        repo: MeetingRequestRepository,
        users: UserRepository,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            repo,
            users,
            dispatcher,
        }
    }

    /// Open a pending request and tell the expert about it.
    ///
    /// The request row and the expert's notification commit together.
    pub async fn create(
        &self,
        requester_id: UserId,
        expert_id: UserId,
        message: &str,
        preferred_time: Option<String>,
    ) -> RealtimeResult<MeetingTransition> {
        if requester_id == expert_id {
            return Err(RealtimeError::invalid_input(
                "cannot request a meeting with yourself",
            ));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(RealtimeError::invalid_input("message must not be empty"));
        }
        if !self.users.exists(expert_id).await? {
            return Err(RealtimeError::not_found("user", expert_id));
        }

        let sender_name = self.dispatcher.sender_name(requester_id).await;
        let mut tx = self.repo.begin().await?;
        let request = MeetingRequestRepository::insert(
            &mut tx,
            &CreateMeetingRequest {
                requester_id,
                expert_id,
                message: message.to_string(),
                preferred_time,
            },
        )
        .await?;

        let mut event = Event::direct(
            Some(requester_id),
            expert_id,
            EventKind::MeetingRequest {
                request_id: request.id,
                message: request.message.clone(),
            },
        );
        event.sender_name = sender_name;
        let staged = self.dispatcher.stage(event)?;
        let notification = self
            .dispatcher
            .store()
            .create_in(&mut tx, staged.draft())
            .await?;
        tx.commit().await?;
        let routed = self.dispatcher.deliver(staged, notification).await;

        info!(
            request_id = request.id,
            requester_id,
            expert_id,
            outcome = routed.outcome.as_str(),
            "meeting request created"
        );
        Ok(MeetingTransition {
            request,
            meeting: None,
            routed,
        })
    }

    /// Expert accepts or rejects a pending request. Exactly one caller wins;
    /// the requester gets one status notification for it, committed with the
    /// transition.
    pub async fn respond(
        &self,
        request_id: i64,
        actor: UserId,
        decision: MeetingDecision,
    ) -> RealtimeResult<MeetingTransition> {
        let status = decision.status();
        let sender_name = self.dispatcher.sender_name(actor).await;

        let mut tx = self.repo.begin().await?;
        let (request, meeting) =
            MeetingRequestRepository::resolve_in(&mut tx, request_id, actor, status)
                .await
                .map_err(|e| scoped(e, request_id))?;

        let mut event = Event::direct(
            Some(actor),
            request.requester_id,
            EventKind::MeetingStatus { request_id, status },
        );
        event.sender_name = sender_name;
        let staged = self.dispatcher.stage(event)?;
        let notification = self
            .dispatcher
            .store()
            .create_in(&mut tx, staged.draft())
            .await?;
        tx.commit().await?;
        let routed = self.dispatcher.deliver(staged, notification).await;

        info!(
            request_id,
            expert_id = actor,
            status = %status,
            scheduled = meeting.is_some(),
            "meeting request resolved"
        );
        Ok(MeetingTransition {
            request,
            meeting,
            routed,
        })
    }

    /// Requester withdraws a pending request. The expert is not notified.
    pub async fn cancel(&self, request_id: i64, actor: UserId) -> RealtimeResult<MeetingRequest> {
        let request = self
            .repo
            .cancel(request_id, actor)
            .await
            .map_err(|e| scoped(e, request_id))?;
        info!(request_id, requester_id = actor, "meeting request cancelled");
        Ok(request)
    }

    pub async fn delete(&self, request_id: i64, actor: UserId) -> RealtimeResult<()> {
        self.repo
            .delete(request_id, actor)
            .await
            .map_err(|e| scoped(e, request_id))?;
        info!(request_id, requester_id = actor, "meeting request deleted");
        Ok(())
    }

    pub async fn list_for_user(&self, user_id: UserId) -> RealtimeResult<MeetingOverview> {
        Ok(MeetingOverview {
            sent: self.repo.find_sent(user_id).await?,
            received: self.repo.find_received(user_id).await?,
        })
    }

    /// A request either party may look at.
    pub async fn get(&self, request_id: i64, user_id: UserId) -> RealtimeResult<MeetingRequest> {
        let request = self
            .repo
            .find_by_id(request_id)
            .await?
            .ok_or_else(|| RealtimeError::not_found("meeting request", request_id))?;

        if request.requester_id != user_id && request.expert_id != user_id {
            return Err(RealtimeError::forbidden("not a party to this meeting request"));
        }
        Ok(request)
    }

    pub async fn scheduled_meeting(
        &self,
        request_id: i64,
        user_id: UserId,
    ) -> RealtimeResult<Option<ScheduledMeeting>> {
        self.get(request_id, user_id).await?;
        Ok(self.repo.find_meeting_for_request(request_id).await?)
    }
}

fn scoped(error: MeetingError, request_id: i64) -> RealtimeError {
    match error {
        MeetingError::MeetingRequestNotFound => {
            RealtimeError::not_found("meeting request", request_id)
        }
        other => other.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::RouteOutcome;
    use crate::registry::ConnectionRegistry;
    use crate::test_support::Harness;
    use crate::types::Outbound;
    use curalink_database::{ListOrder, NotificationType};

    #[tokio::test]
    async fn duplicate_pending_request_conflicts_until_resolved() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();

        let first = meetings
            .create(patient, expert, "Second opinion?", None)
            .await
            .unwrap();
        assert_eq!(first.routed.outcome, RouteOutcome::QueuedAsNotification);

        assert!(matches!(
            meetings.create(patient, expert, "Again?", None).await,
            Err(RealtimeError::Conflict { .. })
        ));

        meetings
            .respond(first.request.id, expert, MeetingDecision::Reject)
            .await
            .unwrap();
        let retry = meetings.create(patient, expert, "Again?", None).await.unwrap();
        assert_eq!(retry.request.status, MeetingStatus::Pending);
    }

    #[tokio::test]
    async fn expert_is_notified_of_new_requests() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;

        let created = harness
            .meetings()
            .create(patient, expert, "  Can we talk?  ", Some("2025-02-01T10:00:00Z".into()))
            .await
            .unwrap();
        assert_eq!(created.request.message, "Can we talk?");

        let inbox = harness
            .store
            .collect_for_user(expert, ListOrder::NewestFirst)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::MeetingRequest);
        assert_eq!(inbox[0].title, "New Meeting Request");
        assert_eq!(inbox[0].message, "Pat has requested a meeting with you");
        assert_eq!(inbox[0].meeting_id, Some(created.request.id));
    }

    #[tokio::test]
    async fn invalid_requests_are_rejected() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let meetings = harness.meetings();

        assert!(matches!(
            meetings.create(patient, patient, "me", None).await,
            Err(RealtimeError::InvalidInput { .. })
        ));
        assert!(matches!(
            meetings.create(patient, patient + 100, "hello", None).await,
            Err(RealtimeError::NotFound { entity: "user", .. })
        ));
        let expert = harness.user("Dr. Eve").await;
        assert!(matches!(
            meetings.create(patient, expert, "   ", None).await,
            Err(RealtimeError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn accepting_schedules_and_notifies_once() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();
        let request = meetings
            .create(patient, expert, "Follow-up", Some("2025-03-04T09:30:00Z".into()))
            .await
            .unwrap()
            .request;

        let accepted = meetings
            .respond(request.id, expert, MeetingDecision::Accept)
            .await
            .unwrap();
        assert_eq!(accepted.request.status, MeetingStatus::Accepted);
        let meeting = accepted.meeting.unwrap();
        assert_eq!(meeting.organizer_id, expert);
        assert_eq!(meeting.participant_id, patient);

        assert!(matches!(
            meetings.respond(request.id, expert, MeetingDecision::Reject).await,
            Err(RealtimeError::Conflict { .. })
        ));

        let inbox = harness
            .store
            .collect_for_user(patient, ListOrder::NewestFirst)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::MeetingAccepted);
        assert_eq!(inbox[0].message, "Dr. Eve has accepted your meeting request");
    }

    #[tokio::test]
    async fn only_the_expert_may_respond() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();
        let request = meetings
            .create(patient, expert, "Hello", None)
            .await
            .unwrap()
            .request;

        assert!(matches!(
            meetings.respond(request.id, patient, MeetingDecision::Accept).await,
            Err(RealtimeError::Forbidden { .. })
        ));
        assert!(matches!(
            meetings.respond(request.id + 50, expert, MeetingDecision::Accept).await,
            Err(RealtimeError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn requester_may_cancel_or_delete_pending_requests() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();

        let request = meetings.create(patient, expert, "One", None).await.unwrap().request;
        assert!(matches!(
            meetings.cancel(request.id, expert).await,
            Err(RealtimeError::Forbidden { .. })
        ));
        let cancelled = meetings.cancel(request.id, patient).await.unwrap();
        assert_eq!(cancelled.status, MeetingStatus::Cancelled);
        assert!(matches!(
            meetings.delete(request.id, patient).await,
            Err(RealtimeError::Conflict { .. })
        ));

        let second = meetings.create(patient, expert, "Two", None).await.unwrap().request;
        meetings.delete(second.id, patient).await.unwrap();
        assert!(matches!(
            meetings.get(second.id, patient).await,
            Err(RealtimeError::NotFound { .. })
        ));

        let overview = meetings.list_for_user(patient).await.unwrap();
        assert_eq!(overview.sent.len(), 1);
        assert!(overview.received.is_empty());
        let stranger = harness.user("Mallory").await;
        assert!(matches!(
            meetings.get(request.id, stranger).await,
            Err(RealtimeError::Forbidden { .. })
        ));
    }

    async fn hide_notifications(harness: &Harness) {
        sqlx::query("ALTER TABLE notifications RENAME TO notifications_hidden")
            .execute(&harness.pool)
            .await
            .unwrap();
    }

    async fn restore_notifications(harness: &Harness) {
        sqlx::query("ALTER TABLE notifications_hidden RENAME TO notifications")
            .execute(&harness.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn failed_status_notification_leaves_request_pending() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();
        let request = meetings
            .create(patient, expert, "Follow-up", None)
            .await
            .unwrap()
            .request;

        hide_notifications(&harness).await;
        assert!(matches!(
            meetings.respond(request.id, expert, MeetingDecision::Accept).await,
            Err(RealtimeError::Storage { .. })
        ));
        restore_notifications(&harness).await;

        let stored = meetings.get(request.id, patient).await.unwrap();
        assert_eq!(stored.status, MeetingStatus::Pending);
        assert!(meetings
            .scheduled_meeting(request.id, patient)
            .await
            .unwrap()
            .is_none());

        let accepted = meetings
            .respond(request.id, expert, MeetingDecision::Accept)
            .await
            .unwrap();
        assert_eq!(accepted.request.status, MeetingStatus::Accepted);
        assert!(accepted.meeting.is_some());

        let inbox = harness
            .store
            .collect_for_user(patient, ListOrder::NewestFirst)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].notification_type, NotificationType::MeetingAccepted);
    }

    #[tokio::test]
    async fn failed_request_notification_leaves_no_pending_request() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();

        hide_notifications(&harness).await;
        assert!(matches!(
            meetings.create(patient, expert, "Second opinion?", None).await,
            Err(RealtimeError::Storage { .. })
        ));
        restore_notifications(&harness).await;

        assert!(meetings.list_for_user(patient).await.unwrap().sent.is_empty());

        let created = meetings
            .create(patient, expert, "Second opinion?", None)
            .await
            .unwrap();
        let inbox = harness
            .store
            .collect_for_user(expert, ListOrder::NewestFirst)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].meeting_id, Some(created.request.id));
    }

    #[tokio::test]
    async fn connected_requester_hears_about_the_decision() {
        let harness = Harness::new().await;
        let patient = harness.user("Pat").await;
        let expert = harness.user("Dr. Eve").await;
        let meetings = harness.meetings();
        let request = meetings
            .create(patient, expert, "Follow-up", None)
            .await
            .unwrap()
            .request;
        let (tx, mut rx) = ConnectionRegistry::channel(4);
        harness.registry.register(patient, tx).await.unwrap();

        let rejected = meetings
            .respond(request.id, expert, MeetingDecision::Reject)
            .await
            .unwrap();
        assert_eq!(rejected.routed.outcome, RouteOutcome::DeliveredLive);

        match rx.recv().await.unwrap() {
            Outbound::Event(event) => {
                assert_eq!(event.sender_name.as_deref(), Some("Dr. Eve"));
                assert_eq!(
                    event.notification_id,
                    rejected.routed.notification.map(|n| n.id)
                );
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn decision_accepts_past_tense_aliases() {
        let decision: MeetingDecision = serde_json::from_str("\"accepted\"").unwrap();
        assert_eq!(decision, MeetingDecision::Accept);
        let decision: MeetingDecision = serde_json::from_str("\"reject\"").unwrap();
        assert_eq!(decision.status(), MeetingStatus::Rejected);
    }
}
