//! Video call invites. Signalling only; the media session happens elsewhere.
//!
//! An invite is the `video_call` notification it produced for the callee. Its
//! `call_status` column is the call state, so answers survive restarts and a
//! second answer is always a conflict.

use std::sync::Arc;

use curalink_database::{CallStatus, Notification};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::dispatcher::{Dispatcher, Routed};
use crate::types::{Event, EventKind, RealtimeError, RealtimeResult, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallAction {
    #[serde(alias = "accepted")]
    Accept,
    #[serde(alias = "declined", alias = "reject")]
    Decline,
}

impl CallAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallAction::Accept => "accept",
            CallAction::Decline => "decline",
        }
    }

    pub fn status(self) -> CallStatus {
        match self {
            CallAction::Accept => CallStatus::Accepted,
            CallAction::Decline => CallStatus::Declined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallSession {
    pub invite_id: i64,
    pub caller_id: UserId,
    pub callee_id: UserId,
    pub room: String,
    pub status: CallStatus,
}

impl CallSession {
    fn from_invite(invite: &Notification) -> RealtimeResult<Self> {
        match (invite.sender_id, &invite.call_room, invite.call_status) {
            (Some(caller_id), Some(room), Some(status)) => Ok(Self {
                invite_id: invite.id,
                caller_id,
                callee_id: invite.user_id,
                room: room.clone(),
                status,
            }),
            _ => Err(RealtimeError::not_found("call invite", invite.id)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CallInvite {
    pub session: CallSession,
    pub routed: Routed,
}

#[derive(Debug, Clone)]
pub struct CallResponse {
    pub action: CallAction,
    /// Room to join; only set when the call was accepted.
    pub room: Option<String>,
    pub routed: Routed,
}

pub struct CallService {
    dispatcher: Arc<Dispatcher>,
}

impl CallService {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn invite(
        &self,
        caller_id: UserId,
        callee_id: UserId,
        room: &str,
    ) -> RealtimeResult<CallInvite> {
        let room = room.trim();
        if room.is_empty() {
            return Err(RealtimeError::invalid_input("call room must not be empty"));
        }
        if caller_id == callee_id {
            return Err(RealtimeError::invalid_input("cannot call yourself"));
        }

        let routed = self
            .dispatcher
            .route(Event::direct(
                Some(caller_id),
                callee_id,
                EventKind::VideoCallInvite {
                    room: room.to_string(),
                },
            ))
            .await?;
        let session = routed
            .notification
            .as_ref()
            .ok_or_else(|| RealtimeError::storage("call invite was not stored"))
            .and_then(CallSession::from_invite)?;

        info!(
            invite_id = session.invite_id,
            caller_id,
            callee_id,
            outcome = routed.outcome.as_str(),
            "video call invite sent"
        );
        Ok(CallInvite { session, routed })
    }

    /// Callee answers an open invite. A second answer is a conflict.
    ///
    /// The answer and the caller's notification commit together.
    pub async fn respond(
        &self,
        invite_id: i64,
        actor: UserId,
        action: CallAction,
    ) -> RealtimeResult<CallResponse> {
        let store = self.dispatcher.store();
        let sender_name = self.dispatcher.sender_name(actor).await;

        let mut tx = store.begin().await?;
        let invite = store
            .answer_call(&mut tx, invite_id, actor, action.status())
            .await?;
        let session = CallSession::from_invite(&invite)?;

        let accepted = action == CallAction::Accept;
        let room = accepted.then(|| session.room.clone());
        let mut event = Event::direct(
            Some(actor),
            session.caller_id,
            EventKind::VideoCallResponse {
                accepted,
                room: room.clone(),
            },
        );
        event.sender_name = sender_name;
        let staged = self.dispatcher.stage(event)?;
        let notification = store.create_in(&mut tx, staged.draft()).await?;
        tx.commit().await?;
        let routed = self.dispatcher.deliver(staged, notification).await;

        info!(
            invite_id,
            callee_id = actor,
            caller_id = session.caller_id,
            status = session.status.as_str(),
            "video call answered"
        );
        Ok(CallResponse {
            action,
            room,
            routed,
        })
    }

    /// Current state of an invite, as stored.
    pub async fn session(&self, invite_id: i64) -> RealtimeResult<CallSession> {
        let invite = self
            .dispatcher
            .store()
            .find(invite_id)
            .await?
            .ok_or_else(|| RealtimeError::not_found("call invite", invite_id))?;
        CallSession::from_invite(&invite)
    }
}
