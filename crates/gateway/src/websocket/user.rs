//! User WebSocket handler: one live channel per authenticated user.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use chrono::{DateTime, Utc};
use curalink_realtime::{
    CallAction, ConnectionRegistry, ControlFrame, Event, EventKind, NotificationLevel, Outbound,
    OutboundReceiver, OutboundSender, RealtimeResult, Routed, Target, UserId,
};
use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::middleware::CurrentUser;
use crate::state::GatewayState;

/// Frames a client may send over the socket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Application-level heartbeat
    Ping,
    Chat {
        #[serde(alias = "to_user_id")]
        to: Target,
        #[serde(alias = "payload")]
        message: String,
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    Notification {
        #[serde(alias = "to_user_id")]
        to: Target,
        #[serde(default)]
        title: Option<String>,
        #[serde(alias = "payload")]
        message: String,
        #[serde(default)]
        level: NotificationLevel,
    },
    VideoCallInvite {
        #[serde(alias = "to_user_id")]
        to: UserId,
        room: String,
    },
    VideoCallResponse {
        notification_id: i64,
        action: CallAction,
    },
}

pub async fn user_websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<GatewayState>>,
    CurrentUser(user_id): CurrentUser,
) -> Result<Response, GatewayError> {
    if !state.registry.is_accepting().await {
        return Err(GatewayError::ServiceUnavailable);
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, user_id)))
}

async fn handle_socket(socket: WebSocket, state: Arc<GatewayState>, user_id: UserId) {
    let (tx, rx) = ConnectionRegistry::channel(state.realtime.outbound_buffer);
    let registration = match state.registry.register(user_id, tx.clone()).await {
        Ok(registration) => registration,
        Err(error) => {
            warn!(user_id, %error, "rejecting websocket connection");
            let _ = socket.close().await;
            return;
        }
    };
    let connection_id = registration.connection_id();
    let closed = registration.closed().clone();

    let send_timeout = state.realtime.send_timeout();
    let (sink, stream) = socket.split();
    let mut writer = tokio::spawn(write_loop(
        sink,
        rx,
        closed.clone(),
        state.realtime.heartbeat_interval().max(Duration::from_secs(1)),
        send_timeout,
    ));

    let replies = Replies {
        tx: &tx,
        closed: &closed,
        timeout: send_timeout,
    };
    replies
        .send(ControlFrame::Hello {
            user_id,
            connection_id,
        })
        .await;

    read_loop(stream, &state, user_id, &replies).await;

    // no-op when this connection was already superseded or evicted
    state.registry.unregister(user_id, connection_id).await;
    closed.cancel();
    drop(tx);
    match tokio::time::timeout(send_timeout, &mut writer).await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => warn!(user_id, connection_id, %error, "websocket writer task failed"),
        Err(_) => {
            warn!(user_id, connection_id, "websocket writer stuck; aborting");
            writer.abort();
        }
    }
    info!(user_id, connection_id, "websocket connection closed");
}

/// Drain the outbound queue onto the socket until the connection is released.
///
/// Every write is bounded by `send_timeout`; a write that fails or stalls ends
/// the loop and cancels `closed` so the reader stops too.
async fn write_loop<S>(
    mut sink: S,
    mut rx: OutboundReceiver,
    closed: CancellationToken,
    heartbeat: Duration,
    send_timeout: Duration,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let mut ticker = tokio::time::interval(heartbeat);
    ticker.tick().await;

    loop {
        let message = tokio::select! {
            _ = closed.cancelled() => {
                let _ = tokio::time::timeout(send_timeout, sink.send(Message::Close(None))).await;
                break;
            }
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                match frame.to_json() {
                    Ok(text) => Message::Text(text),
                    Err(error) => {
                        warn!(%error, "failed to encode outbound frame");
                        continue;
                    }
                }
            }
            _ = ticker.tick() => Message::Ping(Vec::new()),
        };

        match tokio::time::timeout(send_timeout, sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                debug!(%error, "websocket send failed");
                break;
            }
            Err(_) => {
                debug!(?send_timeout, "websocket send timed out");
                break;
            }
        }
    }
    closed.cancel();
}

/// Control replies for one connection. A reply that cannot be queued in time
/// closes the connection instead of blocking the reader.
struct Replies<'a> {
    tx: &'a OutboundSender,
    closed: &'a CancellationToken,
    timeout: Duration,
}

impl Replies<'_> {
    async fn send(&self, frame: ControlFrame) {
        if let Err(error) = self
            .tx
            .send_timeout(Outbound::Control(frame), self.timeout)
            .await
        {
            debug!(%error, "reply not queued; closing connection");
            self.closed.cancel();
        }
    }
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    state: &GatewayState,
    user_id: UserId,
    replies: &Replies<'_>,
) {
    loop {
        let message = tokio::select! {
            _ = replies.closed.cancelled() => break,
            message = stream.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => handle_text(state, user_id, replies, &text).await,
            Some(Ok(Message::Binary(_))) => {
                replies
                    .send(ControlFrame::Error {
                        message: "binary frames are not supported".to_string(),
                    })
                    .await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Ok(_)) => {}
            Some(Err(error)) => {
                debug!(user_id, %error, "websocket read failed");
                break;
            }
        }
    }
}

async fn handle_text(state: &GatewayState, user_id: UserId, replies: &Replies<'_>, text: &str) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(error) => {
            debug!(user_id, %error, "invalid client frame");
            replies
                .send(ControlFrame::Error {
                    message: format!("invalid frame: {error}"),
                })
                .await;
            return;
        }
    };

    let reply_frame = match dispatch_frame(state, user_id, frame).await {
        Ok(frame) => frame,
        Err(error) => ControlFrame::Error {
            message: error.to_string(),
        },
    };
    replies.send(reply_frame).await;
}

async fn dispatch_frame(
    state: &GatewayState,
    user_id: UserId,
    frame: ClientFrame,
) -> RealtimeResult<ControlFrame> {
    match frame {
        ClientFrame::Ping => Ok(ControlFrame::Pong),
        ClientFrame::Chat {
            to,
            message,
            timestamp,
        } => {
            let mut event = Event::new(Some(user_id), to, EventKind::Chat { message });
            if let Some(timestamp) = timestamp {
                event = event.with_timestamp(timestamp);
            }
            let routed = state.dispatcher.route(event).await?;
            Ok(ack("chat", &routed))
        }
        ClientFrame::Notification {
            to,
            title,
            message,
            level,
        } => {
            let event = Event::new(
                Some(user_id),
                to,
                EventKind::Notification {
                    title,
                    message,
                    level,
                },
            );
            let routed = state.dispatcher.route(event).await?;
            Ok(ack("notification", &routed))
        }
        ClientFrame::VideoCallInvite { to, room } => {
            let invite = state.calls.invite(user_id, to, &room).await?;
            Ok(ack("video_call_invite", &invite.routed))
        }
        ClientFrame::VideoCallResponse {
            notification_id,
            action,
        } => {
            let response = state.calls.respond(notification_id, user_id, action).await?;
            Ok(ack("video_call_response", &response.routed))
        }
    }
}

fn ack(event_type: &str, routed: &Routed) -> ControlFrame {
    ControlFrame::Ack {
        event_type: event_type.to_string(),
        outcome: routed.outcome.as_str().to_string(),
        notification_id: routed.notification.as_ref().map(|n| n.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::convert::Infallible;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// A peer that never reads: every write stays pending.
    struct StalledSink;

    impl Sink<Message> for StalledSink {
        type Error = Infallible;

        fn poll_ready(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn start_send(self: Pin<&mut Self>, _: Message) -> Result<(), Self::Error> {
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }

        fn poll_close(self: Pin<&mut Self>, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Pending
        }
    }

    fn spawn_stalled_writer(
        rx: OutboundReceiver,
        closed: &CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(write_loop(
            StalledSink,
            rx,
            closed.clone(),
            Duration::from_secs(60),
            Duration::from_millis(50),
        ))
    }

    #[tokio::test]
    async fn writer_gives_up_on_a_peer_that_stops_reading() {
        let (tx, rx) = ConnectionRegistry::channel(4);
        let closed = CancellationToken::new();
        let writer = spawn_stalled_writer(rx, &closed);

        tx.send(Outbound::Control(ControlFrame::Pong)).await.unwrap();

        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("writer should stop after its send timeout")
            .unwrap();
        assert!(closed.is_cancelled());
    }

    #[tokio::test]
    async fn closing_a_stalled_writer_is_bounded() {
        let (_tx, rx) = ConnectionRegistry::channel(4);
        let closed = CancellationToken::new();
        let writer = spawn_stalled_writer(rx, &closed);

        closed.cancel();
        tokio::time::timeout(Duration::from_secs(2), writer)
            .await
            .expect("close frame should not block forever")
            .unwrap();
    }

    #[tokio::test]
    async fn reply_to_a_full_queue_closes_the_connection() {
        let (tx, mut rx) = ConnectionRegistry::channel(1);
        let closed = CancellationToken::new();
        tx.send(Outbound::Control(ControlFrame::Pong)).await.unwrap();

        let replies = Replies {
            tx: &tx,
            closed: &closed,
            timeout: Duration::from_millis(20),
        };
        tokio::time::timeout(Duration::from_secs(2), replies.send(ControlFrame::Pong))
            .await
            .expect("reply should not wait for a stuck writer");

        assert!(closed.is_cancelled());
        assert!(matches!(rx.try_recv(), Ok(Outbound::Control(ControlFrame::Pong))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn chat_frames_accept_legacy_field_names() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "chat",
            "to_user_id": "42",
            "payload": "hello"
        }))
        .unwrap();

        match frame {
            ClientFrame::Chat { to, message, timestamp } => {
                assert_eq!(to, Target::User(42));
                assert_eq!(message, "hello");
                assert!(timestamp.is_none());
            }
            other => panic!("unexpected frame {other:?}"),
        }
    }

    #[test]
    fn call_response_frames_decode_actions() {
        let frame: ClientFrame = serde_json::from_value(json!({
            "type": "video_call_response",
            "notification_id": 7,
            "action": "accept"
        }))
        .unwrap();
        assert!(matches!(
            frame,
            ClientFrame::VideoCallResponse {
                notification_id: 7,
                action: CallAction::Accept
            }
        ));
    }

    #[test]
    fn unknown_frame_types_are_rejected() {
        assert!(serde_json::from_value::<ClientFrame>(json!({"type": "subscribe"})).is_err());
        assert!(serde_json::from_str::<ClientFrame>("not json").is_err());
    }
}
