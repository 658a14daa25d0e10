//! Connection registry: at most one live outbound channel per user.
//!
//! Each connection owns a bounded queue drained by its writer task. The
//! registry only ever holds the sending half plus a cancellation token that
//! tells the writer to close the socket.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use curalink_config::RealtimeConfig;
use futures::future::join_all;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::types::{ConnectionId, Event, Outbound, RealtimeError, RealtimeResult, UserId};

pub type OutboundSender = mpsc::Sender<Outbound>;
pub type OutboundReceiver = mpsc::Receiver<Outbound>;

#[derive(Clone)]
struct LiveChannel {
    id: ConnectionId,
    sender: OutboundSender,
    closed: CancellationToken,
}

struct Slots {
    by_user: HashMap<UserId, LiveChannel>,
    accepting: bool,
}

/// Handle returned to the connection that registered.
#[derive(Debug, Clone)]
pub struct Registration {
    user_id: UserId,
    connection_id: ConnectionId,
    closed: CancellationToken,
}

impl Registration {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Cancelled once this connection has been superseded, evicted, unregistered or shut down.
    pub fn closed(&self) -> &CancellationToken {
        &self.closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SendFailure {
    TimedOut,
    Closed,
}

pub struct ConnectionRegistry {
    slots: RwLock<Slots>,
    next_id: AtomicU64,
    send_timeout: Duration,
}

impl ConnectionRegistry {
    pub fn new(send_timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(Slots {
                by_user: HashMap::new(),
                accepting: true,
            }),
            next_id: AtomicU64::new(1),
            send_timeout,
        }
    }

    pub fn from_config(config: &RealtimeConfig) -> Self {
        Self::new(config.send_timeout())
    }

    /// Create a bounded outbound queue sized for one connection.
    pub fn channel(capacity: usize) -> (OutboundSender, OutboundReceiver) {
        mpsc::channel(capacity.max(1))
    }

    /// Install `sender` as the live channel for `user_id`.
    ///
    /// A channel already registered for the user is retired: its token is
    /// cancelled so the old writer closes its socket.
    pub async fn register(
        &self,
        user_id: UserId,
        sender: OutboundSender,
    ) -> RealtimeResult<Registration> {
        let connection_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let channel = LiveChannel {
            id: connection_id,
            sender,
            closed: CancellationToken::new(),
        };
        let registration = Registration {
            user_id,
            connection_id,
            closed: channel.closed.clone(),
        };

        let previous = {
            let mut slots = self.slots.write().await;
            if !slots.accepting {
                return Err(RealtimeError::ShuttingDown);
            }
            slots.by_user.insert(user_id, channel)
        };

        if let Some(previous) = previous {
            info!(
                user_id,
                previous = previous.id,
                connection_id,
                "superseding existing connection"
            );
            release(user_id, &previous, "superseded");
        }

        info!(user_id, connection_id, "connection registered");
        Ok(registration)
    }

    /// Remove the channel for `user_id` only if it is still `connection_id`.
    ///
    /// Returns true for the single caller that actually removed it.
    pub async fn unregister(&self, user_id: UserId, connection_id: ConnectionId) -> bool {
        let removed = {
            let mut slots = self.slots.write().await;
            match slots.by_user.get(&user_id) {
                Some(channel) if channel.id == connection_id => slots.by_user.remove(&user_id),
                _ => None,
            }
        };

        match removed {
            Some(channel) => {
                release(user_id, &channel, "unregistered");
                info!(user_id, connection_id, "connection unregistered");
                true
            }
            None => false,
        }
    }

    /// Push an event to one user's live channel.
    ///
    /// Returns false when the user has no live channel or the push failed; a
    /// failed channel is evicted.
    pub async fn send(&self, user_id: UserId, event: Event) -> bool {
        self.send_frame(user_id, Outbound::Event(Arc::new(event))).await
    }

    pub async fn send_frame(&self, user_id: UserId, frame: Outbound) -> bool {
        let Some(channel) = self.live_channel(user_id).await else {
            debug!(user_id, "no live channel");
            return false;
        };

        match self.deliver(&channel, frame).await {
            Ok(()) => true,
            Err(failure) => {
                self.evict(user_id, channel.id, failure).await;
                false
            }
        }
    }

    /// Push an event to every live channel except `exclude`'s.
    ///
    /// Each push is attempted independently; returns how many succeeded.
    pub async fn broadcast(&self, event: Event, exclude: Option<UserId>) -> usize {
        let event = Arc::new(event);
        let targets: Vec<(UserId, LiveChannel)> = {
            let slots = self.slots.read().await;
            slots
                .by_user
                .iter()
                .filter(|(user_id, _)| Some(**user_id) != exclude)
                .map(|(user_id, channel)| (*user_id, channel.clone()))
                .collect()
        };

        let attempts = targets.iter().map(|(user_id, channel)| {
            let frame = Outbound::Event(Arc::clone(&event));
            async move { (*user_id, channel.id, self.deliver(channel, frame).await) }
        });

        let mut delivered = 0;
        for (user_id, connection_id, result) in join_all(attempts).await {
            match result {
                Ok(()) => delivered += 1,
                Err(failure) => self.evict(user_id, connection_id, failure).await,
            }
        }

        debug!(
            event_type = event.event_type(),
            attempted = targets.len(),
            delivered,
            "broadcast complete"
        );
        delivered
    }

    /// Stop accepting connections and close every live channel.
    pub async fn shutdown(&self) -> usize {
        let drained: Vec<(UserId, LiveChannel)> = {
            let mut slots = self.slots.write().await;
            slots.accepting = false;
            slots.by_user.drain().collect()
        };

        for (user_id, channel) in &drained {
            release(*user_id, channel, "shutdown");
        }

        info!(closed = drained.len(), "connection registry shut down");
        drained.len()
    }

    pub async fn is_connected(&self, user_id: UserId) -> bool {
        self.slots.read().await.by_user.contains_key(&user_id)
    }

    pub async fn connected_count(&self) -> usize {
        self.slots.read().await.by_user.len()
    }

    pub async fn connected_users(&self) -> Vec<UserId> {
        let mut users: Vec<UserId> = self.slots.read().await.by_user.keys().copied().collect();
        users.sort_unstable();
        users
    }

    pub async fn is_accepting(&self) -> bool {
        self.slots.read().await.accepting
    }

    async fn live_channel(&self, user_id: UserId) -> Option<LiveChannel> {
        self.slots.read().await.by_user.get(&user_id).cloned()
    }

    async fn deliver(&self, channel: &LiveChannel, frame: Outbound) -> Result<(), SendFailure> {
        if channel.closed.is_cancelled() {
            return Err(SendFailure::Closed);
        }

        channel
            .sender
            .send_timeout(frame, self.send_timeout)
            .await
            .map_err(|error| match error {
                SendTimeoutError::Timeout(_) => SendFailure::TimedOut,
                SendTimeoutError::Closed(_) => SendFailure::Closed,
            })
    }

    async fn evict(&self, user_id: UserId, connection_id: ConnectionId, failure: SendFailure) {
        if self.unregister(user_id, connection_id).await {
            warn!(user_id, connection_id, ?failure, "evicted failing connection");
        }
    }
}

fn release(user_id: UserId, channel: &LiveChannel, reason: &'static str) {
    channel.closed.cancel();
    debug!(user_id, connection_id = channel.id, reason, "connection released");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventKind;

    fn registry() -> ConnectionRegistry {
        ConnectionRegistry::new(Duration::from_millis(50))
    }

    fn chat(to: UserId, text: &str) -> Event {
        Event::direct(Some(99), to, EventKind::Chat { message: text.into() })
    }

    fn message_of(frame: Outbound) -> String {
        match frame {
            Outbound::Event(event) => match &event.kind {
                EventKind::Chat { message } => message.clone(),
                other => panic!("unexpected event {other:?}"),
            },
            Outbound::Control(frame) => panic!("unexpected control frame {frame:?}"),
        }
    }

    #[tokio::test]
    async fn second_registration_supersedes_first() {
        let registry = registry();
        let (old_tx, mut old_rx) = ConnectionRegistry::channel(4);
        let (new_tx, mut new_rx) = ConnectionRegistry::channel(4);

        let first = registry.register(7, old_tx).await.unwrap();
        let second = registry.register(7, new_tx).await.unwrap();

        assert!(first.is_closed());
        assert!(!second.is_closed());
        assert_ne!(first.connection_id(), second.connection_id());
        assert_eq!(registry.connected_count().await, 1);

        assert!(registry.send(7, chat(7, "hello")).await);
        assert_eq!(message_of(new_rx.recv().await.unwrap()), "hello");
        assert!(old_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_to_offline_user_reports_false() {
        let registry = registry();
        let (tx, mut rx) = ConnectionRegistry::channel(4);
        registry.register(1, tx).await.unwrap();

        assert!(!registry.send(2, chat(2, "nobody home")).await);
        assert!(registry.is_connected(1).await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_skips_failures_and_excluded_sender() {
        let registry = registry();
        let mut receivers = Vec::new();
        for user_id in 1..=4 {
            let (tx, rx) = ConnectionRegistry::channel(4);
            registry.register(user_id, tx).await.unwrap();
            receivers.push((user_id, rx));
        }

        // user 3 goes away without unregistering
        let (_, dropped) = receivers.remove(2);
        drop(dropped);

        let event = Event::broadcast(
            Some(1),
            EventKind::Broadcast {
                topic: "new_post".into(),
                payload: serde_json::json!({"id": 12}),
            },
        );
        let delivered = registry.broadcast(event, Some(1)).await;

        assert_eq!(delivered, 2);
        assert_eq!(registry.connected_users().await, vec![1, 2, 4]);
        for (user_id, rx) in receivers.iter_mut() {
            if *user_id == 1 {
                assert!(rx.try_recv().is_err());
            } else {
                assert!(matches!(rx.try_recv(), Ok(Outbound::Event(_))));
            }
        }
    }

    #[tokio::test]
    async fn slow_consumer_is_evicted_after_timeout() {
        let registry = registry();
        let (tx, _rx) = ConnectionRegistry::channel(1);
        let registration = registry.register(5, tx).await.unwrap();

        assert!(registry.send(5, chat(5, "fills the queue")).await);
        assert!(!registry.send(5, chat(5, "times out")).await);

        assert!(registration.is_closed());
        assert!(!registry.is_connected(5).await);
    }

    #[tokio::test]
    async fn stale_unregister_leaves_newer_connection() {
        let registry = registry();
        let (old_tx, _old_rx) = ConnectionRegistry::channel(2);
        let (new_tx, _new_rx) = ConnectionRegistry::channel(2);

        let old = registry.register(3, old_tx).await.unwrap();
        let new = registry.register(3, new_tx).await.unwrap();

        assert!(!registry.unregister(3, old.connection_id()).await);
        assert!(registry.is_connected(3).await);
        assert!(registry.unregister(3, new.connection_id()).await);
        assert!(!registry.is_connected(3).await);
    }

    #[tokio::test]
    async fn concurrent_cleanup_releases_once() {
        let registry = Arc::new(registry());
        let (tx, _rx) = ConnectionRegistry::channel(2);
        let registration = registry.register(11, tx).await.unwrap();
        let id = registration.connection_id();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move { registry.unregister(11, id).await })
            })
            .collect();

        let mut winners = 0;
        for task in tasks {
            if task.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(registration.is_closed());
    }

    #[tokio::test]
    async fn shutdown_closes_everything_and_refuses_new_work() {
        let registry = registry();
        let (tx_a, _rx_a) = ConnectionRegistry::channel(2);
        let (tx_b, _rx_b) = ConnectionRegistry::channel(2);
        let a = registry.register(1, tx_a).await.unwrap();
        let b = registry.register(2, tx_b).await.unwrap();

        assert_eq!(registry.shutdown().await, 2);
        assert!(a.is_closed() && b.is_closed());
        assert!(!registry.is_accepting().await);
        assert!(!registry.send(1, chat(1, "late")).await);

        let (tx_c, _rx_c) = ConnectionRegistry::channel(2);
        assert!(matches!(
            registry.register(3, tx_c).await,
            Err(RealtimeError::ShuttingDown)
        ));
    }
}
