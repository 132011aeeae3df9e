use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_types::events::ServerEvent;

/// Identifier of one registered connection, distinct from the user id so a
/// user may hold several connections (e.g. chat 0 plus an open chat).
pub type ConnId = Uuid;

/// Handle through which a registered session receives outbound frames.
/// Frames arrive pre-serialized; the session's send task only writes them
/// to the socket.
pub type ConnSender = mpsc::UnboundedSender<String>;

/// Maps each chat id to the set of live connections subscribed to it.
///
/// All mutations and the broadcast snapshot go through one RwLock, which is
/// what gives the delivery guarantee: once `unregister` has returned, the
/// removed connection cannot receive any later broadcast.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    chats: RwLock<HashMap<i64, HashMap<ConnId, ConnSender>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                chats: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Add a connection under a chat id. Returns the connection id, a
    /// sender for frames targeted at this connection alone (error replies),
    /// and the receiver end the session's send task drains.
    pub async fn register(
        &self,
        chat_id: i64,
    ) -> (ConnId, ConnSender, mpsc::UnboundedReceiver<String>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut chats = self.inner.chats.write().await;
        let bucket = chats.entry(chat_id).or_default();
        bucket.insert(conn_id, tx.clone());
        info!(
            "Connected to chat {}. Active connections: {}",
            chat_id,
            bucket.len()
        );

        (conn_id, tx, rx)
    }

    /// Remove a connection. Empty buckets are dropped so transient chats
    /// do not accumulate entries. Idempotent.
    pub async fn unregister(&self, chat_id: i64, conn_id: ConnId) {
        let mut chats = self.inner.chats.write().await;
        if let Some(bucket) = chats.get_mut(&chat_id) {
            bucket.remove(&conn_id);
            let remaining = bucket.len();
            if bucket.is_empty() {
                chats.remove(&chat_id);
            }
            info!(
                "Disconnected from chat {}. Active connections: {}",
                chat_id, remaining
            );
        }
    }

    /// Deliver an event to every connection currently registered under the
    /// chat id. The event is serialized once; a peer whose channel is gone
    /// is logged and skipped, never aborting delivery to the rest.
    pub async fn broadcast(&self, chat_id: i64, event: &ServerEvent) {
        let text = match serde_json::to_string(event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to serialize event for chat {}: {}", chat_id, e);
                return;
            }
        };

        let chats = self.inner.chats.read().await;
        let Some(bucket) = chats.get(&chat_id) else {
            return;
        };

        debug!(
            "Broadcasting to chat {} ({} clients): {}",
            chat_id,
            bucket.len(),
            text
        );
        for (conn_id, tx) in bucket.iter() {
            if tx.send(text.clone()).is_err() {
                warn!(
                    "Error broadcasting to chat {}: connection {} is gone",
                    chat_id, conn_id
                );
            }
        }
    }

    /// Number of live connections for a chat id. Test and logging helper.
    pub async fn connection_count(&self, chat_id: i64) -> usize {
        self.inner
            .chats
            .read()
            .await
            .get(&chat_id)
            .map_or(0, |bucket| bucket.len())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_types::events::ServerEvent;

    fn error_event(message: &str) -> ServerEvent {
        ServerEvent::Error {
            message: message.into(),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_registered_connection_exactly_once() {
        let registry = Registry::new();
        let (_a, _tx_a, mut rx_a) = registry.register(5).await;
        let (_b, _tx_b, mut rx_b) = registry.register(5).await;

        registry.broadcast(5, &error_event("one")).await;

        assert!(rx_a.recv().await.unwrap().contains("one"));
        assert!(rx_b.recv().await.unwrap().contains("one"));
        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn broadcast_is_scoped_to_its_chat_id() {
        let registry = Registry::new();
        let (_a, _tx_a, mut rx_a) = registry.register(5).await;
        let (_b, _tx_b, mut rx_b) = registry.register(6).await;

        registry.broadcast(5, &error_event("for five")).await;

        assert!(rx_a.recv().await.unwrap().contains("for five"));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn no_delivery_after_unregister_returns() {
        let registry = Registry::new();
        let (conn, _tx, mut rx) = registry.register(5).await;
        let (_other, _tx_other, _rx_other) = registry.register(5).await;

        registry.unregister(5, conn).await;
        registry.broadcast(5, &error_event("late")).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn empty_bucket_is_dropped() {
        let registry = Registry::new();
        let (conn, _tx, _rx) = registry.register(9).await;
        assert_eq!(registry.connection_count(9).await, 1);

        registry.unregister(9, conn).await;
        assert_eq!(registry.connection_count(9).await, 0);
        assert!(registry.inner.chats.read().await.get(&9).is_none());
    }

    #[tokio::test]
    async fn unregister_is_idempotent() {
        let registry = Registry::new();
        let (conn, _tx, _rx) = registry.register(9).await;
        registry.unregister(9, conn).await;
        registry.unregister(9, conn).await;
        assert_eq!(registry.connection_count(9).await, 0);
    }

    #[tokio::test]
    async fn broadcast_survives_a_dead_receiver() {
        let registry = Registry::new();
        let (_dead, tx_dead, rx_dead) = registry.register(5).await;
        let (_live, _tx_live, mut rx_live) = registry.register(5).await;
        drop(rx_dead);
        drop(tx_dead);

        registry.broadcast(5, &error_event("still here")).await;

        assert!(rx_live.recv().await.unwrap().contains("still here"));
    }
}
