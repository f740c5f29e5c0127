use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::debug;

use crate::events::CrewEvent;
use crate::session::SessionId;

struct Connection {
    generation: u64,
    sender: mpsc::UnboundedSender<CrewEvent>,
}

/// Registry of live observer connections, at most one per session id.
/// Each connection carries a generation token so a superseded connection's
/// teardown cannot evict its successor. Delivery is best-effort: a
/// connection that went away is dropped silently on the next send, never
/// surfaced to the producer.
#[derive(Clone, Default)]
pub struct EventSink {
    connections: Arc<RwLock<HashMap<SessionId, Connection>>>,
    next_generation: Arc<AtomicU64>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the connection for a session id, replacing any prior one.
    /// Returns the generation token to pass back to `disconnect`.
    pub async fn connect(
        &self,
        session_id: SessionId,
        sender: mpsc::UnboundedSender<CrewEvent>,
    ) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let mut connections = self.connections.write().await;
        if connections
            .insert(session_id, Connection { generation, sender })
            .is_some()
        {
            debug!("Replaced existing connection for session {}", session_id);
        }
        generation
    }

    /// Remove the connection for a session id, but only if it still is the
    /// one registered under the given generation; idempotent
    pub async fn disconnect(&self, session_id: SessionId, generation: u64) {
        let mut connections = self.connections.write().await;
        if connections
            .get(&session_id)
            .is_some_and(|conn| conn.generation == generation)
        {
            connections.remove(&session_id);
        }
    }

    /// Deliver an event to the session's connection, if any. A failed
    /// delivery means the receiver is gone; treat it as a disconnect.
    pub async fn send(&self, session_id: SessionId, event: CrewEvent) {
        let (generation, delivered) = {
            let connections = self.connections.read().await;
            match connections.get(&session_id) {
                Some(conn) => (conn.generation, conn.sender.send(event).is_ok()),
                None => return,
            }
        };

        if !delivered {
            debug!(
                "Dropping dead connection for session {} after failed delivery",
                session_id
            );
            self.disconnect(session_id, generation).await;
        }
    }

    /// Deliver an event to every registered connection independently
    pub async fn broadcast(&self, event: CrewEvent) {
        let session_ids: Vec<SessionId> = {
            let connections = self.connections.read().await;
            connections.keys().copied().collect()
        };

        for session_id in session_ids {
            self.send(session_id, event.clone()).await;
        }
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}
