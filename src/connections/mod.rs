use chrono::{DateTime, Utc};
use dashmap::DashMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::websocket::{OutboundFrame, ServerEvent};

/// Recipient buffer for fan-out. Small rooms stay on the stack.
pub type Recipients = SmallVec<[Arc<ConnectionHandle>; 8]>;

/// Handle for a single WebSocket connection
pub struct ConnectionHandle {
    pub id: Uuid,
    pub sender: mpsc::Sender<OutboundFrame>,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionHandle {
    pub fn new(sender: mpsc::Sender<OutboundFrame>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            connected_at: Utc::now(),
        }
    }

    /// Queue an event for this connection, waiting if its queue is full.
    pub async fn send(&self, event: ServerEvent) -> Result<(), mpsc::error::SendError<OutboundFrame>> {
        self.sender.send(OutboundFrame::Event(event)).await
    }

    /// Queue a frame without waiting. Fails if the queue is full or the
    /// send task is gone, and never blocks the caller on a slow peer.
    pub fn try_send_frame(&self, frame: OutboundFrame) -> Result<(), mpsc::error::TrySendError<OutboundFrame>> {
        self.sender.try_send(frame)
    }
}

/// Tracks all live WebSocket connections, authenticated or not.
pub struct ConnectionSet {
    /// connection_id -> ConnectionHandle
    connections: DashMap<Uuid, Arc<ConnectionHandle>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a new connection
    pub fn register(&self, sender: mpsc::Sender<OutboundFrame>) -> Arc<ConnectionHandle> {
        let handle = Arc::new(ConnectionHandle::new(sender));
        self.connections.insert(handle.id, handle.clone());

        tracing::info!(connection_id = %handle.id, "Connection registered");

        handle
    }

    /// Unregister a connection
    pub fn unregister(&self, connection_id: Uuid) {
        if self.connections.remove(&connection_id).is_some() {
            tracing::info!(connection_id = %connection_id, "Connection unregistered");
        }
    }

    /// Get connection by ID
    pub fn get(&self, connection_id: Uuid) -> Option<Arc<ConnectionHandle>> {
        self.connections.get(&connection_id).map(|h| h.clone())
    }

    /// All live connections.
    pub fn all(&self) -> Recipients {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// All live connections except one, typically the sender of an event.
    pub fn all_except(&self, excluded: Uuid) -> Recipients {
        self.connections
            .iter()
            .filter(|r| *r.key() != excluded)
            .map(|r| r.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Get statistics
    pub fn stats(&self) -> ConnectionSetStats {
        ConnectionSetStats {
            total_connections: self.connections.len(),
        }
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct ConnectionSetStats {
    pub total_connections: usize,
}
