use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::connections::{ConnectionHandle, ConnectionSet, Recipients};
use crate::metrics::BroadcastMetrics;
use crate::websocket::{OutboundFrame, ServerEvent};

/// Threshold for encoding the payload once and sharing it across recipients
const PRESERIALIZATION_THRESHOLD: usize = 4;

/// Result of one fan-out
#[derive(Debug, Clone, Copy, Serialize)]
pub struct DeliveryReport {
    /// Number of connections that accepted the event
    pub delivered: usize,
    /// Number of connections that could not accept it
    pub failed: usize,
}

/// Statistics for the broadcaster
#[derive(Debug, Default)]
pub struct BroadcastStats {
    /// Events sent to a single connection (login replies)
    pub direct_sends: AtomicU64,
    /// Events fanned out to many connections
    pub broadcasts: AtomicU64,
    /// Total per-connection deliveries accepted
    pub total_delivered: AtomicU64,
    /// Total per-connection deliveries that failed
    pub total_failed: AtomicU64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            direct_sends: self.direct_sends.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            total_delivered: self.total_delivered.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of broadcaster statistics
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStatsSnapshot {
    pub direct_sends: u64,
    pub broadcasts: u64,
    pub total_delivered: u64,
    pub total_failed: u64,
}

/// Fans events out to connected clients.
///
/// Broadcasts are fire-and-forget: each recipient's queue is offered the
/// event exactly once, a full or closed queue counts as a failed delivery,
/// and nothing is retried or reported back to the originating client. A
/// slow consumer therefore never stalls delivery to anyone else.
pub struct Broadcaster {
    connections: Arc<ConnectionSet>,
    stats: BroadcastStats,
}

impl Broadcaster {
    pub fn new(connections: Arc<ConnectionSet>) -> Self {
        Self {
            connections,
            stats: BroadcastStats::default(),
        }
    }

    /// Get broadcaster statistics
    pub fn stats(&self) -> BroadcastStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send an event to a single connection, waiting for queue space.
    ///
    /// Used for the direct replies a handler owes the originating client;
    /// everything aimed at "all" or "all others" goes through the fan-out
    /// paths instead.
    #[tracing::instrument(
        name = "broadcaster.send_to",
        skip(self, conn, event),
        fields(connection_id = %conn.id, event = %event.name())
    )]
    pub async fn send_to(&self, conn: &ConnectionHandle, event: ServerEvent) -> bool {
        self.stats.direct_sends.fetch_add(1, Ordering::Relaxed);

        match conn.send(event).await {
            Ok(()) => {
                self.stats.total_delivered.fetch_add(1, Ordering::Relaxed);
                BroadcastMetrics::record_delivered(1);
                true
            }
            Err(_) => {
                self.stats.total_failed.fetch_add(1, Ordering::Relaxed);
                BroadcastMetrics::record_failed(1);
                tracing::warn!("Failed to deliver event, connection closed");
                false
            }
        }
    }

    /// Broadcast an event to every live connection, sender included.
    #[tracing::instrument(
        name = "broadcaster.broadcast_all",
        skip(self, event),
        fields(event = %event.name())
    )]
    pub fn broadcast_all(&self, event: ServerEvent) -> DeliveryReport {
        let recipients = self.connections.all();
        self.fan_out(recipients, event)
    }

    /// Broadcast an event to every live connection except one.
    #[tracing::instrument(
        name = "broadcaster.broadcast_except",
        skip(self, event),
        fields(event = %event.name(), excluded = %excluded)
    )]
    pub fn broadcast_except(&self, excluded: Uuid, event: ServerEvent) -> DeliveryReport {
        let recipients = self.connections.all_except(excluded);
        self.fan_out(recipients, event)
    }

    /// Offer an event to each recipient's queue without waiting.
    ///
    /// Larger fan-outs serialize the payload once and share it; small ones
    /// hand each recipient the event itself and let its send task encode.
    fn fan_out(&self, recipients: Recipients, event: ServerEvent) -> DeliveryReport {
        let event_name = event.name();

        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        BroadcastMetrics::record_broadcast(event_name);

        if recipients.is_empty() {
            return DeliveryReport {
                delivered: 0,
                failed: 0,
            };
        }

        let frame = if recipients.len() >= PRESERIALIZATION_THRESHOLD {
            match OutboundFrame::shared(&event) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::error!(error = %e, event = event_name, "Failed to pre-serialize event, falling back to per-connection serialization");
                    OutboundFrame::Event(event)
                }
            }
        } else {
            OutboundFrame::Event(event)
        };

        let mut delivered = 0;
        let mut failed = 0;
        for conn in &recipients {
            match conn.try_send_frame(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    failed += 1;
                    tracing::debug!(
                        connection_id = %conn.id,
                        event = event_name,
                        "Dropped event for slow or closed connection"
                    );
                }
            }
        }

        self.stats.total_delivered.fetch_add(delivered as u64, Ordering::Relaxed);
        self.stats.total_failed.fetch_add(failed as u64, Ordering::Relaxed);
        BroadcastMetrics::record_delivered(delivered as u64);
        BroadcastMetrics::record_failed(failed as u64);

        tracing::debug!(
            event = event_name,
            delivered = delivered,
            failed = failed,
            "Broadcast complete"
        );

        DeliveryReport { delivered, failed }
    }
}
