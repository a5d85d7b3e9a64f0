use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::broadcast::Broadcaster;
use crate::connection::{ConnectionManager, OutboundFrame};
use crate::metrics::PublishMetrics;

use super::types::{EventKind, PlatformEvent};

/// Statistics for the event publisher
#[derive(Debug, Default)]
struct PublisherStats {
    events_published: AtomicU64,
    events_delivered: AtomicU64,
    /// Publishes that reached no connection (recipient offline)
    events_unrouted: AtomicU64,
}

/// Snapshot of publisher statistics
#[derive(Debug, Clone, Serialize)]
pub struct PublisherStatsSnapshot {
    pub events_published: u64,
    pub events_delivered: u64,
    pub events_unrouted: u64,
}

/// Publishes typed platform events to connected users.
///
/// This is the primitive external services (scoring, achievements, rank
/// recalculation) call into; they never touch room or connection state
/// directly. Delivery is best-effort: publishing to a user without an open
/// connection is a silent no-op, not an error.
pub struct EventPublisher {
    broadcaster: Broadcaster,
    stats: PublisherStats,
}

impl EventPublisher {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            broadcaster: Broadcaster::new(connections),
            stats: PublisherStats::default(),
        }
    }

    /// Deliver an event to one user's personal room (all their connections).
    /// Returns the number of connections reached; 0 means the user was offline.
    #[tracing::instrument(name = "notify.publish", skip(self, data), fields(kind = kind.as_str()))]
    pub fn publish(&self, user_id: &str, kind: EventKind, data: serde_json::Value) -> usize {
        let event = PlatformEvent::for_user(kind, data, user_id);

        let Some(frame) = self.encode(&event) else {
            return 0;
        };
        let delivered = self.broadcaster.to_user(user_id, &frame);
        self.record(kind, delivered);

        tracing::debug!(
            user_id = %user_id,
            delivered = delivered,
            "Published event to user"
        );
        delivered
    }

    /// Deliver an event to every subscriber of an ad hoc room.
    #[tracing::instrument(name = "notify.publish_channel", skip(self, data), fields(kind = kind.as_str()))]
    pub fn publish_to_channel(
        &self,
        channel: &str,
        kind: EventKind,
        data: serde_json::Value,
    ) -> usize {
        let event = PlatformEvent::new(kind, data);

        let Some(frame) = self.encode(&event) else {
            return 0;
        };
        let delivered = self.broadcaster.to_channel(channel, &frame);
        self.record(kind, delivered);

        tracing::debug!(
            channel = %channel,
            delivered = delivered,
            "Published event to channel"
        );
        delivered
    }

    /// Deliver an event to every authenticated connection.
    #[tracing::instrument(name = "notify.broadcast", skip(self, data), fields(kind = kind.as_str()))]
    pub fn broadcast(&self, kind: EventKind, data: serde_json::Value) -> usize {
        let event = PlatformEvent::new(kind, data);

        let Some(frame) = self.encode(&event) else {
            return 0;
        };
        let delivered = self.broadcaster.to_all(&frame);
        self.record(kind, delivered);

        tracing::debug!(delivered = delivered, "Broadcast event to all connections");
        delivered
    }

    /// Encode an already-built event; used by the socket handler for the
    /// welcome event so its shape matches published events exactly.
    pub(crate) fn encode(&self, event: &PlatformEvent) -> Option<OutboundFrame> {
        match OutboundFrame::encode(event) {
            Ok(frame) => Some(frame),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                None
            }
        }
    }

    fn record(&self, kind: EventKind, delivered: usize) {
        self.stats.events_published.fetch_add(1, Ordering::Relaxed);
        if delivered > 0 {
            self.stats
                .events_delivered
                .fetch_add(delivered as u64, Ordering::Relaxed);
        } else {
            self.stats.events_unrouted.fetch_add(1, Ordering::Relaxed);
        }
        PublishMetrics::record(kind.as_str());
    }

    pub fn stats(&self) -> PublisherStatsSnapshot {
        PublisherStatsSnapshot {
            events_published: self.stats.events_published.load(Ordering::Relaxed),
            events_delivered: self.stats.events_delivered.load(Ordering::Relaxed),
            events_unrouted: self.stats.events_unrouted.load(Ordering::Relaxed),
        }
    }
}
