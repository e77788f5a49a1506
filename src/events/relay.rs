use super::serialize::serialize_event;
use super::EventListener;
use crate::metrics;
use crate::nats::RelayMessage;
use crate::shard::ShardConnection;

use tokio::sync::mpsc;
use tracing::debug;
use twilight_model::gateway::event::Event;

/// Forwards selected gateway events to NATS
///
/// Never blocks the shard: a full queue drops the event.
pub struct RelayListener {
    queue: mpsc::Sender<RelayMessage>,
}

impl RelayListener {
    pub fn new(queue: mpsc::Sender<RelayMessage>) -> Self {
        Self { queue }
    }
}

impl EventListener for RelayListener {
    fn name(&self) -> &'static str {
        "relay"
    }

    fn on_event(&self, shard: &ShardConnection, event: &Event) {
        let Some(payload) = serialize_event(event, shard.index()) else {
            return;
        };

        let message = match serde_json::to_vec(&payload) {
            Ok(bytes) => RelayMessage {
                subject: payload.subject(),
                payload: bytes,
            },
            Err(e) => {
                debug!(shard = shard.index(), error = %e, "Relay serialization failed");
                return;
            }
        };

        if self.queue.try_send(message).is_err() {
            metrics::record_relay(false);
            debug!(shard = shard.index(), event_type = payload.event_type, "Relay queue full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrelayed_events_are_not_queued() {
        let (tx, mut rx) = mpsc::channel(4);
        let listener = RelayListener::new(tx);
        let shard = ShardConnection::new(0, 1);

        listener.on_event(&shard, &Event::GatewayHeartbeatAck);
        listener.on_event(&shard, &Event::Resumed);

        assert!(rx.try_recv().is_err());
    }
}
