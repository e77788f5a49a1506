//! NATS publisher
//!
//! Fire-and-forget publishing for the event and log relays. Producers never
//! await NATS: they push `RelayMessage`s into a bounded channel that
//! `forward` drains.

use crate::error::FleetError;
use crate::metrics;
use async_nats::Client;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Subject prefixes
pub mod subjects {
    /// Gateway events: fleet.events.{event_type}
    pub const EVENTS: &str = "fleet.events";
    /// Operator log records: fleet.logs.{level}
    pub const LOGS: &str = "fleet.logs";
}

/// One message queued for NATS
#[derive(Debug, Clone)]
pub struct RelayMessage {
    pub subject: String,
    pub payload: Vec<u8>,
}

/// NATS publisher for relayed events and logs
pub struct NatsPublisher {
    client: Client,
    connected: AtomicBool,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
}

impl NatsPublisher {
    /// Connect to NATS server
    pub async fn connect(servers: &str) -> Result<Arc<Self>, FleetError> {
        info!(servers, "Connecting to NATS");

        let client = async_nats::connect(servers)
            .await
            .map_err(|e| FleetError::NatsConnectionFailed(Box::new(e)))?;

        metrics::set_nats_connected(true);

        Ok(Arc::new(Self {
            client,
            connected: AtomicBool::new(true),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
        }))
    }

    /// Check if connected
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Get total messages published
    pub fn messages_published(&self) -> u64 {
        self.messages_published.load(Ordering::Relaxed)
    }

    /// Get total publish failures
    pub fn publish_failures(&self) -> u64 {
        self.publish_failures.load(Ordering::Relaxed)
    }

    /// Publish one message
    pub async fn publish(&self, message: RelayMessage) -> Result<(), FleetError> {
        let RelayMessage { subject, payload } = message;

        match self.client.publish(subject.clone(), payload.into()).await {
            Ok(()) => {
                self.messages_published.fetch_add(1, Ordering::Relaxed);
                metrics::record_relay(true);
                debug!(subject, "Relayed message");
                Ok(())
            }
            Err(e) => {
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_relay(false);
                Err(FleetError::NatsPublishFailed {
                    subject,
                    source: Box::new(e),
                })
            }
        }
    }

    /// Drain a relay queue until every sender is gone
    pub async fn forward(self: Arc<Self>, mut queue: mpsc::Receiver<RelayMessage>) {
        while let Some(message) = queue.recv().await {
            if let Err(e) = self.publish(message).await {
                // Log relay skips this module's target, so this cannot loop
                warn!(error = %e, "Dropping relayed message");
            }
        }
        debug!("Relay queue closed");
    }

    /// Flush pending publishes and mark the publisher closed
    pub async fn close(&self) {
        info!("Closing NATS connection");
        if let Err(e) = self.client.flush().await {
            warn!(error = %e, "NATS flush failed during shutdown");
        }
        self.connected.store(false, Ordering::SeqCst);
        metrics::set_nats_connected(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_prefixes() {
        assert_eq!(subjects::EVENTS, "fleet.events");
        assert_eq!(subjects::LOGS, "fleet.logs");
        assert!(!subjects::EVENTS.starts_with(subjects::LOGS));
    }
}
