//! Gateway session establishment
//!
//! `Connector` is the seam between the fleet and the transport. The
//! production implementation drives Twilight shards; tests substitute an
//! in-memory one.

use crate::error::FleetError;
use crate::metrics;
use crate::shard::connection::{ConnectionState, ShardConnection};

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use twilight_gateway::error::{ReceiveMessageError, ReceiveMessageErrorType};
use twilight_gateway::{Config, EventTypeFlags, Intents, MessageSender, Shard, StreamExt as _};
use twilight_model::gateway::event::Event;
use twilight_model::gateway::payload::outgoing::UpdatePresence;
use twilight_model::gateway::presence::{Activity, ActivityType, MinimalActivity, Status};

/// Circuit breaker: a shard is given up after this many receive errors in a row
pub const MAX_CONSECUTIVE_ERRORS: u32 = 10;

/// Opens gateway sessions for fleet connections
pub trait Connector: Send + Sync {
    /// Establish the session behind `connection`
    ///
    /// Resolves once the session is usable. After that the session keeps
    /// feeding `connection.dispatch` on its own task.
    fn connect(
        &self,
        connection: Arc<ShardConnection>,
    ) -> impl Future<Output = Result<(), FleetError>> + Send;

    /// Best-effort status refresh for a connected shard
    fn refresh(
        &self,
        connection: &ShardConnection,
        status: &str,
    ) -> impl Future<Output = Result<(), FleetError>> + Send;
}

/// Presence text shown by every shard once the fleet is LOADED
pub fn presence_text(prefix: &str, guilds: usize, index: u32, total: u32) -> String {
    format!("{prefix}help | {guilds} guilds [{index}/{total}]")
}

/// Twilight-backed connector
pub struct GatewayConnector {
    token: String,
    intents: Intents,
    connect_timeout: Duration,
    senders: DashMap<u32, MessageSender>,
}

impl GatewayConnector {
    pub fn new(token: String, intents: Intents, connect_timeout: Duration) -> Self {
        Self {
            token,
            intents,
            connect_timeout,
            senders: DashMap::new(),
        }
    }
}

impl Connector for GatewayConnector {
    async fn connect(&self, connection: Arc<ShardConnection>) -> Result<(), FleetError> {
        let index = connection.index();
        let config = Config::new(self.token.clone(), self.intents);
        let mut shard = Shard::with_config(connection.shard_id(), config);

        connection.set_state(ConnectionState::Connecting);
        let started = Instant::now();

        let outcome = tokio::time::timeout(self.connect_timeout, await_ready(&mut shard, &connection)).await;
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                connection.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
            Err(_) => {
                connection.set_state(ConnectionState::Disconnected);
                return Err(FleetError::ConnectionTimeout {
                    shard: index,
                    timeout: self.connect_timeout,
                });
            }
        }

        metrics::record_connect_duration(index, started.elapsed());
        self.senders.insert(index, shard.sender());
        tokio::spawn(run_shard(shard, connection));
        Ok(())
    }

    async fn refresh(&self, connection: &ShardConnection, status: &str) -> Result<(), FleetError> {
        let index = connection.index();
        let sender = self
            .senders
            .get(&index)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| FleetError::PresenceUpdate {
                shard: index,
                source: "shard has no live session".into(),
            })?;

        let activity: Activity = MinimalActivity {
            kind: ActivityType::Playing,
            name: status.to_string(),
            url: None,
        }
        .into();

        let presence = UpdatePresence::new(vec![activity], false, None::<u64>, Status::Online)
            .map_err(|e| FleetError::PresenceUpdate {
                shard: index,
                source: Box::new(e),
            })?;

        sender.command(&presence).map_err(|e| FleetError::PresenceUpdate {
            shard: index,
            source: Box::new(e),
        })
    }
}

fn is_reconnect_failure(source: &ReceiveMessageError) -> bool {
    matches!(source.kind(), ReceiveMessageErrorType::Reconnect)
}

/// Pump events until READY
async fn await_ready(shard: &mut Shard, connection: &ShardConnection) -> Result<(), FleetError> {
    let index = connection.index();
    let mut consecutive_errors: u32 = 0;

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        match item {
            Ok(event) => {
                consecutive_errors = 0;
                let ready = matches!(event, Event::Ready(_));
                connection.dispatch(&event);
                if ready {
                    info!(shard = index, guilds = connection.cache().guilds().len(), "Shard ready");
                    return Ok(());
                }
            }
            Err(source) => {
                consecutive_errors += 1;
                if is_reconnect_failure(&source) || consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    return Err(FleetError::ConnectionFailed {
                        shard: index,
                        source: Box::new(source),
                    });
                }
                warn!(shard = index, error = %source, consecutive = consecutive_errors, "Error while connecting");
            }
        }
    }

    Err(FleetError::ConnectionFailed {
        shard: index,
        source: "gateway stream closed before READY".into(),
    })
}

/// Run a connected shard's event loop
async fn run_shard(mut shard: Shard, connection: Arc<ShardConnection>) {
    let index = connection.index();
    let mut consecutive_errors: u32 = 0;

    while let Some(item) = shard.next_event(EventTypeFlags::all()).await {
        let event = match item {
            Ok(event) => {
                consecutive_errors = 0;
                event
            }
            Err(source) => {
                consecutive_errors += 1;
                warn!(shard = index, error = %source, consecutive = consecutive_errors, "Error receiving event");

                // Immediate fatal: reconnect failure
                if is_reconnect_failure(&source) {
                    let err = FleetError::ShardReconnectFailed {
                        shard: index,
                        source: Box::new(source),
                    };
                    metrics::record_error(index, &err);
                    connection.set_state(ConnectionState::Disconnected);
                    error!(shard = index, error = %err, "Shard lost");
                    return;
                }

                if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                    let err = FleetError::ShardCircuitBroken {
                        shard: index,
                        count: consecutive_errors,
                        max: MAX_CONSECUTIVE_ERRORS,
                    };
                    metrics::record_error(index, &err);
                    connection.set_state(ConnectionState::Disconnected);
                    error!(shard = index, error = %err, "Shard lost");
                    return;
                }

                connection.set_state(ConnectionState::Connecting);
                continue;
            }
        };

        connection.dispatch(&event);
    }

    connection.set_state(ConnectionState::Disconnected);
    info!(shard = index, "Shard event stream ended");
}
