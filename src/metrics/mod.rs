//! Prometheus metrics module
//!
//! Recording functions go through the `metrics` facade and are no-ops until
//! `FleetMetrics::install` registers the Prometheus recorder, so library
//! code and tests can call them unconditionally.

use crate::error::FleetError;
use crate::fleet::LifecyclePhase;
use crate::shard::ConnectionState;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Duration;
use twilight_model::gateway::event::Event;

/// Handle to the installed Prometheus recorder
#[derive(Clone)]
pub struct FleetMetrics {
    handle: Arc<PrometheusHandle>,
}

impl FleetMetrics {
    /// Install the global recorder and register metric descriptions
    pub fn install() -> Result<Self, FleetError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| FleetError::Config(format!("failed to install Prometheus recorder: {e}")))?;

        register_metrics();

        Ok(Self {
            handle: Arc::new(handle),
        })
    }

    /// Render metrics in Prometheus format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

fn register_metrics() {
    describe_counter!(
        "fleet_events_received_total",
        Unit::Count,
        "Gateway payloads received per shard"
    );
    describe_counter!(
        "fleet_errors_total",
        Unit::Count,
        "Fleet errors by type"
    );
    describe_counter!(
        "fleet_module_failures_total",
        Unit::Count,
        "Modules that failed to instantiate"
    );
    describe_counter!(
        "fleet_relay_published_total",
        Unit::Count,
        "Messages relayed to NATS"
    );
    describe_counter!(
        "fleet_relay_dropped_total",
        Unit::Count,
        "Messages the relay could not deliver"
    );

    describe_histogram!(
        "fleet_shard_connect_duration_seconds",
        Unit::Seconds,
        "Time from session start to READY"
    );

    describe_gauge!(
        "fleet_shard_state",
        "Shard connection state (0=disconnected, 1=connecting, 2=connected)"
    );
    describe_gauge!(
        "fleet_shards_connected",
        Unit::Count,
        "Shards currently connected"
    );
    describe_gauge!(
        "fleet_guilds",
        Unit::Count,
        "Guilds cached per shard"
    );
    describe_gauge!(
        "fleet_lifecycle_phase",
        "Lifecycle phase (0=preload, 1=loading, 2=loaded, 3=postload)"
    );
    describe_gauge!(
        "fleet_modules_active",
        Unit::Count,
        "Modules active after POSTLOAD"
    );
    describe_gauge!(
        "fleet_nats_connected",
        Unit::Count,
        "NATS connection status (1=connected, 0=disconnected)"
    );
}

/// Record a gateway payload received on a shard
pub fn record_event(shard: u32, event: &Event) {
    let event_type = match event {
        Event::GuildCreate(_) => "guild_create",
        Event::GuildDelete(_) => "guild_delete",
        Event::GuildUpdate(_) => "guild_update",
        Event::ChannelCreate(_) => "channel_create",
        Event::ChannelDelete(_) => "channel_delete",
        Event::MemberAdd(_) => "member_add",
        Event::MemberRemove(_) => "member_remove",
        Event::MessageCreate(_) => "message_create",
        Event::VoiceStateUpdate(_) => "voice_state_update",
        Event::Ready(_) => "ready",
        Event::Resumed => "resumed",
        Event::GatewayHeartbeatAck => "heartbeat_ack",
        _ => "other",
    };

    counter!(
        "fleet_events_received_total",
        "shard" => shard.to_string(),
        "event_type" => event_type
    )
    .increment(1);
}

/// Record a fleet error, labelled by its type
pub fn record_error(shard: u32, error: &FleetError) {
    counter!(
        "fleet_errors_total",
        "shard" => shard.to_string(),
        "error_type" => error.error_type_label()
    )
    .increment(1);
}

pub fn set_shard_state(shard: u32, state: ConnectionState) {
    gauge!("fleet_shard_state", "shard" => shard.to_string()).set(f64::from(state as u8));
}

pub fn set_shards_connected(count: usize) {
    gauge!("fleet_shards_connected").set(count as f64);
}

pub fn record_connect_duration(shard: u32, duration: Duration) {
    histogram!("fleet_shard_connect_duration_seconds", "shard" => shard.to_string())
        .record(duration.as_secs_f64());
}

/// Set guild count for a shard
pub fn set_guilds(shard: u32, count: usize) {
    gauge!("fleet_guilds", "shard" => shard.to_string()).set(count as f64);
}

pub fn set_phase(phase: LifecyclePhase) {
    gauge!("fleet_lifecycle_phase").set(f64::from(phase as u8));
}

pub fn set_modules_active(count: usize) {
    gauge!("fleet_modules_active").set(count as f64);
}

pub fn record_module_failure(module: &'static str) {
    counter!("fleet_module_failures_total", "module" => module).increment(1);
}

pub fn record_relay(published: bool) {
    if published {
        counter!("fleet_relay_published_total").increment(1);
    } else {
        counter!("fleet_relay_dropped_total").increment(1);
    }
}

/// Set NATS connection status
pub fn set_nats_connected(connected: bool) {
    gauge!("fleet_nats_connected").set(if connected { 1.0 } else { 0.0 });
}
