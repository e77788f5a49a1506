//! Domain error types for the shard fleet
//!
//! main.rs is the ONLY module allowed to use anyhow::Result (process boundary).
//! All library code returns Result<T, FleetError>.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::fleet::LifecyclePhase;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fleet domain errors
///
/// Every variant carries structured context fields for diagnostics.
/// Only bootstrap failures are fatal; everything else is logged and
/// degraded around by the caller.
///
/// Example log output:
/// ```text
/// FleetError::ConnectionFailed { shard: 3, .. }
/// → "shard 3 failed to establish a gateway session"
/// ```
#[derive(Error, Debug)]
pub enum FleetError {
    /// Gateway session could not be established (fatal during bootstrap)
    #[error("shard {shard} failed to establish a gateway session")]
    ConnectionFailed {
        shard: u32,
        #[source]
        source: BoxError,
    },

    /// Gateway session did not become ready in time (fatal during bootstrap)
    #[error("shard {shard} did not become ready within {timeout:?}")]
    ConnectionTimeout { shard: u32, timeout: Duration },

    /// Shard exceeded consecutive error threshold (circuit breaker tripped)
    #[error("shard {shard} exceeded consecutive error threshold ({count}/{max})")]
    ShardCircuitBroken { shard: u32, count: u32, max: u32 },

    /// Shard reconnection failed after the session was established
    #[error("shard {shard} reconnection failed")]
    ShardReconnectFailed {
        shard: u32,
        #[source]
        source: BoxError,
    },

    /// Recommended shard count request failed (recovered: fallback to 1)
    #[error("recommended shard count request failed")]
    ShardCountQuery(#[source] BoxError),

    /// Recommended shard count request timed out (recovered: fallback to 1)
    #[error("recommended shard count request timed out after {0:?}")]
    ShardCountTimeout(Duration),

    /// Presence update could not be queued on a shard (recovered)
    #[error("presence update failed on shard {shard}")]
    PresenceUpdate {
        shard: u32,
        #[source]
        source: BoxError,
    },

    /// A module constructor refused to build (recovered: module excluded)
    #[error("module '{module}' failed to instantiate: {reason}")]
    ModuleInstantiation { module: &'static str, reason: String },

    /// Module discovery task panicked or was cancelled
    #[error("module discovery did not complete")]
    ModuleDiscovery(#[source] tokio::task::JoinError),

    /// Lifecycle phase moved anywhere but one step forward
    #[error("illegal lifecycle transition {from:?} -> {to:?}")]
    PhaseTransition {
        from: LifecyclePhase,
        to: LifecyclePhase,
    },

    /// NATS publish failed for a specific subject
    #[error("NATS publish failed for subject '{subject}'")]
    NatsPublishFailed {
        subject: String,
        #[source]
        source: BoxError,
    },

    /// NATS connection failed
    #[error("NATS connection failed")]
    NatsConnectionFailed(#[source] BoxError),

    /// Event serialization failed
    #[error("event serialization failed for {event_type} on shard {shard}")]
    SerializationFailed {
        event_type: String,
        shard: u32,
        #[source]
        source: serde_json::Error,
    },

    /// Configuration error (environment variable or file missing or invalid)
    #[error("configuration error: {0}")]
    Config(String),

    /// Effective configuration could not be written back
    #[error("failed to persist configuration to {}", path.display())]
    ConfigPersist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FleetError {
    /// Returns a static label string suitable for Prometheus metrics.
    ///
    /// Used as the `error_type` label on `fleet_errors_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::ConnectionTimeout { .. } => "connection_timeout",
            Self::ShardCircuitBroken { .. } => "circuit_broken",
            Self::ShardReconnectFailed { .. } => "reconnect_failed",
            Self::ShardCountQuery(_) => "shard_count_query",
            Self::ShardCountTimeout(_) => "shard_count_timeout",
            Self::PresenceUpdate { .. } => "presence_update",
            Self::ModuleInstantiation { .. } => "module_instantiation",
            Self::ModuleDiscovery(_) => "module_discovery",
            Self::PhaseTransition { .. } => "phase_transition",
            Self::NatsPublishFailed { .. } => "nats_publish",
            Self::NatsConnectionFailed(_) => "nats_connection",
            Self::SerializationFailed { .. } => "serialization",
            Self::Config(_) => "config",
            Self::ConfigPersist { .. } => "config_persist",
        }
    }

    /// True for errors that must abort bootstrap.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ModuleDiscovery(_)
                | Self::PhaseTransition { .. }
                | Self::Config(_)
        )
    }
}
