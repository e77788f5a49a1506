//! Sharded Discord gateway fleet
//!
//! Runs every shard of a bot in one process: guilds are routed to shards
//! by snowflake, shards connect one at a time with a cooldown, startup
//! moves through PRELOAD, LOADING, LOADED and POSTLOAD, and the per-shard
//! caches can be read as one fleet.

pub mod config;
pub mod error;
pub mod events;
pub mod fleet;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod modules;
pub mod nats;
pub mod orchestrator;
pub mod shard;

pub use config::FleetConfig;
pub use error::FleetError;
pub use fleet::{route_of, Fleet, LifecyclePhase, MergedUser, PhaseTracker};
pub use orchestrator::{Bootstrapped, FleetOrchestrator, PreparedFleet};
