//! Shared event listeners
//!
//! Listeners are attached to every shard once the whole fleet is connected.
//! They run inline on the shard's event task, so they must not block.

mod log;
mod relay;
pub mod serialize;

pub use log::GuildLogListener;
pub use relay::RelayListener;
pub use serialize::{serialize_event, FleetEvent};

use crate::shard::ShardConnection;
use twilight_model::gateway::event::Event;

/// Observer of one shard's event stream
pub trait EventListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Called after the shard's caches have applied `event`
    fn on_event(&self, shard: &ShardConnection, event: &Event);
}
