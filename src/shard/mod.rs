//! Shard management module
//!
//! A shard is one gateway session owning a deterministic slice of guilds.

mod cache;
mod connection;
mod connector;
mod recommend;

pub use cache::{CacheKind, CachedChannel, CachedGuild, CachedUser, ChannelKind, ShardCache};
pub use connection::{ConnectionState, ShardConnection};
pub use connector::{presence_text, Connector, GatewayConnector, MAX_CONSECUTIVE_ERRORS};
pub use recommend::{FixedShardCount, GatewayShardCount, ShardCountSource};
