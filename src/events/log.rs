use super::EventListener;
use crate::shard::{CacheKind, ShardConnection};

use tracing::{debug, info, warn};
use twilight_model::gateway::event::Event;

/// Logs session and guild membership changes per shard
#[derive(Debug, Default)]
pub struct GuildLogListener;

impl EventListener for GuildLogListener {
    fn name(&self) -> &'static str {
        "guild-log"
    }

    fn on_event(&self, shard: &ShardConnection, event: &Event) {
        let index = shard.index();
        match event {
            Event::GuildCreate(guild) => {
                debug!(
                    shard = index,
                    guild_id = %guild.id(),
                    guilds = shard.cache().len(CacheKind::Guilds),
                    "Guild available"
                );
            }
            Event::GuildDelete(guild) if guild.unavailable == Some(true) => {
                warn!(shard = index, guild_id = %guild.id, "Guild became unavailable");
            }
            Event::GuildDelete(guild) => {
                info!(
                    shard = index,
                    guild_id = %guild.id,
                    guilds = shard.cache().len(CacheKind::Guilds),
                    "Left guild"
                );
            }
            Event::Resumed => info!(shard = index, "Shard resumed"),
            Event::GatewayReconnect => info!(shard = index, "Gateway requested reconnect"),
            Event::GatewayInvalidateSession(resumable) => {
                warn!(shard = index, resumable, "Session invalidated");
            }
            _ => {}
        }
    }
}
