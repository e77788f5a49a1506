//! Scatter-gather reads across the fleet
//!
//! Every read walks the connections in shard order and takes one snapshot
//! per connection. No lock spans connections, so a sweep may interleave
//! with event processing; each result reflects some instant per shard.
//! Reads are legal in any phase and return whatever is cached so far.

use super::merged::MergedUser;
use super::{Fleet, LifecyclePhase, SessionHandle};
use crate::shard::{CacheKind, CachedChannel, CachedGuild, CachedUser, ChannelKind, ShardConnection};

use serde::Serialize;
use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};
use twilight_model::id::Id;

/// Per-shard row of `FleetStats`
#[derive(Debug, Clone, Serialize)]
pub struct ShardStats {
    pub index: u32,
    pub state: &'static str,
    pub guilds: usize,
    pub users: usize,
    pub response_count: u64,
}

/// Fleet-wide summary
#[derive(Debug, Clone, Serialize)]
pub struct FleetStats {
    pub phase: LifecyclePhase,
    pub total_shards: u32,
    pub connected_shards: usize,
    pub guilds: usize,
    pub users: usize,
    pub text_channels: usize,
    pub voice_channels: usize,
    pub response_total: u64,
    pub shards: Vec<ShardStats>,
}

/// Keep the first entry for every key
fn unique_by<T, K, F>(items: impl Iterator<Item = Arc<T>>, key: F) -> Vec<Arc<T>>
where
    K: Eq + Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(key(&**item))).collect()
}

impl Fleet {
    /// Every cached guild; each guild appears once
    pub fn all_guilds(&self) -> Vec<Arc<CachedGuild>> {
        unique_by(
            self.connections.iter().flat_map(|c| c.cache().guilds()),
            |guild| guild.id,
        )
    }

    /// Every cached user, once per connection that caches it
    pub fn all_users(&self) -> Vec<Arc<CachedUser>> {
        self.connections.iter().flat_map(|c| c.cache().users()).collect()
    }

    pub fn all_text_channels(&self) -> Vec<Arc<CachedChannel>> {
        unique_by(
            self.connections.iter().flat_map(|c| c.cache().text_channels()),
            |channel| channel.id,
        )
    }

    pub fn all_voice_channels(&self) -> Vec<Arc<CachedChannel>> {
        unique_by(
            self.connections.iter().flat_map(|c| c.cache().voice_channels()),
            |channel| channel.id,
        )
    }

    /// Gateway payloads received by all shards
    pub fn response_total(&self) -> u64 {
        self.connections.iter().map(|c| c.response_count()).sum()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connected_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_connected()).count()
    }

    /// Shard index a session handle refers to; unsharded sessions are shard 0
    pub fn session_index(&self, handle: &impl SessionHandle) -> u32 {
        handle.shard_id().map_or(0, |id| id.number())
    }

    /// Connection behind a session handle
    pub fn connection_for_session(&self, handle: &impl SessionHandle) -> Option<&Arc<ShardConnection>> {
        self.connection_at(self.session_index(handle))
    }

    /// Guild lookup on its owning shard
    pub fn guild(&self, id: Id<GuildMarker>) -> Option<Arc<CachedGuild>> {
        self.connection_for(id).cache().guild(id)
    }

    /// First cached copy of a user, in shard order
    pub fn user(&self, id: Id<UserMarker>) -> Option<Arc<CachedUser>> {
        self.connections.iter().find_map(|c| c.cache().user(id))
    }

    pub fn text_channel(&self, id: Id<ChannelMarker>) -> Option<Arc<CachedChannel>> {
        self.channel_of(id, ChannelKind::Text)
    }

    pub fn voice_channel(&self, id: Id<ChannelMarker>) -> Option<Arc<CachedChannel>> {
        self.channel_of(id, ChannelKind::Voice)
    }

    fn channel_of(&self, id: Id<ChannelMarker>, kind: ChannelKind) -> Option<Arc<CachedChannel>> {
        self.connections
            .iter()
            .filter_map(|c| c.cache().channel(id))
            .find(|channel| channel.kind == kind)
    }

    /// Merged view over every shard's copy of a user
    pub fn merged_user(&self, id: Id<UserMarker>) -> Option<MergedUser> {
        MergedUser::collect(self, id)
    }

    /// Summary for the health surface
    pub fn stats(&self) -> FleetStats {
        let shards: Vec<ShardStats> = self
            .connections
            .iter()
            .map(|c| ShardStats {
                index: c.index(),
                state: c.state().as_str(),
                guilds: c.cache().len(CacheKind::Guilds),
                users: c.cache().len(CacheKind::Users),
                response_count: c.response_count(),
            })
            .collect();

        FleetStats {
            phase: self.phase(),
            total_shards: self.total_shards(),
            connected_shards: self.connected_count(),
            guilds: self.all_guilds().len(),
            users: shards.iter().map(|s| s.users).sum(),
            text_channels: self.all_text_channels().len(),
            voice_channels: self.all_voice_channels().len(),
            response_total: self.response_total(),
            shards,
        }
    }
}
