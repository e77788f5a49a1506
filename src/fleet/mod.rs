//! The shard fleet
//!
//! A fixed-size, ordered set of shard connections and the routing function
//! that assigns every guild to exactly one of them. The fleet is built once
//! per process and shared as `Arc<Fleet>`; its size never changes.

mod aggregate;
mod merged;
mod phase;

pub use aggregate::{FleetStats, ShardStats};
pub use merged::MergedUser;
pub use phase::{LifecyclePhase, PhaseTracker};

use crate::shard::ShardConnection;

use std::num::NonZeroU32;
use std::sync::Arc;
use twilight_model::gateway::payload::incoming::Ready;
use twilight_model::gateway::ShardId;
use twilight_model::id::marker::GuildMarker;
use twilight_model::id::Id;

/// Shard index owning `guild_id` in a fleet of `total_shards`
///
/// Uses the snowflake's timestamp bits, so the result is stable for the
/// guild's lifetime and always in `[0, total_shards)`.
pub const fn route_of(guild_id: u64, total_shards: NonZeroU32) -> u32 {
    ((guild_id >> 22) % total_shards.get() as u64) as u32
}

/// Something that may carry the shard identity of a gateway session
pub trait SessionHandle {
    fn shard_id(&self) -> Option<ShardId>;
}

impl SessionHandle for ShardId {
    fn shard_id(&self) -> Option<ShardId> {
        Some(*self)
    }
}

impl SessionHandle for Option<ShardId> {
    fn shard_id(&self) -> Option<ShardId> {
        *self
    }
}

impl SessionHandle for Ready {
    fn shard_id(&self) -> Option<ShardId> {
        self.shard
    }
}

impl SessionHandle for ShardConnection {
    fn shard_id(&self) -> Option<ShardId> {
        Some(ShardConnection::shard_id(self))
    }
}

/// All shard connections of this process
#[derive(Debug)]
pub struct Fleet {
    connections: Vec<Arc<ShardConnection>>,
    total_shards: NonZeroU32,
    phases: Arc<PhaseTracker>,
}

impl Fleet {
    /// Build the fleet with one disconnected handle per shard
    pub fn new(total_shards: NonZeroU32, phases: Arc<PhaseTracker>) -> Self {
        let total = total_shards.get();
        let connections = (0..total)
            .map(|index| Arc::new(ShardConnection::new(index, total)))
            .collect();

        Self {
            connections,
            total_shards,
            phases,
        }
    }

    pub fn total_shards(&self) -> u32 {
        self.total_shards.get()
    }

    /// Shard index owning a guild
    pub fn route(&self, guild_id: Id<GuildMarker>) -> u32 {
        route_of(guild_id.get(), self.total_shards)
    }

    /// Connection by shard index; `None` when out of range
    pub fn connection_at(&self, index: u32) -> Option<&Arc<ShardConnection>> {
        self.connections.get(index as usize)
    }

    /// Connection owning a guild
    pub fn connection_for(&self, guild_id: Id<GuildMarker>) -> &Arc<ShardConnection> {
        // route() is always < total_shards == connections.len()
        &self.connections[self.route(guild_id) as usize]
    }

    /// Every connection, in shard order
    pub fn connections(&self) -> &[Arc<ShardConnection>] {
        &self.connections
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.phases.current()
    }

    pub fn phases(&self) -> &Arc<PhaseTracker> {
        &self.phases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn fleet(total: u32) -> Fleet {
        Fleet::new(NonZeroU32::new(total).unwrap(), Arc::new(PhaseTracker::new()))
    }

    #[test]
    fn test_route_example() {
        let five = NonZeroU32::new(5).unwrap();
        assert_eq!(route_of(13 * (1 << 22), five), 3);
        assert_eq!(route_of(54_525_952, five), 3);
    }

    #[test]
    fn test_single_shard_owns_everything() {
        let one = NonZeroU32::new(1).unwrap();
        assert_eq!(route_of(0, one), 0);
        assert_eq!(route_of(u64::MAX, one), 0);
    }

    #[test]
    fn test_low_bits_do_not_affect_routing() {
        let four = NonZeroU32::new(4).unwrap();
        let base = 7u64 << 22;
        assert_eq!(route_of(base, four), route_of(base | 0x3F_FFFF, four));
    }

    #[test]
    fn test_connection_at_bounds() {
        let fleet = fleet(3);
        assert_eq!(fleet.connection_at(0).unwrap().index(), 0);
        assert_eq!(fleet.connection_at(2).unwrap().index(), 2);
        assert!(fleet.connection_at(3).is_none());
        assert!(fleet.connection_at(u32::MAX).is_none());
    }

    #[test]
    fn test_connections_exist_before_connecting() {
        let fleet = fleet(4);
        assert_eq!(fleet.connections().len(), 4);
        assert!(fleet.connections().iter().all(|c| !c.is_connected()));
        assert_eq!(fleet.phase(), LifecyclePhase::PreLoad);
    }

    #[test]
    fn test_session_handles() {
        assert_eq!(ShardId::new(2, 4).shard_id().map(|id| id.number()), Some(2));
        assert_eq!(None::<ShardId>.shard_id(), None);
    }

    proptest! {
        #[test]
        fn prop_route_is_shifted_modulo(guild_id in any::<u64>(), total in 1u32..=4096) {
            let total = NonZeroU32::new(total).unwrap();
            let index = route_of(guild_id, total);
            prop_assert!(index < total.get());
            prop_assert_eq!(u64::from(index), (guild_id >> 22) % u64::from(total.get()));
        }

        #[test]
        fn prop_connection_for_matches_route(raw in 1u64..=u64::MAX, total in 1u32..=64) {
            let fleet = fleet(total);
            let guild_id = Id::<GuildMarker>::new(raw);
            let connection = fleet.connection_for(guild_id);
            prop_assert_eq!(connection.index(), fleet.route(guild_id));
        }
    }
}
