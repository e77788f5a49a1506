//! Merged user view
//!
//! The same Discord user can be cached independently by several shards
//! (guild members on different shards, DM authors on shard 0). A
//! `MergedUser` answers for all of those copies at once.
//!
//! Every accessor picks one live copy uniformly at random, per call. Two
//! calls may be answered by different copies and may disagree when the
//! copies have diverged. This is a representative read, not a consistent
//! one: callers that need several fields from the same copy should take
//! `snapshot()` once and read from that.

use super::Fleet;
use crate::shard::{CachedUser, ShardConnection};

use std::sync::{Arc, Weak};
use twilight_model::id::marker::UserMarker;
use twilight_model::id::Id;

const CDN: &str = "https://cdn.discordapp.com";

/// Where one copy lives: a shard, looked up by user id on every read
#[derive(Debug, Clone)]
struct UserCopy {
    shard: u32,
    connection: Weak<ShardConnection>,
}

/// One logical user across every shard that caches it
///
/// Holds lookup handles rather than the cached entries, so a shard that
/// re-caches the user (every MESSAGE_CREATE does) is still read through.
/// A shard that has since evicted the user is skipped.
#[derive(Debug, Clone)]
pub struct MergedUser {
    id: Id<UserMarker>,
    copies: Vec<UserCopy>,
}

impl MergedUser {
    /// Gather every shard holding `id`; `None` if no shard has one
    pub fn collect(fleet: &Fleet, id: Id<UserMarker>) -> Option<Self> {
        Self::from_connections(id, fleet.connections())
    }

    /// Build over the connections whose cache holds `id`; `None` if none do
    pub fn from_connections<'a>(
        id: Id<UserMarker>,
        connections: impl IntoIterator<Item = &'a Arc<ShardConnection>>,
    ) -> Option<Self> {
        let copies: Vec<UserCopy> = connections
            .into_iter()
            .filter(|connection| connection.cache().user(id).is_some())
            .map(|connection| UserCopy {
                shard: connection.index(),
                connection: Arc::downgrade(connection),
            })
            .collect();

        if copies.is_empty() {
            return None;
        }
        Some(Self { id, copies })
    }

    /// Number of copies this view was built over
    pub fn copies(&self) -> usize {
        self.copies.len()
    }

    /// Shards that held a copy when the view was built
    pub fn shards(&self) -> Vec<u32> {
        self.copies.iter().map(|copy| copy.shard).collect()
    }

    /// Copies still cached right now
    fn live(&self) -> Vec<(u32, Arc<CachedUser>)> {
        self.copies
            .iter()
            .filter_map(|copy| {
                let user = copy.connection.upgrade()?.cache().user(self.id)?;
                Some((copy.shard, user))
            })
            .collect()
    }

    /// Pick one live copy uniformly at random
    fn pick(&self) -> Option<(u32, Arc<CachedUser>)> {
        let mut live = self.live();
        if live.is_empty() {
            return None;
        }
        let chosen = rand::random_range(0..live.len());
        Some(live.swap_remove(chosen))
    }

    /// One randomly chosen copy, for reading several fields consistently
    pub fn snapshot(&self) -> Option<Arc<CachedUser>> {
        self.pick().map(|(_, user)| user)
    }

    /// Shard whose copy answered this call
    pub fn served_by(&self) -> Option<u32> {
        self.pick().map(|(shard, _)| shard)
    }

    /// The lookup key; identical across copies
    pub fn id(&self) -> Id<UserMarker> {
        self.id
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.id)
    }

    pub fn name(&self) -> Option<String> {
        self.snapshot().map(|user| user.name.clone())
    }

    pub fn global_name(&self) -> Option<String> {
        self.snapshot().and_then(|user| user.global_name.clone())
    }

    /// Global display name, falling back to the username
    pub fn display_name(&self) -> Option<String> {
        self.snapshot()
            .map(|user| user.global_name.clone().unwrap_or_else(|| user.name.clone()))
    }

    pub fn discriminator(&self) -> Option<u16> {
        self.snapshot().map(|user| user.discriminator)
    }

    /// `name#1234`, or just `name` on the unique-username system
    pub fn tag(&self) -> Option<String> {
        self.snapshot().map(|user| match user.discriminator {
            0 => user.name.clone(),
            discriminator => format!("{}#{discriminator:04}", user.name),
        })
    }

    pub fn is_bot(&self) -> Option<bool> {
        self.snapshot().map(|user| user.bot)
    }

    /// Custom avatar URL, if the copy has one
    pub fn avatar_url(&self) -> Option<String> {
        self.snapshot().and_then(|user| custom_avatar_url(&user))
    }

    /// Custom avatar, or the default avatar Discord would show
    pub fn effective_avatar_url(&self) -> Option<String> {
        self.snapshot()
            .map(|user| custom_avatar_url(&user).unwrap_or_else(|| default_avatar_url(&user)))
    }
}

fn custom_avatar_url(user: &CachedUser) -> Option<String> {
    user.avatar.map(|hash| {
        let ext = if hash.is_animated() { "gif" } else { "png" };
        format!("{CDN}/avatars/{}/{hash}.{ext}", user.id)
    })
}

fn default_avatar_url(user: &CachedUser) -> String {
    let index = match user.discriminator {
        0 => (user.id.get() >> 22) % 6,
        discriminator => u64::from(discriminator % 5),
    };
    format!("{CDN}/embed/avatars/{index}.png")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    const USER: u64 = 80_351_110_224_678_912;

    fn user(name: &str, discriminator: u16) -> CachedUser {
        CachedUser {
            id: Id::new(USER),
            name: name.to_string(),
            global_name: None,
            discriminator,
            avatar: None,
            bot: false,
        }
    }

    /// One connection per name, each caching its own copy of the user
    fn shards(names: &[&str]) -> Vec<Arc<ShardConnection>> {
        names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let connection = Arc::new(ShardConnection::new(index as u32, names.len() as u32));
                connection.cache().insert_member(Id::new(1 << 22), user(name, index as u16 + 1));
                connection
            })
            .collect()
    }

    #[test]
    fn test_no_copies_no_view() {
        let empty = vec![Arc::new(ShardConnection::new(0, 1))];
        assert!(MergedUser::from_connections(Id::new(USER), &empty).is_none());
    }

    #[test]
    fn test_accessors_reselect_per_call() {
        // Diverged copies: the view must not settle on one of them
        let connections = shards(&["alpha", "bravo", "charlie"]);
        let view = MergedUser::from_connections(Id::new(USER), &connections).unwrap();

        let names: HashSet<String> = (0..100).filter_map(|_| view.name()).collect();
        assert!(names.len() > 1, "100 calls all served by one copy: {names:?}");

        let shards: HashSet<u32> = (0..100).filter_map(|_| view.served_by()).collect();
        assert!(shards.len() > 1);
    }

    #[test]
    fn test_single_copy_is_stable() {
        let connections = shards(&["solo"]);
        let view = MergedUser::from_connections(Id::new(USER), &connections).unwrap();
        for _ in 0..10 {
            assert_eq!(view.name().as_deref(), Some("solo"));
            assert_eq!(view.served_by(), Some(0));
        }
    }

    #[test]
    fn test_recached_user_is_still_read() {
        let connections = shards(&["before"]);
        let view = MergedUser::from_connections(Id::new(USER), &connections).unwrap();

        // Every MESSAGE_CREATE replaces the cached entry
        connections[0].cache().insert_member(Id::new(1 << 22), user("after", 1));

        assert_eq!(view.name().as_deref(), Some("after"));
        assert_eq!(view.served_by(), Some(0));
    }

    #[test]
    fn test_evicted_copies_are_skipped() {
        let connections = shards(&["evicted", "live"]);
        let view = MergedUser::from_connections(Id::new(USER), &connections).unwrap();

        connections[0].cache().remove_member(Id::new(1 << 22), Id::new(USER));
        for _ in 0..20 {
            assert_eq!(view.name().as_deref(), Some("live"));
        }

        connections[1].cache().remove_member(Id::new(1 << 22), Id::new(USER));
        assert!(view.name().is_none());
        assert!(view.served_by().is_none());
        assert_eq!(view.copies(), 2);
    }

    #[test]
    fn test_dropped_connection_is_skipped() {
        let mut connections = shards(&["gone", "kept"]);
        let view = MergedUser::from_connections(Id::new(USER), &connections).unwrap();

        connections.remove(0);
        assert_eq!(view.name().as_deref(), Some("kept"));
    }

    #[test]
    fn test_live_copies_are_served_evenly() {
        // An evicted copy ahead of a live one must not double its share
        let connections = shards(&["a", "b", "c"]);
        let view = MergedUser::from_connections(Id::new(USER), &connections).unwrap();
        connections[0].cache().remove_member(Id::new(1 << 22), Id::new(USER));

        let mut served: HashMap<u32, usize> = HashMap::new();
        for _ in 0..3_000 {
            *served.entry(view.served_by().unwrap()).or_default() += 1;
        }

        assert!(!served.contains_key(&0));
        for shard in [1, 2] {
            let share = served[&shard];
            assert!((1_200..=1_800).contains(&share), "shard {shard} served {share} of 3000");
        }
    }

    #[test]
    fn test_tag_and_default_avatar() {
        let connection = Arc::new(ShardConnection::new(0, 1));
        connection.cache().insert_user(user("legacy", 42));
        let view = MergedUser::from_connections(Id::new(USER), [&connection]).unwrap();

        assert_eq!(view.tag().as_deref(), Some("legacy#0042"));
        assert_eq!(
            view.effective_avatar_url().as_deref(),
            Some("https://cdn.discordapp.com/embed/avatars/2.png")
        );
        assert!(view.avatar_url().is_none());
        assert_eq!(view.mention(), "<@80351110224678912>");
    }
}
