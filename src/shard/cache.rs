//! Shard-local entity caches
//!
//! Each connection keeps its own view of the guilds, users and channels its
//! session has seen. Only the owning connection's event stream writes here;
//! readers take owned snapshots.
//!
//! Users stay cached while something still references them: a guild
//! membership, a recent direct message, or an explicit `insert_user`.
//! Losing the last membership (MEMBER_REMOVE, leaving the guild) evicts a
//! user, and direct-message authors are capped at [`DM_AUTHOR_CAPACITY`]
//! with the oldest dropped first.

use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use twilight_model::channel::{Channel, ChannelType};
use twilight_model::gateway::event::Event;
use twilight_model::gateway::payload::incoming::GuildCreate;
use twilight_model::id::marker::{ChannelMarker, GuildMarker, UserMarker};
use twilight_model::id::Id;
use twilight_model::user::User;
use twilight_model::util::ImageHash;

/// Cached guild
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedGuild {
    pub id: Id<GuildMarker>,
    pub name: String,
    pub owner_id: Option<Id<UserMarker>>,
    pub member_count: Option<u64>,
    /// Announced in READY but not yet delivered, or in an outage
    pub unavailable: bool,
}

impl CachedGuild {
    /// Placeholder for a guild the session knows of but has no data for
    pub fn unavailable(id: Id<GuildMarker>) -> Self {
        Self {
            id,
            name: String::new(),
            owner_id: None,
            member_count: None,
            unavailable: true,
        }
    }
}

/// Cached user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedUser {
    pub id: Id<UserMarker>,
    pub name: String,
    pub global_name: Option<String>,
    /// Zero for accounts on the unique-username system
    pub discriminator: u16,
    pub avatar: Option<ImageHash>,
    pub bot: bool,
}

impl From<&User> for CachedUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            global_name: user.global_name.clone(),
            discriminator: user.discriminator,
            avatar: user.avatar,
            bot: user.bot,
        }
    }
}

/// Channel categories the fleet aggregates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Text,
    Voice,
}

impl ChannelKind {
    /// Classify a gateway channel type; other types are not cached
    pub fn classify(kind: ChannelType) -> Option<Self> {
        match kind {
            ChannelType::GuildText | ChannelType::GuildAnnouncement => Some(Self::Text),
            ChannelType::GuildVoice | ChannelType::GuildStageVoice => Some(Self::Voice),
            _ => None,
        }
    }
}

/// Cached guild channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedChannel {
    pub id: Id<ChannelMarker>,
    pub guild_id: Option<Id<GuildMarker>>,
    pub name: Option<String>,
    pub kind: ChannelKind,
}

/// The entity categories a connection caches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Guilds,
    Users,
    TextChannels,
    VoiceChannels,
}

/// Direct-message authors kept without a guild membership
pub const DM_AUTHOR_CAPACITY: usize = 10_000;

/// Direct-message authors, oldest first
#[derive(Debug, Default)]
struct DmAuthors {
    order: VecDeque<Id<UserMarker>>,
    present: HashSet<Id<UserMarker>>,
}

impl DmAuthors {
    /// Record `id` as the newest author; returns the authors pushed out
    fn touch(&mut self, id: Id<UserMarker>, capacity: usize) -> Vec<Id<UserMarker>> {
        if !self.present.insert(id) {
            self.order.retain(|author| *author != id);
        }
        self.order.push_back(id);

        let mut evicted = Vec::new();
        while self.order.len() > capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.present.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }
}

/// Per-connection caches
///
/// Entries are stored behind `Arc` and replaced wholesale on update, so a
/// snapshot never observes a half-applied change.
#[derive(Debug)]
pub struct ShardCache {
    guilds: DashMap<Id<GuildMarker>, Arc<CachedGuild>>,
    users: DashMap<Id<UserMarker>, Arc<CachedUser>>,
    channels: DashMap<Id<ChannelMarker>, Arc<CachedChannel>>,
    /// Guilds each cached member belongs to on this shard
    memberships: DashMap<Id<UserMarker>, HashSet<Id<GuildMarker>>>,
    /// Users cached outside any guild; never evicted
    pinned: DashSet<Id<UserMarker>>,
    dm_authors: Mutex<DmAuthors>,
    dm_capacity: usize,
}

impl Default for ShardCache {
    fn default() -> Self {
        Self::with_dm_capacity(DM_AUTHOR_CAPACITY)
    }
}

impl ShardCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dm_capacity(dm_capacity: usize) -> Self {
        Self {
            guilds: DashMap::new(),
            users: DashMap::new(),
            channels: DashMap::new(),
            memberships: DashMap::new(),
            pinned: DashSet::new(),
            dm_authors: Mutex::new(DmAuthors::default()),
            dm_capacity,
        }
    }

    /// Apply one gateway event to the caches
    pub fn update(&self, event: &Event) {
        match event {
            Event::Ready(ready) => {
                for guild in &ready.guilds {
                    self.guilds
                        .entry(guild.id)
                        .or_insert_with(|| Arc::new(CachedGuild::unavailable(guild.id)));
                }
                self.insert_user(CachedUser {
                    id: ready.user.id,
                    name: ready.user.name.clone(),
                    global_name: None,
                    discriminator: ready.user.discriminator,
                    avatar: ready.user.avatar,
                    bot: ready.user.bot,
                });
            }
            Event::GuildCreate(create) => match &**create {
                GuildCreate::Available(guild) => {
                    self.insert_guild(CachedGuild {
                        id: guild.id,
                        name: guild.name.clone(),
                        owner_id: Some(guild.owner_id),
                        member_count: guild.member_count,
                        unavailable: false,
                    });
                    for channel in &guild.channels {
                        self.cache_channel(channel, Some(guild.id));
                    }
                    for member in &guild.members {
                        self.insert_member(guild.id, CachedUser::from(&member.user));
                    }
                }
                GuildCreate::Unavailable(guild) => {
                    self.insert_guild(CachedGuild::unavailable(guild.id));
                }
            },
            Event::GuildUpdate(update) => {
                if let Some(current) = self.guild(update.id) {
                    let mut next = (*current).clone();
                    next.name = update.name.clone();
                    next.owner_id = Some(update.owner_id);
                    self.insert_guild(next);
                }
            }
            Event::GuildDelete(delete) => {
                if delete.unavailable == Some(true) {
                    self.mark_unavailable(delete.id);
                } else {
                    self.remove_guild(delete.id);
                }
            }
            Event::ChannelCreate(create) => self.cache_channel(create, None),
            Event::ChannelUpdate(update) => self.cache_channel(update, None),
            Event::ChannelDelete(delete) => {
                self.channels.remove(&delete.id);
            }
            Event::MemberAdd(member) => {
                self.insert_member(member.guild_id, CachedUser::from(&member.user));
            }
            Event::MemberRemove(remove) => self.remove_member(remove.guild_id, remove.user.id),
            Event::MessageCreate(message) => {
                // Webhook authors are not users
                if message.webhook_id.is_some() {
                    return;
                }
                let author = CachedUser::from(&message.author);
                match message.guild_id {
                    Some(guild_id) => self.insert_member(guild_id, author),
                    None => self.record_dm_author(author),
                }
            }
            _ => {}
        }
    }

    fn cache_channel(&self, channel: &Channel, guild_id: Option<Id<GuildMarker>>) {
        let Some(kind) = ChannelKind::classify(channel.kind) else {
            return;
        };
        self.insert_channel(CachedChannel {
            id: channel.id,
            guild_id: channel.guild_id.or(guild_id),
            name: channel.name.clone(),
            kind,
        });
    }

    pub fn insert_guild(&self, guild: CachedGuild) {
        self.guilds.insert(guild.id, Arc::new(guild));
    }

    /// Cache a user outside any guild; it stays until replaced
    pub fn insert_user(&self, user: CachedUser) {
        self.pinned.insert(user.id);
        self.users.insert(user.id, Arc::new(user));
    }

    /// Cache a user as a member of `guild_id`
    pub fn insert_member(&self, guild_id: Id<GuildMarker>, user: CachedUser) {
        self.memberships.entry(user.id).or_default().insert(guild_id);
        self.users.insert(user.id, Arc::new(user));
    }

    /// Drop one membership, evicting the user if nothing else holds it
    pub fn remove_member(&self, guild_id: Id<GuildMarker>, user_id: Id<UserMarker>) {
        let emptied = match self.memberships.get_mut(&user_id) {
            Some(mut guilds) => {
                guilds.remove(&guild_id);
                guilds.is_empty()
            }
            None => false,
        };
        if emptied {
            self.memberships.remove_if(&user_id, |_, guilds| guilds.is_empty());
            self.evict_if_orphaned(user_id);
        }
    }

    /// Cache the author of a direct message
    pub fn record_dm_author(&self, user: CachedUser) {
        let id = user.id;
        self.users.insert(id, Arc::new(user));

        let evicted = self.dm_authors.lock().touch(id, self.dm_capacity);
        for id in evicted {
            self.evict_if_orphaned(id);
        }
    }

    fn evict_if_orphaned(&self, id: Id<UserMarker>) {
        if self.memberships.contains_key(&id)
            || self.pinned.contains(&id)
            || self.dm_authors.lock().present.contains(&id)
        {
            return;
        }
        self.users.remove(&id);
    }

    pub fn insert_channel(&self, channel: CachedChannel) {
        self.channels.insert(channel.id, Arc::new(channel));
    }

    /// Keep the guild entry but flag it as in an outage
    pub fn mark_unavailable(&self, id: Id<GuildMarker>) {
        let next = match self.guild(id) {
            Some(current) => CachedGuild { unavailable: true, ..(*current).clone() },
            None => CachedGuild::unavailable(id),
        };
        self.insert_guild(next);
    }

    /// Drop a guild with its channels and the members only it held
    pub fn remove_guild(&self, id: Id<GuildMarker>) {
        self.guilds.remove(&id);
        self.channels.retain(|_, channel| channel.guild_id != Some(id));

        let mut orphaned = Vec::new();
        self.memberships.retain(|user, guilds| {
            guilds.remove(&id);
            if guilds.is_empty() {
                orphaned.push(*user);
                return false;
            }
            true
        });
        for user in orphaned {
            self.evict_if_orphaned(user);
        }
    }

    pub fn guild(&self, id: Id<GuildMarker>) -> Option<Arc<CachedGuild>> {
        self.guilds.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn user(&self, id: Id<UserMarker>) -> Option<Arc<CachedUser>> {
        self.users.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn channel(&self, id: Id<ChannelMarker>) -> Option<Arc<CachedChannel>> {
        self.channels.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of the guild cache
    pub fn guilds(&self) -> Vec<Arc<CachedGuild>> {
        self.guilds.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    /// Snapshot of the user cache
    pub fn users(&self) -> Vec<Arc<CachedUser>> {
        self.users.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn text_channels(&self) -> Vec<Arc<CachedChannel>> {
        self.channels_of(ChannelKind::Text)
    }

    pub fn voice_channels(&self) -> Vec<Arc<CachedChannel>> {
        self.channels_of(ChannelKind::Voice)
    }

    fn channels_of(&self, kind: ChannelKind) -> Vec<Arc<CachedChannel>> {
        self.channels
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Entry count for one category
    pub fn len(&self, kind: CacheKind) -> usize {
        match kind {
            CacheKind::Guilds => self.guilds.len(),
            CacheKind::Users => self.users.len(),
            CacheKind::TextChannels => self.channels_of_len(ChannelKind::Text),
            CacheKind::VoiceChannels => self.channels_of_len(ChannelKind::Voice),
        }
    }

    fn channels_of_len(&self, kind: ChannelKind) -> usize {
        self.channels.iter().filter(|entry| entry.kind == kind).count()
    }
}
