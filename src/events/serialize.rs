//! Event serialization for the NATS relay
//!
//! Converts the gateway events other services care about into a flat JSON
//! envelope tagged with the shard that received them.

use serde::Serialize;
use twilight_model::gateway::event::Event;
use twilight_model::gateway::payload::incoming::GuildCreate;
use uuid::Uuid;

/// Relayed gateway event payload
#[derive(Debug, Clone, Serialize)]
pub struct FleetEvent {
    pub event_id: String,
    pub event_type: &'static str,
    pub shard: u32,
    pub timestamp: u64,
    pub guild_id: Option<String>,
    pub channel_id: Option<String>,
    pub user_id: Option<String>,
    pub data: serde_json::Value,
}

impl FleetEvent {
    fn new(event_type: &'static str, shard: u32) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            shard,
            timestamp: unix_millis(),
            guild_id: None,
            channel_id: None,
            user_id: None,
            data: serde_json::Value::Null,
        }
    }

    /// NATS subject this event is published on
    pub fn subject(&self) -> String {
        format!("fleet.events.{}", self.event_type)
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// Serialize a gateway event into a relay payload
///
/// Returns None for events that stay inside the fleet (heartbeats, READY,
/// messages and everything else not listed here).
pub fn serialize_event(event: &Event, shard: u32) -> Option<FleetEvent> {
    match event {
        Event::GuildCreate(create) => {
            let mut out = FleetEvent::new("guild.join", shard);
            out.guild_id = Some(create.id().to_string());
            out.data = match &**create {
                GuildCreate::Available(guild) => serde_json::json!({
                    "name": guild.name,
                    "member_count": guild.member_count,
                    "owner_id": guild.owner_id.to_string(),
                }),
                GuildCreate::Unavailable(_) => serde_json::json!({ "unavailable": true }),
            };
            Some(out)
        }

        Event::GuildDelete(guild) => {
            let mut out = FleetEvent::new("guild.leave", shard);
            out.guild_id = Some(guild.id.to_string());
            out.data = serde_json::json!({ "unavailable": guild.unavailable });
            Some(out)
        }

        Event::MemberAdd(member) => {
            let mut out = FleetEvent::new("member.join", shard);
            out.guild_id = Some(member.guild_id.to_string());
            out.user_id = Some(member.user.id.to_string());
            out.data = serde_json::json!({
                "username": member.user.name,
                "bot": member.user.bot,
            });
            Some(out)
        }

        Event::MemberRemove(member) => {
            let mut out = FleetEvent::new("member.leave", shard);
            out.guild_id = Some(member.guild_id.to_string());
            out.user_id = Some(member.user.id.to_string());
            Some(out)
        }

        // Voice routing consumers need to know which shard saw the update
        Event::VoiceStateUpdate(state) => {
            let mut out = FleetEvent::new("voice.state", shard);
            out.guild_id = state.guild_id.map(|id| id.to_string());
            out.channel_id = state.channel_id.map(|id| id.to_string());
            out.user_id = Some(state.user_id.to_string());
            out.data = serde_json::json!({ "session_id": state.session_id });
            Some(out)
        }

        _ => None,
    }
}
