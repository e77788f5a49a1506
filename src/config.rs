//! Fleet configuration module
//!
//! Layers defaults, an optional JSON file and the process environment.
//! The effective configuration is written back once the fleet is LOADED,
//! to a sibling file (`fleet.effective.json`) so the input file, which may
//! hold the token, is never overwritten.

use crate::error::FleetError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;
use twilight_gateway::Intents;

/// Default config file looked up when `FLEET_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "fleet.json";

/// Fleet configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FleetConfig {
    /// Discord bot token (never written back to disk)
    #[serde(default, skip_serializing)]
    pub discord_token: String,

    /// Operator override for the shard count; skips the recommendation request
    #[serde(default)]
    pub total_shards: Option<u32>,

    /// Pause between successive shard session starts
    #[serde(default = "default_shard_cooldown_ms")]
    pub shard_cooldown_ms: u64,

    /// Upper bound on the recommended shard count request
    #[serde(default = "default_recommend_timeout_ms")]
    pub recommend_timeout_ms: u64,

    /// Upper bound on a single shard reaching READY
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// NATS server URL(s) - comma-separated for multiple servers
    #[serde(default)]
    pub nats_url: Option<String>,

    /// Health/metrics HTTP port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Command prefix shown in the shard presence text
    #[serde(default = "default_status_prefix")]
    pub status_prefix: String,

    /// Where `save()` writes the effective configuration
    #[serde(default)]
    pub persist_path: Option<PathBuf>,
}

fn default_shard_cooldown_ms() -> u64 {
    5_000
}

fn default_recommend_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    60_000
}

fn default_http_port() -> u16 {
    9090
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_status_prefix() -> String {
    "!".to_string()
}

impl FleetConfig {
    /// Configuration with every default and the given token
    pub fn new(discord_token: impl Into<String>) -> Self {
        Self {
            discord_token: discord_token.into(),
            total_shards: None,
            shard_cooldown_ms: default_shard_cooldown_ms(),
            recommend_timeout_ms: default_recommend_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            nats_url: None,
            http_port: default_http_port(),
            log_level: default_log_level(),
            status_prefix: default_status_prefix(),
            persist_path: None,
        }
    }

    /// Load configuration: `.env`, then the JSON file, then the environment
    pub fn load() -> Result<Self, FleetError> {
        dotenvy::dotenv().ok();

        let path = env::var("FLEET_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        let builder = config::Config::builder()
            .add_source(config::File::from(Path::new(&path)).required(false))
            .add_source(config::Environment::default());

        Ok(Self::from_builder(builder)?.persisting_beside(Path::new(&path)))
    }

    /// Sibling of an input file that receives the effective configuration
    pub fn effective_path(input: &Path) -> PathBuf {
        input.with_extension("effective.json")
    }

    /// Point `persist_path` away from the file this config was read from
    ///
    /// The token is never serialized, so saving over the input would erase it.
    pub fn persisting_beside(mut self, input: &Path) -> Self {
        match self.persist_path.as_deref() {
            Some(path) if path != input => {}
            _ => self.persist_path = Some(Self::effective_path(input)),
        }
        self
    }

    /// Load configuration from a single JSON file, without the environment
    pub fn from_file(path: &Path) -> Result<Self, FleetError> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json));
        Self::from_builder(builder)
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, FleetError> {
        let mut loaded: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize::<Self>())
            .map_err(|e| FleetError::Config(e.to_string()))?;

        if loaded.discord_token.is_empty() {
            loaded.discord_token = env::var("DISCORD_BOT_TOKEN").map_err(|_| {
                FleetError::Config("DISCORD_TOKEN or DISCORD_BOT_TOKEN must be set".to_string())
            })?;
        }

        Ok(loaded)
    }

    /// Cooldown between shard session starts
    pub fn shard_cooldown(&self) -> Duration {
        Duration::from_millis(self.shard_cooldown_ms)
    }

    /// Timeout applied to the recommended shard count request
    pub fn recommend_timeout(&self) -> Duration {
        Duration::from_millis(self.recommend_timeout_ms)
    }

    /// Timeout for one shard to reach READY
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Write the effective configuration back to `persist_path`
    ///
    /// A config without a persist path has nowhere to go; that is not an error.
    pub async fn save(&self) -> Result<(), FleetError> {
        let Some(path) = self.persist_path.as_ref() else {
            return Ok(());
        };

        let mut body = serde_json::to_string_pretty(self).map_err(|source| {
            FleetError::SerializationFailed {
                event_type: "config".to_string(),
                shard: 0,
                source,
            }
        })?;
        body.push('\n');

        tokio::fs::write(path, body)
            .await
            .map_err(|source| FleetError::ConfigPersist { path: path.clone(), source })
    }

    /// Get configured Discord intents
    ///
    /// - GUILDS: guild and channel lifecycle, feeds the guild/channel caches
    /// - GUILD_MEMBERS: member events (privileged), feeds the user cache
    /// - GUILD_MESSAGES / DIRECT_MESSAGES: message authors, including DM users
    /// - GUILD_VOICE_STATES: relayed for voice routing
    pub fn intents() -> Intents {
        Intents::GUILDS
            | Intents::GUILD_MEMBERS
            | Intents::GUILD_MESSAGES
            | Intents::GUILD_VOICE_STATES
            | Intents::DIRECT_MESSAGES
    }
}
