//! Shard connection handle
//!
//! One `ShardConnection` exists per shard index for the whole life of the
//! fleet. The gateway session behind it is driven elsewhere (see
//! `connector`); this type holds what the rest of the process reads: the
//! connection state, the local caches and the response counter.

use crate::events::EventListener;
use crate::metrics;
use crate::shard::cache::ShardCache;

use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use twilight_model::gateway::event::Event;
use twilight_model::gateway::ShardId;

/// Connection state for a shard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No live session (not started yet, or lost)
    Disconnected = 0,
    /// Session is being established
    Connecting = 1,
    /// Session is ready and delivering events
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Connecting,
            2 => Self::Connected,
            _ => Self::Disconnected,
        }
    }

    /// Returns true if the shard is delivering events
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Static label for logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

/// Handle for one shard of the fleet
pub struct ShardConnection {
    index: u32,
    total: u32,
    state: AtomicU8,
    cache: ShardCache,
    response_count: AtomicU64,
    listeners: RwLock<Vec<Arc<dyn EventListener>>>,
    connected_at: OnceLock<Instant>,
}

impl ShardConnection {
    /// Create a disconnected handle for shard `index` of `total`
    pub fn new(index: u32, total: u32) -> Self {
        Self {
            index,
            total,
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            cache: ShardCache::new(),
            response_count: AtomicU64::new(0),
            listeners: RwLock::new(Vec::new()),
            connected_at: OnceLock::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    /// Total shards in the fleet this connection belongs to
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Twilight shard identifier for this connection
    pub fn shard_id(&self) -> ShardId {
        ShardId::new(self.index, self.total)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
        if state.is_connected() {
            let _ = self.connected_at.set(Instant::now());
        }
        metrics::set_shard_state(self.index, state);
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// When this shard first reached `Connected`
    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at.get().copied()
    }

    /// Local caches; read through the snapshot methods
    pub fn cache(&self) -> &ShardCache {
        &self.cache
    }

    /// Gateway payloads received on this shard so far
    pub fn response_count(&self) -> u64 {
        self.response_count.load(Ordering::Relaxed)
    }

    /// Count one received payload without applying it
    pub fn record_response(&self) {
        self.response_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Apply one inbound event: counters, state, caches, then listeners
    pub fn dispatch(&self, event: &Event) {
        self.record_response();
        metrics::record_event(self.index, event);

        match event {
            Event::Ready(_) | Event::Resumed => self.set_state(ConnectionState::Connected),
            Event::GatewayReconnect | Event::GatewayInvalidateSession(_) => {
                self.set_state(ConnectionState::Connecting)
            }
            _ => {}
        }

        self.cache.update(event);

        // Clone out so listeners never run under the lock
        let listeners = self.listeners.read().clone();
        for listener in &listeners {
            listener.on_event(self, event);
        }
    }

    /// Attach listeners, skipping any already attached
    ///
    /// Returns how many were newly attached.
    pub fn attach_listeners(&self, listeners: &[Arc<dyn EventListener>]) -> usize {
        let mut attached = self.listeners.write();
        let mut added = 0;
        for listener in listeners {
            let present = attached.iter().any(|existing| same_listener(existing, listener));
            if !present {
                attached.push(Arc::clone(listener));
                added += 1;
            }
        }
        added
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

fn same_listener(a: &Arc<dyn EventListener>, b: &Arc<dyn EventListener>) -> bool {
    std::ptr::eq(Arc::as_ptr(a) as *const (), Arc::as_ptr(b) as *const ())
}

impl fmt::Debug for ShardConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShardConnection")
            .field("index", &self.index)
            .field("total", &self.total)
            .field("state", &self.state())
            .field("response_count", &self.response_count())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        seen: AtomicUsize,
    }

    impl EventListener for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn on_event(&self, _shard: &ShardConnection, _event: &Event) {
            self.seen.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn test_new_connection_is_disconnected() {
        let conn = ShardConnection::new(2, 4);
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(conn.shard_id(), ShardId::new(2, 4));
        assert_eq!(conn.response_count(), 0);
        assert!(conn.connected_at().is_none());
    }

    #[test]
    fn test_connected_at_is_recorded_once() {
        let conn = ShardConnection::new(0, 1);
        conn.set_state(ConnectionState::Connected);
        let first = conn.connected_at().unwrap();

        conn.set_state(ConnectionState::Disconnected);
        conn.set_state(ConnectionState::Connected);
        assert_eq!(conn.connected_at(), Some(first));
    }

    #[test]
    fn test_attach_is_idempotent() {
        let conn = ShardConnection::new(0, 1);
        let listener: Arc<dyn EventListener> = Arc::new(Counting::default());
        let other: Arc<dyn EventListener> = Arc::new(Counting::default());

        assert_eq!(conn.attach_listeners(&[Arc::clone(&listener)]), 1);
        assert_eq!(conn.attach_listeners(&[Arc::clone(&listener), Arc::clone(&other)]), 1);
        assert_eq!(conn.listener_count(), 2);
    }

    #[test]
    fn test_dispatch_counts_and_fans_out() {
        let conn = ShardConnection::new(0, 1);
        let counting = Arc::new(Counting::default());
        let listener: Arc<dyn EventListener> = counting.clone();
        conn.attach_listeners(&[listener]);

        conn.dispatch(&Event::GatewayHeartbeatAck);
        conn.dispatch(&Event::Resumed);

        assert_eq!(conn.response_count(), 2);
        assert_eq!(counting.seen.load(Ordering::Relaxed), 2);
        assert!(conn.is_connected());
    }

    #[test]
    fn test_dispatch_applies_gateway_payloads() {
        use twilight_model::gateway::payload::incoming::{GuildDelete, Ready};
        use twilight_model::id::Id;

        let conn = ShardConnection::new(1, 2);
        let ready: Ready = serde_json::from_value(serde_json::json!({
            "application": { "id": "5", "flags": 0 },
            "guilds": [{ "id": "4194305", "unavailable": true }],
            "resume_gateway_url": "wss://gateway.discord.gg",
            "session_id": "session",
            "user": {
                "id": "5",
                "username": "fleet-bot",
                "discriminator": "0",
                "avatar": null,
                "bot": true,
                "mfa_enabled": false,
            },
            "v": 10,
        }))
        .unwrap();

        conn.dispatch(&Event::Ready(ready));
        assert!(conn.is_connected());
        assert!(conn.cache().guild(Id::new(4_194_305)).unwrap().unavailable);
        assert!(conn.cache().user(Id::new(5)).is_some());

        conn.dispatch(&Event::GuildDelete(GuildDelete {
            id: Id::new(4_194_305),
            unavailable: None,
        }));
        conn.dispatch(&Event::GatewayReconnect);

        assert!(conn.cache().guild(Id::new(4_194_305)).is_none());
        assert_eq!(conn.state(), ConnectionState::Connecting);
        assert_eq!(conn.response_count(), 3);
    }
}
