//! Tracing setup and the operator log relay
//!
//! Logs go to stdout as JSON. Once the fleet is LOADED, WARN and ERROR
//! records are also copied onto a relay queue that the NATS publisher
//! drains into `fleet.logs.{level}`.

use crate::error::FleetError;
use crate::nats::{subjects, RelayMessage};

use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt as _};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter, Layer};

/// Targets never relayed: relaying them would feed the relay
const SKIPPED_TARGETS: [&str; 2] = ["shard_fleet::nats", "async_nats"];

/// Switchable copy of WARN/ERROR records onto a relay queue
#[derive(Clone)]
pub struct LogRelay {
    enabled: Arc<AtomicBool>,
    queue: mpsc::Sender<RelayMessage>,
}

impl LogRelay {
    /// A disabled relay and the receiving end of its queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RelayMessage>) {
        let (queue, rx) = mpsc::channel(capacity);
        let relay = Self {
            enabled: Arc::new(AtomicBool::new(false)),
            queue,
        };
        (relay, rx)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Subscriber layer feeding this relay
    pub fn layer(&self) -> LogRelayLayer {
        LogRelayLayer { relay: self.clone() }
    }
}

impl fmt::Debug for LogRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRelay").field("enabled", &self.is_enabled()).finish()
    }
}

pub struct LogRelayLayer {
    relay: LogRelay,
}

impl<S: Subscriber> Layer<S> for LogRelayLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::WARN || !self.relay.is_enabled() {
            return;
        }
        if SKIPPED_TARGETS.iter().any(|target| metadata.target().starts_with(target)) {
            return;
        }

        let mut fields = JsonFields::default();
        event.record(&mut fields);

        let level = metadata.level().as_str().to_ascii_lowercase();
        let record = serde_json::json!({
            "level": metadata.level().as_str(),
            "target": metadata.target(),
            "timestamp": unix_millis(),
            "fields": Value::Object(fields.0),
        });

        let Ok(payload) = serde_json::to_vec(&record) else {
            return;
        };
        // Full queue: drop the record rather than stall the caller
        let _ = self.relay.queue.try_send(RelayMessage {
            subject: format!("{}.{level}", subjects::LOGS),
            payload,
        });
    }
}

fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs() * 1000 + u64::from(elapsed.subsec_millis()))
}

#[derive(Default)]
struct JsonFields(Map<String, Value>);

impl Visit for JsonFields {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.0.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.0.insert(field.name().to_string(), Value::from(format!("{value:?}")));
    }
}

/// Install the global subscriber
///
/// `log_level` applies to this crate; dependencies keep quieter defaults
/// unless `RUST_LOG` says otherwise.
pub fn init(log_level: &str, relay: Option<&LogRelay>) -> Result<(), FleetError> {
    let filter = EnvFilter::from_default_env()
        .add_directive(directive(&format!("shard_fleet={log_level}"))?)
        .add_directive(directive("twilight_gateway=info")?)
        .add_directive(directive("twilight_http=info")?)
        .add_directive(directive("async_nats=warn")?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer::layer().json())
        .with(relay.map(LogRelay::layer))
        .try_init()
        .map_err(|e| FleetError::Config(format!("failed to install tracing subscriber: {e}")))
}

fn directive(raw: &str) -> Result<Directive, FleetError> {
    raw.parse()
        .map_err(|e| FleetError::Config(format!("invalid log directive '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::subscriber::with_default;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing::{error, info, warn};
    use tracing_subscriber::Registry;

    fn relayed(relay: &LogRelay, emit: impl FnOnce()) {
        let subscriber = Registry::default().with(relay.layer());
        with_default(subscriber, emit);
    }

    #[test]
    fn test_disabled_relay_forwards_nothing() {
        let (relay, mut rx) = LogRelay::new(8);
        relayed(&relay, || warn!("not yet"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_enabled_relay_forwards_warn_and_error_only() {
        let (relay, mut rx) = LogRelay::new(8);
        relay.enable();
        relayed(&relay, || {
            info!("routine");
            warn!(shard = 2, "slow heartbeat");
            error!("gateway closed");
        });

        let first = rx.try_recv().unwrap();
        assert_eq!(first.subject, "fleet.logs.warn");
        let body: Value = serde_json::from_slice(&first.payload).unwrap();
        assert_eq!(body["fields"]["shard"], 2);
        assert_eq!(body["fields"]["message"], "slow heartbeat");

        assert_eq!(rx.try_recv().unwrap().subject, "fleet.logs.error");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_disable_stops_forwarding() {
        let (relay, mut rx) = LogRelay::new(8);
        relay.enable();
        relay.disable();
        relayed(&relay, || error!("startup failed"));
        assert!(!relay.is_enabled());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_drops_records() {
        let (relay, mut rx) = LogRelay::new(1);
        relay.enable();
        relayed(&relay, || {
            warn!("one");
            warn!("two");
        });
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
