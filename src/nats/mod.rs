//! NATS integration
//!
//! Carries relayed gateway events and operator log records off-process.

mod publisher;

pub use publisher::{subjects, NatsPublisher, RelayMessage};
