//! Messaging adapters: NATS JetStream bus, listener consumer and the
//! notification relay.

pub mod consumer;
pub mod nats;
pub mod relay;

pub use consumer::NatsListenerWorker;
pub use nats::{NatsConfig, NatsMessageBus};
pub use relay::{NotificationRelay, RelayConfig};
