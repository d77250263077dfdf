// Faro - Infrastructure Layer
//
// Adapters behind the domain seams:
// - persistence: PostgreSQL event store and publication tracker store
// - messaging: NATS JetStream message bus, listener worker and relay

pub mod messaging;
pub mod persistence;

pub use messaging::{NatsConfig, NatsListenerWorker, NatsMessageBus, NotificationRelay, RelayConfig};
pub use persistence::postgres::{PostgresEventStore, PostgresTrackerStore};
