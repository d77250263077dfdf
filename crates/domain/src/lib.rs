// Faro - Domain Layer
//
// Reliable domain-event publication pipeline:
// - event: DomainEvent trait, StoredEvent envelope and wire serialization
// - collector: per-unit-of-work capture buffer
// - store: durable event log traits
// - tracker: publication watermark per notification stream
// - notification: publishable projection and typed body reader
// - message_bus: broker seam (exchanges, channels, headers)
// - listener: inbound dispatch table
// - publisher: the publication cycle

pub mod collector;
pub mod event;
pub mod listener;
pub mod message_bus;
pub mod notification;
pub mod publisher;
pub mod shared_kernel;
pub mod store;
pub mod tracker;

pub mod testing;

pub use collector::{CollectorError, DomainEventCollector};
pub use event::{DomainEvent, SerializationError, StoredEvent, serialize_event};
pub use listener::{ListenerError, ListenerRegistry, MessageListener};
pub use message_bus::{
    Exchange, ExchangeKind, MessageBus, MessageBusError, MessageChannel, MessageHeaders,
};
pub use notification::{Notification, NotificationReadError, NotificationReader};
pub use publisher::{NotificationPublishError, NotificationPublisher};
pub use shared_kernel::{DomainError, Result};
pub use store::{EventStore, EventStoreError, EventStoreTx};
pub use tracker::{PublishedNotificationTracker, PublishedNotificationTrackerStore, TrackerError};
