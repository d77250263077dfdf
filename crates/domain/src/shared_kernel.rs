//! Shared error type and result alias for the domain layer.

use crate::collector::CollectorError;
use crate::event::SerializationError;
use crate::listener::ListenerError;
use crate::message_bus::MessageBusError;
use crate::notification::NotificationReadError;
use crate::publisher::NotificationPublishError;
use crate::store::EventStoreError;
use crate::tracker::TrackerError;

/// Top-level domain error, aggregating the per-module error types.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Event capture error: {0}")]
    Collector(#[from] CollectorError),

    #[error("Event serialization error: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Event store error: {0}")]
    EventStore(#[from] EventStoreError),

    #[error("Tracker error: {0}")]
    Tracker(#[from] TrackerError),

    #[error("Message bus error: {0}")]
    MessageBus(#[from] MessageBusError),

    #[error("Notification error: {0}")]
    Notification(#[from] NotificationReadError),

    #[error("Publication error: {0}")]
    Publication(#[from] NotificationPublishError),

    #[error("Listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("Infrastructure error: {message}")]
    InfrastructureError { message: String },
}

pub type Result<T> = std::result::Result<T, DomainError>;
