//! Durable event log abstraction.

use crate::event::{DomainEvent, SerializationError, StoredEvent};
use async_trait::async_trait;
use sqlx::postgres::PgTransaction;

/// Error type for event log operations.
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

/// Ordered range queries over the durable event log.
///
/// All sequences are ascending by `event_id` and finite (re-queryable
/// snapshots, not live streams).
#[async_trait]
pub trait EventStore: Send + Sync {
    /// All stored events with `event_id` greater than `id`; `None` means
    /// from the beginning.
    async fn all_since(&self, id: Option<i64>) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// All stored events with `low <= event_id <= high`.
    async fn all_between(&self, low: i64, high: i64) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Total number of stored events. Diagnostic and test use.
    async fn count(&self) -> Result<u64, EventStoreError>;
}

/// Transaction-aware append half of the event log.
///
/// Append participates in the caller's transaction so that event
/// persistence is atomic with the business-state change that produced the
/// event; on failure the caller rolls back and no stored event exists.
#[async_trait]
pub trait EventStoreTx: EventStore {
    /// Serializes the event and appends it to the log inside `tx`,
    /// returning the envelope with its assigned `event_id`.
    async fn append_with_tx(
        &self,
        tx: &mut PgTransaction<'_>,
        event: &dyn DomainEvent,
    ) -> Result<StoredEvent, EventStoreError>;
}
