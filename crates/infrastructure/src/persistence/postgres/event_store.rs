//! PostgreSQL Event Store
//!
//! SQLx-based implementation of the durable event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use faro_domain::event::{DomainEvent, StoredEvent, serialize_event};
use faro_domain::store::{EventStore, EventStoreError, EventStoreTx};
use sqlx::FromRow;
use sqlx::postgres::{PgPool, PgTransaction};
use tracing::debug;

/// Row struct for stored_events queries
#[derive(FromRow)]
struct StoredEventRow {
    event_id: i64,
    type_name: String,
    occurred_on: DateTime<Utc>,
    event_body: String,
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            type_name: row.type_name,
            occurred_on: row.occurred_on,
            event_body: row.event_body,
        }
    }
}

/// PostgreSQL implementation of the event log.
///
/// `event_id` is a `BIGSERIAL`, so append order and id order coincide.
/// Rolled-back appends may leave gaps in the sequence; readers only rely on
/// the ordering, never on contiguity.
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the stored_events table if it does not exist.
    pub async fn run_migrations(&self) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stored_events (
                event_id BIGSERIAL PRIMARY KEY,
                type_name VARCHAR(255) NOT NULL,
                occurred_on TIMESTAMPTZ NOT NULL,
                event_body TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    async fn all_since(&self, id: Option<i64>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows: Vec<StoredEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, type_name, occurred_on, event_body
            FROM stored_events
            WHERE event_id > $1
            ORDER BY event_id ASC
            "#,
        )
        .bind(id.unwrap_or(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn all_between(&self, low: i64, high: i64) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows: Vec<StoredEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, type_name, occurred_on, event_body
            FROM stored_events
            WHERE event_id BETWEEN $1 AND $2
            ORDER BY event_id ASC
            "#,
        )
        .bind(low)
        .bind(high)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM stored_events")
            .fetch_one(&self.pool)
            .await?;

        Ok(count as u64)
    }
}

#[async_trait]
impl EventStoreTx for PostgresEventStore {
    async fn append_with_tx(
        &self,
        tx: &mut PgTransaction<'_>,
        event: &dyn DomainEvent,
    ) -> Result<StoredEvent, EventStoreError> {
        let body = serialize_event(event)?;
        let occurred_on = event.occurred_on();

        let (event_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO stored_events (type_name, occurred_on, event_body)
            VALUES ($1, $2, $3)
            RETURNING event_id
            "#,
        )
        .bind(event.type_name())
        .bind(occurred_on)
        .bind(&body)
        .fetch_one(&mut **tx)
        .await?;

        debug!(event_id, type_name = event.type_name(), "Appended stored event");

        Ok(StoredEvent::new(event_id, event.type_name(), occurred_on, body))
    }
}
