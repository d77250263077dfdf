//! PostgreSQL Publication Tracker Store
//!
//! One row per notification stream, guarded by an optimistic concurrency
//! counter. Rows are created lazily on the first advance; a fresh tracker
//! read for a stream with no row is transient (version 0) and persisted
//! rows always carry version >= 1.

use async_trait::async_trait;
use faro_domain::tracker::{
    PublishedNotificationTracker, PublishedNotificationTrackerStore, TrackerError,
};
use sqlx::FromRow;
use sqlx::postgres::PgPool;
use tracing::debug;

#[derive(FromRow)]
struct TrackerRow {
    stream_id: String,
    most_recent_published_id: Option<i64>,
    concurrency_version: i32,
}

impl From<TrackerRow> for PublishedNotificationTracker {
    fn from(row: TrackerRow) -> Self {
        PublishedNotificationTracker {
            stream_id: row.stream_id,
            most_recent_published_id: row.most_recent_published_id,
            concurrency_version: row.concurrency_version,
        }
    }
}

/// PostgreSQL implementation of the tracker store.
pub struct PostgresTrackerStore {
    pool: PgPool,
}

impl PostgresTrackerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the tracker table if it does not exist.
    pub async fn run_migrations(&self) -> Result<(), TrackerError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS published_notification_trackers (
                stream_id VARCHAR(255) PRIMARY KEY,
                most_recent_published_id BIGINT,
                concurrency_version INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl PublishedNotificationTrackerStore for PostgresTrackerStore {
    async fn tracker(
        &self,
        stream_id: &str,
    ) -> Result<PublishedNotificationTracker, TrackerError> {
        let row: Option<TrackerRow> = sqlx::query_as(
            r#"
            SELECT stream_id, most_recent_published_id, concurrency_version
            FROM published_notification_trackers
            WHERE stream_id = $1
            "#,
        )
        .bind(stream_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row
            .map(Into::into)
            .unwrap_or_else(|| PublishedNotificationTracker::new(stream_id)))
    }

    async fn advance(
        &self,
        tracker: &PublishedNotificationTracker,
        last_published_id: Option<i64>,
    ) -> Result<(), TrackerError> {
        let Some(last_published_id) = last_published_id else {
            return Ok(());
        };

        let rows_affected = if tracker.is_transient() {
            // First advance for this stream: create the row, losing to any
            // concurrent creator.
            sqlx::query(
                r#"
                INSERT INTO published_notification_trackers
                    (stream_id, most_recent_published_id, concurrency_version)
                VALUES ($1, $2, 1)
                ON CONFLICT (stream_id) DO NOTHING
                "#,
            )
            .bind(&tracker.stream_id)
            .bind(last_published_id)
            .execute(&self.pool)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE published_notification_trackers
                SET most_recent_published_id = $3,
                    concurrency_version = concurrency_version + 1
                WHERE stream_id = $1 AND concurrency_version = $2
                "#,
            )
            .bind(&tracker.stream_id)
            .bind(tracker.concurrency_version)
            .bind(last_published_id)
            .execute(&self.pool)
            .await?
            .rows_affected()
        };

        if rows_affected == 0 {
            return Err(TrackerError::ConcurrencyConflict {
                stream_id: tracker.stream_id.clone(),
            });
        }

        debug!(
            stream_id = %tracker.stream_id,
            watermark = last_published_id,
            "Advanced publication tracker"
        );
        Ok(())
    }
}
