//! Publication progress tracking per notification stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type for tracker store operations.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Concurrent watermark advance detected for stream {stream_id}")]
    ConcurrencyConflict { stream_id: String },
}

/// Durable bookmark of publication progress for one logical stream.
///
/// The watermark (`most_recent_published_id`) only ever holds the id of an
/// event whose publication was acknowledged, and is monotonically
/// non-decreasing. Concurrent advances are serialized by the optimistic
/// `concurrency_version` counter: a persisted row always carries a version
/// of at least 1, so a fresh, not-yet-persisted tracker is recognizable by
/// version 0.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishedNotificationTracker {
    pub stream_id: String,
    pub most_recent_published_id: Option<i64>,
    pub concurrency_version: i32,
}

impl PublishedNotificationTracker {
    /// Fresh in-memory tracker for a stream with no persisted row yet.
    pub fn new(stream_id: impl Into<String>) -> Self {
        Self {
            stream_id: stream_id.into(),
            most_recent_published_id: None,
            concurrency_version: 0,
        }
    }

    /// True if this tracker has never been persisted.
    pub fn is_transient(&self) -> bool {
        self.concurrency_version == 0
    }
}

/// Store for publication trackers, one row per stream.
#[async_trait]
pub trait PublishedNotificationTrackerStore: Send + Sync {
    /// Existing tracker for the stream, or a fresh transient one if no row
    /// exists yet (nothing is persisted until the first advance).
    async fn tracker(
        &self,
        stream_id: &str,
    ) -> Result<PublishedNotificationTracker, TrackerError>;

    /// Advances the stream's watermark to `last_published_id`.
    ///
    /// No-op when `last_published_id` is `None` (nothing was published this
    /// cycle). The write is guarded by the tracker's concurrency version: a
    /// concurrent advance from the same base fails with
    /// [`TrackerError::ConcurrencyConflict`], signaling the caller to retry
    /// the publish cycle from a fresh read.
    async fn advance(
        &self,
        tracker: &PublishedNotificationTracker,
        last_published_id: Option<i64>,
    ) -> Result<(), TrackerError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tracker_is_transient_with_unset_watermark() {
        let tracker = PublishedNotificationTracker::new("faro.notifications");
        assert!(tracker.is_transient());
        assert_eq!(tracker.most_recent_published_id, None);
    }

    #[test]
    fn persisted_tracker_is_not_transient() {
        let tracker = PublishedNotificationTracker {
            stream_id: "faro.notifications".to_string(),
            most_recent_published_id: Some(12),
            concurrency_version: 3,
        };
        assert!(!tracker.is_transient());
    }
}
