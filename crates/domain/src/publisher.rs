//! Notification publication cycle.
//!
//! One cycle: read the stream's watermark, fetch the unpublished backlog
//! from the event log, send it in ascending `event_id` order through a
//! channel scoped to the cycle, and advance the watermark only after every
//! send was acknowledged. A failed cycle leaves the watermark untouched, so
//! the next cycle resends the whole unsent remainder (at-least-once;
//! consumers deduplicate on the message id).

use crate::message_bus::{Exchange, MessageBus, MessageBusError};
use crate::notification::{Notification, NotificationReadError};
use crate::store::{EventStore, EventStoreError};
use crate::tracker::{PublishedNotificationTrackerStore, TrackerError};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Error type for a publication cycle.
///
/// All variants are transient from the scheduler's point of view: a later
/// cycle retries from the last committed watermark.
#[derive(Debug, thiserror::Error)]
pub enum NotificationPublishError {
    #[error(transparent)]
    EventStore(#[from] EventStoreError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    MessageBus(#[from] MessageBusError),

    #[error("Stored event could not be projected: {0}")]
    Projection(#[from] NotificationReadError),
}

/// Drives publication cycles for one notification stream.
pub struct NotificationPublisher {
    event_store: Arc<dyn EventStore>,
    tracker_store: Arc<dyn PublishedNotificationTrackerStore>,
    message_bus: Arc<dyn MessageBus>,
    exchange: Exchange,
    stream_id: String,
}

impl NotificationPublisher {
    pub fn new(
        event_store: Arc<dyn EventStore>,
        tracker_store: Arc<dyn PublishedNotificationTrackerStore>,
        message_bus: Arc<dyn MessageBus>,
        exchange: Exchange,
        stream_id: impl Into<String>,
    ) -> Self {
        Self {
            event_store,
            tracker_store,
            message_bus,
            exchange,
            stream_id: stream_id.into(),
        }
    }

    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Runs one publication cycle; returns the number of notifications sent.
    ///
    /// An empty backlog is a no-op: nothing is sent and the tracker is not
    /// touched. On a mid-cycle send failure the remaining sends are aborted
    /// in place; already-sent notifications are not compensated and will be
    /// redelivered by the next cycle.
    #[instrument(skip(self), fields(stream_id = %self.stream_id))]
    pub async fn publish_notifications(&self) -> Result<usize, NotificationPublishError> {
        let tracker = self.tracker_store.tracker(&self.stream_id).await?;

        let backlog = self
            .event_store
            .all_since(tracker.most_recent_published_id)
            .await?;
        if backlog.is_empty() {
            debug!("No unpublished notifications");
            return Ok(0);
        }

        let notifications = backlog
            .iter()
            .map(Notification::from_stored_event)
            .collect::<Result<Vec<_>, _>>()?;

        let channel = self.message_bus.open(&self.exchange).await?;
        for notification in &notifications {
            channel
                .send(
                    &notification.type_name,
                    &notification.serialized_event,
                    &notification.headers(),
                )
                .await?;
        }

        let last_published = notifications.last().map(|n| n.notification_id);
        self.tracker_store.advance(&tracker, last_published).await?;

        info!(
            sent = notifications.len(),
            watermark = ?last_published,
            "Published notification backlog"
        );
        Ok(notifications.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{InMemoryEventStore, InMemoryMessageBus, InMemoryTrackerStore, SampleEvent};

    const STREAM: &str = "faro.notifications";

    struct Fixture {
        event_store: Arc<InMemoryEventStore>,
        tracker_store: Arc<InMemoryTrackerStore>,
        message_bus: Arc<InMemoryMessageBus>,
        publisher: NotificationPublisher,
    }

    fn fixture() -> Fixture {
        let event_store = Arc::new(InMemoryEventStore::new());
        let tracker_store = Arc::new(InMemoryTrackerStore::new());
        let message_bus = Arc::new(InMemoryMessageBus::new());
        let publisher = NotificationPublisher::new(
            event_store.clone(),
            tracker_store.clone(),
            message_bus.clone(),
            Exchange::direct("faro.events"),
            STREAM,
        );
        Fixture {
            event_store,
            tracker_store,
            message_bus,
            publisher,
        }
    }

    async fn append_events(store: &InMemoryEventStore, n: usize) {
        for i in 0..n {
            store
                .append(&SampleEvent::named(&format!("event-{i}")))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn sends_backlog_in_ascending_order_and_advances_watermark() {
        let fx = fixture();
        append_events(&fx.event_store, 5).await;

        let sent = fx.publisher.publish_notifications().await.unwrap();
        assert_eq!(sent, 5);

        let messages = fx.message_bus.sent().await;
        let ids: Vec<i64> = messages
            .iter()
            .map(|m| m.headers.message_id.parse().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let tracker = fx.tracker_store.tracker(STREAM).await.unwrap();
        assert_eq!(tracker.most_recent_published_id, Some(5));
    }

    #[tokio::test]
    async fn second_cycle_with_no_new_events_sends_nothing() {
        let fx = fixture();
        append_events(&fx.event_store, 3).await;

        assert_eq!(fx.publisher.publish_notifications().await.unwrap(), 3);
        assert_eq!(fx.publisher.publish_notifications().await.unwrap(), 0);
        assert_eq!(fx.message_bus.sent().await.len(), 3);
    }

    #[tokio::test]
    async fn empty_cycle_leaves_the_tracker_untouched() {
        let fx = fixture();

        assert_eq!(fx.publisher.publish_notifications().await.unwrap(), 0);
        assert_eq!(fx.tracker_store.advance_calls().await, 0);
    }

    #[tokio::test]
    async fn failed_cycle_does_not_advance_and_resends_everything() {
        let fx = fixture();
        append_events(&fx.event_store, 3).await;

        // First cycle dies on the third send.
        fx.message_bus.fail_after(2).await;
        let err = fx.publisher.publish_notifications().await.unwrap_err();
        assert!(matches!(err, NotificationPublishError::MessageBus(_)));

        let tracker = fx.tracker_store.tracker(STREAM).await.unwrap();
        assert_eq!(tracker.most_recent_published_id, None);

        // Next cycle must include 1, 2 and 3 again, never start from 4.
        let sent = fx.publisher.publish_notifications().await.unwrap();
        assert_eq!(sent, 3);
        let redelivered: Vec<i64> = fx.message_bus.sent().await[2..]
            .iter()
            .map(|m| m.headers.message_id.parse().unwrap())
            .collect();
        assert_eq!(redelivered, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn watermark_is_monotonic_across_cycles() {
        let fx = fixture();

        append_events(&fx.event_store, 2).await;
        fx.publisher.publish_notifications().await.unwrap();
        let first = fx.tracker_store.tracker(STREAM).await.unwrap();
        assert_eq!(first.most_recent_published_id, Some(2));

        append_events(&fx.event_store, 3).await;
        fx.publisher.publish_notifications().await.unwrap();
        let second = fx.tracker_store.tracker(STREAM).await.unwrap();
        assert_eq!(second.most_recent_published_id, Some(5));
        assert!(second.concurrency_version > first.concurrency_version);
    }

    #[tokio::test]
    async fn resumes_from_an_existing_watermark() {
        let fx = fixture();
        append_events(&fx.event_store, 5).await;

        let since = fx.event_store.all_since(Some(2)).await.unwrap();
        let ids: Vec<i64> = since.iter().map(|e| e.event_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);

        fx.publisher.publish_notifications().await.unwrap();
        assert_eq!(
            fx.tracker_store
                .tracker(STREAM)
                .await
                .unwrap()
                .most_recent_published_id,
            Some(5)
        );
        assert_eq!(fx.publisher.publish_notifications().await.unwrap(), 0);
        assert!(fx.event_store.all_since(Some(5)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_advance_from_a_stale_base_is_a_conflict() {
        let fx = fixture();
        append_events(&fx.event_store, 2).await;

        let stale = fx.tracker_store.tracker(STREAM).await.unwrap();
        fx.publisher.publish_notifications().await.unwrap();

        let err = fx
            .tracker_store
            .advance(&stale, Some(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::ConcurrencyConflict { .. }));
    }

    #[tokio::test]
    async fn routing_key_and_body_come_from_the_stored_event() {
        let fx = fixture();
        fx.event_store
            .append(&SampleEvent::named("solo"))
            .await
            .unwrap();

        fx.publisher.publish_notifications().await.unwrap();

        let messages = fx.message_bus.sent().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].routing_key, "faro.testing.sample");
        assert_eq!(messages[0].headers.type_name, "faro.testing.sample");
        assert!(messages[0].body.contains("\"name\":\"solo\""));
        assert_eq!(messages[0].exchange, "faro.events");
    }
}
