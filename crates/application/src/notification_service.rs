//! Application entry point for the publication cycle.

use faro_domain::publisher::{NotificationPublishError, NotificationPublisher};
use std::sync::Arc;
use tracing::{info, instrument};

/// Thin application service the scheduler invokes to run one publication
/// cycle. Retry policy lives with the scheduler: a failed cycle simply runs
/// again later from the last committed watermark.
pub struct NotificationService {
    publisher: Arc<NotificationPublisher>,
}

impl NotificationService {
    pub fn new(publisher: Arc<NotificationPublisher>) -> Self {
        Self { publisher }
    }

    /// Publishes the unpublished backlog; returns how many notifications
    /// were sent.
    #[instrument(skip(self))]
    pub async fn publish_notifications(&self) -> Result<usize, NotificationPublishError> {
        let sent = self.publisher.publish_notifications().await?;
        if sent > 0 {
            info!(sent, stream_id = %self.publisher.stream_id(), "Notification cycle complete");
        }
        Ok(sent)
    }
}
