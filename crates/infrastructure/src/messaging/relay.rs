//! Notification Relay
//!
//! Background scheduler that periodically invokes the publication cycle.
//! Cycle failures are transient: they are logged and the next tick retries
//! from the last committed watermark, so the relay itself never loops on a
//! failing cycle.

use faro_domain::publisher::NotificationPublisher;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, info, warn};

/// Configuration for the Notification Relay
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// How often to run a publication cycle
    pub poll_interval: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
        }
    }
}

/// Periodic driver of [`NotificationPublisher`] cycles.
pub struct NotificationRelay {
    publisher: Arc<NotificationPublisher>,
    config: RelayConfig,
}

impl NotificationRelay {
    pub fn new(publisher: Arc<NotificationPublisher>, config: RelayConfig) -> Self {
        Self { publisher, config }
    }

    /// Spawns the relay loop.
    pub fn start(self) -> JoinHandle<()> {
        info!(
            stream_id = %self.publisher.stream_id(),
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting notification relay"
        );

        tokio::spawn(async move {
            let mut ticker = interval(self.config.poll_interval);
            loop {
                ticker.tick().await;
                match self.publisher.publish_notifications().await {
                    Ok(0) => {}
                    Ok(sent) => debug!(sent, "Relay cycle published backlog"),
                    Err(e) => warn!(error = %e, "Relay cycle failed, will retry next tick"),
                }
            }
        })
    }
}
