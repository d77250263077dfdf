//! In-memory test doubles for the publication pipeline seams.
//!
//! Used by unit tests across the workspace; none of these touch a real
//! datastore or broker.

use crate::event::{DomainEvent, SerializationError, StoredEvent, datetime_format, serialize_event};
use crate::message_bus::{Exchange, MessageBus, MessageBusError, MessageChannel, MessageHeaders};
use crate::store::{EventStore, EventStoreError};
use crate::tracker::{PublishedNotificationTracker, PublishedNotificationTrackerStore, TrackerError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Minimal concrete event for tests.
#[derive(Debug, Clone, Serialize)]
pub struct SampleEvent {
    pub name: String,
    #[serde(with = "datetime_format")]
    pub occurred_on: DateTime<Utc>,
}

impl SampleEvent {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            occurred_on: Utc::now(),
        }
    }
}

impl DomainEvent for SampleEvent {
    fn type_name(&self) -> &str {
        "faro.testing.sample"
    }

    fn occurred_on(&self) -> DateTime<Utc> {
        self.occurred_on
    }

    fn payload(&self) -> Result<Value, SerializationError> {
        Ok(serde_json::to_value(self)?)
    }
}

/// In-memory event log assigning sequential ids on append.
#[derive(Default)]
pub struct InMemoryEventStore {
    state: Mutex<InMemoryEventStoreState>,
}

#[derive(Default)]
struct InMemoryEventStoreState {
    next_id: i64,
    events: Vec<StoredEvent>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event, assigning the next sequence id.
    pub async fn append(&self, event: &dyn DomainEvent) -> Result<StoredEvent, EventStoreError> {
        let body = serialize_event(event)?;
        let mut state = self.state.lock().await;
        state.next_id += 1;
        let stored = StoredEvent::new(state.next_id, event.type_name(), event.occurred_on(), body);
        state.events.push(stored.clone());
        Ok(stored)
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn all_since(&self, id: Option<i64>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let state = self.state.lock().await;
        let floor = id.unwrap_or(0);
        Ok(state
            .events
            .iter()
            .filter(|e| e.event_id > floor)
            .cloned()
            .collect())
    }

    async fn all_between(&self, low: i64, high: i64) -> Result<Vec<StoredEvent>, EventStoreError> {
        let state = self.state.lock().await;
        Ok(state
            .events
            .iter()
            .filter(|e| e.event_id >= low && e.event_id <= high)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        Ok(self.state.lock().await.events.len() as u64)
    }
}

/// In-memory tracker store with the same optimistic-concurrency semantics
/// as the Postgres implementation.
#[derive(Default)]
pub struct InMemoryTrackerStore {
    state: Mutex<InMemoryTrackerState>,
}

#[derive(Default)]
struct InMemoryTrackerState {
    rows: HashMap<String, PublishedNotificationTracker>,
    advance_calls: u64,
}

impl InMemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `advance` invocations observed.
    pub async fn advance_calls(&self) -> u64 {
        self.state.lock().await.advance_calls
    }
}

#[async_trait]
impl PublishedNotificationTrackerStore for InMemoryTrackerStore {
    async fn tracker(
        &self,
        stream_id: &str,
    ) -> Result<PublishedNotificationTracker, TrackerError> {
        let state = self.state.lock().await;
        Ok(state
            .rows
            .get(stream_id)
            .cloned()
            .unwrap_or_else(|| PublishedNotificationTracker::new(stream_id)))
    }

    async fn advance(
        &self,
        tracker: &PublishedNotificationTracker,
        last_published_id: Option<i64>,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.lock().await;
        state.advance_calls += 1;

        let Some(last_published_id) = last_published_id else {
            return Ok(());
        };

        let current_version = state
            .rows
            .get(&tracker.stream_id)
            .map(|row| row.concurrency_version)
            .unwrap_or(0);
        if current_version != tracker.concurrency_version {
            return Err(TrackerError::ConcurrencyConflict {
                stream_id: tracker.stream_id.clone(),
            });
        }

        state.rows.insert(
            tracker.stream_id.clone(),
            PublishedNotificationTracker {
                stream_id: tracker.stream_id.clone(),
                most_recent_published_id: Some(last_published_id),
                concurrency_version: current_version + 1,
            },
        );
        Ok(())
    }
}

/// A message captured by [`InMemoryMessageBus`].
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub exchange: String,
    pub routing_key: String,
    pub body: String,
    pub headers: MessageHeaders,
}

#[derive(Default)]
struct InMemoryBusState {
    sent: Vec<SentMessage>,
    fail_after: Option<usize>,
}

/// In-memory broker recording every sent message.
///
/// `fail_after(n)` makes every send past the first `n` fail, for exercising
/// mid-cycle abort behavior.
#[derive(Default)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<InMemoryBusState>>,
}

impl InMemoryMessageBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().await.sent.clone()
    }

    pub async fn fail_after(&self, successful_sends: usize) {
        let mut state = self.state.lock().await;
        let floor = state.sent.len() + successful_sends;
        state.fail_after = Some(floor);
    }
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn open(&self, exchange: &Exchange) -> Result<Box<dyn MessageChannel>, MessageBusError> {
        Ok(Box::new(InMemoryChannel {
            exchange: exchange.name().to_string(),
            state: self.state.clone(),
        }))
    }
}

struct InMemoryChannel {
    exchange: String,
    state: Arc<Mutex<InMemoryBusState>>,
}

#[async_trait]
impl MessageChannel for InMemoryChannel {
    async fn send(
        &self,
        routing_key: &str,
        body: &str,
        headers: &MessageHeaders,
    ) -> Result<(), MessageBusError> {
        let mut state = self.state.lock().await;
        if let Some(floor) = state.fail_after {
            if state.sent.len() >= floor {
                state.fail_after = None;
                return Err(MessageBusError::Publish("injected send failure".into()));
            }
        }
        state.sent.push(SentMessage {
            exchange: self.exchange.clone(),
            routing_key: routing_key.to_string(),
            body: body.to_string(),
            headers: headers.clone(),
        });
        Ok(())
    }
}
