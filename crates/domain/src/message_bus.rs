//! Broker-facing seam: exchanges, channels and message headers.
//!
//! The broker itself is an external system. This module defines the
//! interface the publication pipeline consumes; the NATS JetStream
//! implementation lives in the infrastructure crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type for broker interactions.
#[derive(Debug, thiserror::Error)]
pub enum MessageBusError {
    #[error("Failed to connect to broker: {0}")]
    Connection(String),

    #[error("Failed to declare exchange: {0}")]
    Declaration(String),

    #[error("Failed to publish message: {0}")]
    Publish(String),
}

/// Routing semantics of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExchangeKind {
    Direct,
    Fanout,
    Headers,
    Topic,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeKind::Direct => write!(f, "direct"),
            ExchangeKind::Fanout => write!(f, "fanout"),
            ExchangeKind::Headers => write!(f, "headers"),
            ExchangeKind::Topic => write!(f, "topic"),
        }
    }
}

/// Named exchange declaration: routing kind plus durability flag.
///
/// The per-kind constructors create durable exchanges; use
/// [`transient`](Self::transient) for in-memory-only ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    name: String,
    kind: ExchangeKind,
    durable: bool,
}

impl Exchange {
    pub fn direct(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Direct)
    }

    pub fn fanout(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Fanout)
    }

    pub fn headers(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Headers)
    }

    pub fn topic(name: impl Into<String>) -> Self {
        Self::new(name, ExchangeKind::Topic)
    }

    fn new(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
        }
    }

    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ExchangeKind {
        self.kind
    }

    pub fn is_durable(&self) -> bool {
        self.durable
    }
}

/// Headers attached to every published notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeaders {
    /// Stringified notification id.
    pub message_id: String,
    /// Seconds since epoch, taken from the notification's `occurred_on`.
    pub timestamp: i64,
    /// The notification's type name.
    pub type_name: String,
}

/// Connection-level broker interface.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Declares the exchange and opens a channel scoped to it.
    ///
    /// The publisher opens one channel per publication cycle and drops it on
    /// every exit path.
    async fn open(&self, exchange: &Exchange) -> Result<Box<dyn MessageChannel>, MessageBusError>;
}

/// Channel scoped to a declared exchange.
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Sends one message; returns only once the broker has acknowledged it.
    async fn send(
        &self,
        routing_key: &str,
        body: &str,
        headers: &MessageHeaders,
    ) -> Result<(), MessageBusError>;
}
