//! NATS JetStream implementation of the broker seam.
//!
//! Exchanges map onto JetStream streams and subject hierarchies:
//! - stream name: `{prefix}_{exchange}` (dots folded to underscores)
//! - message subject: `{exchange}.{routing_key}`
//! - durability flag: File vs Memory storage for the backing stream
//!
//! Routing kinds differ only on the consumer side: a direct binding
//! filters on the exact `{exchange}.{type}` subject, a topic binding on a
//! wildcard pattern, and fanout/headers bindings on `{exchange}.>` (headers
//! routing is resolved from the `type` header at dispatch).

use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_nats::jetstream::Context as JetStreamContext;
use async_nats::{ConnectOptions, HeaderMap};
use async_trait::async_trait;
use faro_domain::message_bus::{
    Exchange, ExchangeKind, MessageBus, MessageBusError, MessageChannel, MessageHeaders,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// NATS connection configuration with production defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// NATS server URLs
    #[serde(default = "default_urls")]
    pub urls: Vec<String>,
    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connection_timeout_secs: u64,
    /// Client connection name
    #[serde(default)]
    pub name: Option<String>,
    /// Prefix for JetStream stream names
    #[serde(default = "default_stream_prefix")]
    pub stream_prefix: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            urls: default_urls(),
            connection_timeout_secs: default_connect_timeout(),
            name: None,
            stream_prefix: default_stream_prefix(),
        }
    }
}

fn default_urls() -> Vec<String> {
    vec!["nats://localhost:4222".to_string()]
}

const fn default_connect_timeout() -> u64 {
    5
}

fn default_stream_prefix() -> String {
    "FARO".to_string()
}

impl NatsConfig {
    /// Default settings for local development
    pub fn for_local() -> Self {
        Self::default()
    }
}

/// Replaces characters that are meaningful in NATS subjects.
fn sanitize_token(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            ' ' | '*' | '>' => '_',
            other => other,
        })
        .collect()
}

/// Subject a message with `routing_key` is published to on `exchange`.
pub fn subject_for(exchange: &Exchange, routing_key: &str) -> String {
    format!(
        "{}.{}",
        sanitize_token(exchange.name()),
        sanitize_token(routing_key)
    )
}

/// Subject filter a consumer binding uses for `pattern` on `exchange`.
///
/// Topic patterns use the broker vocabulary: `*` matches one token and `#`
/// the remainder.
pub fn binding_subject(exchange: &Exchange, pattern: &str) -> String {
    let name = sanitize_token(exchange.name());
    match exchange.kind() {
        ExchangeKind::Direct => format!("{}.{}", name, sanitize_token(pattern)),
        ExchangeKind::Topic => {
            let translated = pattern
                .split('.')
                .map(|segment| match segment {
                    "#" => ">",
                    other => other,
                })
                .collect::<Vec<_>>()
                .join(".");
            format!("{}.{}", name, translated)
        }
        ExchangeKind::Fanout | ExchangeKind::Headers => format!("{}.>", name),
    }
}

/// Stream name backing `exchange` under `prefix`.
pub fn stream_name(prefix: &str, exchange: &Exchange) -> String {
    format!("{}_{}", prefix, exchange.name().replace('.', "_"))
}

/// JetStream-backed [`MessageBus`].
pub struct NatsMessageBus {
    jetstream: JetStreamContext,
    stream_prefix: String,
}

impl NatsMessageBus {
    /// Connects to NATS and initializes the JetStream context.
    pub async fn connect(config: &NatsConfig) -> Result<Self, MessageBusError> {
        let mut options = ConnectOptions::new()
            .connection_timeout(Duration::from_secs(config.connection_timeout_secs));
        if let Some(name) = &config.name {
            options = options.name(name);
        }

        let client = options
            .connect(config.urls.join(","))
            .await
            .map_err(|e| MessageBusError::Connection(e.to_string()))?;

        info!(urls = ?config.urls, "Connected to NATS");

        Ok(Self {
            jetstream: async_nats::jetstream::new(client),
            stream_prefix: config.stream_prefix.clone(),
        })
    }

    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Ensures the stream backing `exchange` exists.
    pub async fn declare(&self, exchange: &Exchange) -> Result<(), MessageBusError> {
        let name = stream_name(&self.stream_prefix, exchange);

        if self.jetstream.get_stream(&name).await.is_ok() {
            debug!(stream = %name, "Stream already exists");
            return Ok(());
        }

        info!(stream = %name, exchange = exchange.name(), "Creating stream");
        let stream_config = StreamConfig {
            name,
            subjects: vec![format!("{}.>", sanitize_token(exchange.name()))],
            retention: RetentionPolicy::Limits,
            storage: if exchange.is_durable() {
                StorageType::File
            } else {
                StorageType::Memory
            },
            num_replicas: 1,
            ..Default::default()
        };

        self.jetstream
            .create_stream(stream_config)
            .await
            .map_err(|e| MessageBusError::Declaration(e.to_string()))?;

        Ok(())
    }

    pub fn stream_prefix(&self) -> &str {
        &self.stream_prefix
    }
}

#[async_trait]
impl MessageBus for NatsMessageBus {
    async fn open(&self, exchange: &Exchange) -> Result<Box<dyn MessageChannel>, MessageBusError> {
        self.declare(exchange).await?;
        Ok(Box::new(NatsMessageChannel {
            jetstream: self.jetstream.clone(),
            exchange: exchange.clone(),
        }))
    }
}

/// Channel scoped to one declared exchange.
struct NatsMessageChannel {
    jetstream: JetStreamContext,
    exchange: Exchange,
}

/// Builds the NATS header map for a notification.
pub fn header_map(headers: &MessageHeaders) -> HeaderMap {
    let mut map = HeaderMap::new();
    map.insert("message_id", headers.message_id.as_str());
    map.insert("timestamp", headers.timestamp.to_string().as_str());
    map.insert("type", headers.type_name.as_str());
    map.insert("content-type", "application/json");
    map
}

#[async_trait]
impl MessageChannel for NatsMessageChannel {
    /// Publishes one message and waits for the JetStream ack, so a
    /// successful return means the broker has accepted the message.
    #[instrument(skip(self, body, headers), fields(exchange = self.exchange.name()))]
    async fn send(
        &self,
        routing_key: &str,
        body: &str,
        headers: &MessageHeaders,
    ) -> Result<(), MessageBusError> {
        let subject = subject_for(&self.exchange, routing_key);

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), header_map(headers), body.to_string().into())
            .await
            .map_err(|e| MessageBusError::Publish(e.to_string()))?;

        ack.await
            .map_err(|e| MessageBusError::Publish(e.to_string()))?;

        debug!(subject = %subject, message_id = %headers.message_id, "Published notification");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_joins_exchange_and_routing_key() {
        let exchange = Exchange::direct("faro.events");
        assert_eq!(
            subject_for(&exchange, "order.placed"),
            "faro.events.order.placed"
        );
    }

    #[test]
    fn subject_tokens_are_sanitized() {
        let exchange = Exchange::direct("faro events");
        assert_eq!(
            subject_for(&exchange, "order placed>"),
            "faro_events.order_placed_"
        );
    }

    #[test]
    fn binding_subject_follows_the_exchange_kind() {
        assert_eq!(
            binding_subject(&Exchange::direct("faro.events"), "order.placed"),
            "faro.events.order.placed"
        );
        assert_eq!(
            binding_subject(&Exchange::topic("faro.events"), "order.*.#"),
            "faro.events.order.*.>"
        );
        assert_eq!(
            binding_subject(&Exchange::fanout("faro.events"), "ignored"),
            "faro.events.>"
        );
        assert_eq!(
            binding_subject(&Exchange::headers("faro.events"), "ignored"),
            "faro.events.>"
        );
    }

    #[test]
    fn stream_name_folds_dots() {
        assert_eq!(
            stream_name("FARO", &Exchange::direct("faro.events")),
            "FARO_faro_events"
        );
    }

    #[test]
    fn config_defaults_point_at_local_nats() {
        let config = NatsConfig::default();
        assert_eq!(config.urls, vec!["nats://localhost:4222".to_string()]);
        assert_eq!(config.connection_timeout_secs, 5);
        assert_eq!(config.stream_prefix, "FARO");
    }

    #[test]
    fn header_map_carries_the_notification_headers() {
        let map = header_map(&MessageHeaders {
            message_id: "7".to_string(),
            timestamp: 1262304000,
            type_name: "order.placed".to_string(),
        });

        assert_eq!(map.get("message_id").unwrap().as_str(), "7");
        assert_eq!(map.get("timestamp").unwrap().as_str(), "1262304000");
        assert_eq!(map.get("type").unwrap().as_str(), "order.placed");
        assert_eq!(map.get("content-type").unwrap().as_str(), "application/json");
    }
}
