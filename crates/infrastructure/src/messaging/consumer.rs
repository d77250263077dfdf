//! NATS consumer worker for registered message listeners.
//!
//! For each `(exchange, type)` binding in the registry a durable pull
//! consumer is created on the exchange's stream, filtered to the binding
//! subject. A delivered message is dispatched to the resolved listener and
//! acknowledged only after a successful dispatch, so failures are
//! redelivered (at-least-once; listeners deduplicate on the message id).

use crate::messaging::nats::{NatsMessageBus, binding_subject, stream_name};
use async_nats::jetstream::consumer::pull::Config as PullConsumerConfig;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, PullConsumer};
use faro_domain::listener::ListenerRegistry;
use faro_domain::message_bus::{Exchange, MessageBusError};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Consumes listener bindings from NATS JetStream.
pub struct NatsListenerWorker {
    bus: Arc<NatsMessageBus>,
    registry: Arc<ListenerRegistry>,
}

impl NatsListenerWorker {
    pub fn new(bus: Arc<NatsMessageBus>, registry: Arc<ListenerRegistry>) -> Self {
        Self { bus, registry }
    }

    /// Declares one durable consumer per binding and spawns its delivery
    /// loop. Returns the spawned task handles.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, MessageBusError> {
        let mut handles = Vec::new();

        for binding in self.registry.bindings() {
            // Listener queues bind to direct exchanges, as declared by the
            // publisher side.
            let exchange = Exchange::direct(binding.exchange.clone());
            self.bus.declare(&exchange).await?;

            let consumer = self
                .create_consumer(&exchange, &binding.type_name)
                .await?;

            let registry = self.registry.clone();
            let exchange_name = binding.exchange.clone();
            let bound_type = binding.type_name.clone();
            handles.push(tokio::spawn(async move {
                Self::delivery_loop(consumer, registry, exchange_name, bound_type).await;
            }));
        }

        info!(consumers = handles.len(), "Listener worker started");
        Ok(handles)
    }

    async fn create_consumer(
        &self,
        exchange: &Exchange,
        type_name: &str,
    ) -> Result<PullConsumer, MessageBusError> {
        let stream = self
            .bus
            .jetstream()
            .get_stream(stream_name(self.bus.stream_prefix(), exchange))
            .await
            .map_err(|e| MessageBusError::Declaration(e.to_string()))?;

        let durable = format!(
            "{}-{}",
            exchange.name().replace('.', "-"),
            type_name.replace('.', "-")
        );
        let config = PullConsumerConfig {
            durable_name: Some(durable.clone()),
            filter_subject: binding_subject(exchange, type_name),
            deliver_policy: DeliverPolicy::All,
            ack_policy: AckPolicy::Explicit,
            ack_wait: Duration::from_secs(30),
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&durable, config)
            .await
            .map_err(|e| MessageBusError::Declaration(e.to_string()))?;

        debug!(consumer = %durable, "Consumer ready");
        Ok(consumer)
    }

    async fn delivery_loop(
        consumer: PullConsumer,
        registry: Arc<ListenerRegistry>,
        exchange: String,
        bound_type: String,
    ) {
        let mut messages = match consumer.messages().await {
            Ok(messages) => messages,
            Err(e) => {
                error!(exchange = %exchange, error = %e, "Failed to open consumer stream");
                return;
            }
        };

        while let Some(delivery) = messages.next().await {
            let message = match delivery {
                Ok(message) => message,
                Err(e) => {
                    warn!(exchange = %exchange, error = %e, "Delivery error");
                    continue;
                }
            };

            // The type header routes headers-bound listeners; direct and
            // topic bindings carry it too and it always wins over the
            // subject.
            let type_name = message
                .headers
                .as_ref()
                .and_then(|headers| headers.get("type"))
                .map(|value| value.as_str().to_string())
                .unwrap_or_else(|| bound_type.clone());

            if dispatch_payload(&registry, &exchange, &type_name, &message.payload) {
                if let Err(e) = message.ack().await {
                    warn!(exchange = %exchange, error = %e, "Failed to ack message");
                }
            }
        }
    }
}

/// Dispatches one delivered payload; returns whether the message should be
/// acknowledged. Undispatchable messages (no bound listener, invalid UTF-8,
/// failed dispatch) are left unacked so the broker redelivers them after
/// the ack wait.
fn dispatch_payload(
    registry: &ListenerRegistry,
    exchange: &str,
    type_name: &str,
    payload: &[u8],
) -> bool {
    let body = match std::str::from_utf8(payload) {
        Ok(body) => body,
        Err(e) => {
            warn!(exchange = %exchange, type_name = %type_name, error = %e, "Payload is not valid UTF-8, leaving unacked");
            return false;
        }
    };

    let Some(listener) = registry.resolve(exchange, type_name) else {
        warn!(exchange = %exchange, type_name = %type_name, "No listener bound, leaving unacked");
        return false;
    };

    match listener.dispatch(type_name, body) {
        Ok(()) => true,
        Err(e) => {
            warn!(exchange = %exchange, type_name = %type_name, error = %e, "Dispatch failed");
            false
        }
    }
}
