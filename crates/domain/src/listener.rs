//! Inbound message dispatch.
//!
//! Listeners declare the exchange and event types they consume; the
//! registry resolves `(exchange, type)` to a listener at registration time,
//! so dispatch is a table lookup on a stable type identifier rather than a
//! scan over candidates.

use std::collections::HashMap;
use std::sync::Arc;

/// Error type for listener registration and dispatch.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("A listener is already registered for {type_name} on exchange {exchange}")]
    DuplicateBinding { exchange: String, type_name: String },

    #[error("Failed to handle message of type {type_name}: {message}")]
    Dispatch { type_name: String, message: String },
}

/// A consumer of externally delivered notifications.
pub trait MessageListener: Send + Sync {
    /// Exchange this listener binds to.
    fn exchange_name(&self) -> &str;

    /// Event type names this listener consumes.
    fn listens_to(&self) -> &[&str];

    /// Handles one delivered message body.
    ///
    /// Returning an error leaves the message unacknowledged, so the broker
    /// redelivers it (consumers must be idempotent on the message id).
    fn dispatch(&self, type_name: &str, body: &str) -> Result<(), ListenerError>;
}

/// One `(exchange, type)` binding of a registered listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerBinding {
    pub exchange: String,
    pub type_name: String,
}

/// Dispatch table over registered listeners, keyed by exchange and type.
#[derive(Default)]
pub struct ListenerRegistry {
    by_binding: HashMap<ListenerBinding, Arc<dyn MessageListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every `(exchange, type)` binding the listener declares.
    ///
    /// A second listener for an already-bound pair is rejected; bindings are
    /// resolved once here, never re-derived during dispatch.
    pub fn register(&mut self, listener: Arc<dyn MessageListener>) -> Result<(), ListenerError> {
        let exchange = listener.exchange_name().to_string();
        for type_name in listener.listens_to() {
            let binding = ListenerBinding {
                exchange: exchange.clone(),
                type_name: type_name.to_string(),
            };
            if self.by_binding.contains_key(&binding) {
                return Err(ListenerError::DuplicateBinding {
                    exchange: binding.exchange,
                    type_name: binding.type_name,
                });
            }
            self.by_binding.insert(binding, listener.clone());
        }
        Ok(())
    }

    pub fn resolve(&self, exchange: &str, type_name: &str) -> Option<&Arc<dyn MessageListener>> {
        self.by_binding.get(&ListenerBinding {
            exchange: exchange.to_string(),
            type_name: type_name.to_string(),
        })
    }

    pub fn bindings(&self) -> impl Iterator<Item = &ListenerBinding> {
        self.by_binding.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.by_binding.is_empty()
    }
}
