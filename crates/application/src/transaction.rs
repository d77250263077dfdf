//! Unit-of-work executor: one database transaction plus one event capture
//! scope per operation.
//!
//! A service operation runs inside a closure that receives a
//! [`UnitOfWorkContext`]. Business writes go through the context's
//! transaction; raised events are recorded on the context. On success the
//! captured events are appended to the durable event log inside the same
//! transaction before it commits, so event persistence is atomic with the
//! business-state change. On failure the transaction drops (rollback) and
//! the original error propagates untouched.
//!
//! This is the explicit composition replacing decorator-driven wrapping:
//! capture-begin/transaction-begin before the closure, capture-drain and
//! commit-or-rollback after it.

use faro_domain::collector::DomainEventCollector;
use faro_domain::shared_kernel::DomainError;
use faro_domain::store::EventStoreTx;
use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Error type for unit-of-work execution.
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction already completed")]
    AlreadyCompleted,

    #[error(transparent)]
    Domain(#[from] DomainError),
}

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Pool-backed transaction handle.
pub type PgTx = Transaction<'static, Postgres>;

/// Context handed to the unit-of-work closure: the ambient transaction and
/// the capture scope for events raised during the operation.
pub struct UnitOfWorkContext {
    tx: Option<PgTx>,
    collector: DomainEventCollector,
}

impl UnitOfWorkContext {
    fn new(tx: PgTx) -> Self {
        Self {
            tx: Some(tx),
            collector: DomainEventCollector::new(),
        }
    }

    /// The ambient transaction for business writes.
    pub fn tx(&mut self) -> TransactionResult<&mut PgTx> {
        self.tx.as_mut().ok_or(TransactionError::AlreadyCompleted)
    }

    /// Records a domain event raised by the operation.
    pub fn record(&self, event: Box<dyn faro_domain::event::DomainEvent>) {
        self.collector.record(event);
    }

    /// The capture scope itself, for code that threads the collector on.
    pub fn collector(&self) -> &DomainEventCollector {
        &self.collector
    }
}

/// Executes unit-of-work closures with transactional event capture.
#[derive(Clone)]
pub struct TransactionManager {
    pool: PgPool,
    event_store: Arc<dyn EventStoreTx>,
}

impl TransactionManager {
    pub fn new(pool: PgPool, event_store: Arc<dyn EventStoreTx>) -> Self {
        Self { pool, event_store }
    }

    /// Runs `operation` inside a fresh transaction and capture scope.
    ///
    /// On closure success the captured events are appended to the event log
    /// in emission order within the same transaction, then the transaction
    /// commits. Any failure - from the closure, an append, or the commit -
    /// leaves no stored event and no business-state change behind.
    #[instrument(skip(self, operation))]
    pub async fn execute<T, F>(&self, operation: F) -> TransactionResult<T>
    where
        F: for<'c> FnOnce(&'c mut UnitOfWorkContext) -> BoxFuture<'c, TransactionResult<T>>,
    {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| TransactionError::Database(e.to_string()))?;
        let mut ctx = UnitOfWorkContext::new(tx);

        match operation(&mut ctx).await {
            Ok(value) => {
                let events = ctx.collector.drain().map_err(DomainError::from)?;
                let mut tx = ctx.tx.take().ok_or(TransactionError::AlreadyCompleted)?;

                for event in &events {
                    self.event_store
                        .append_with_tx(&mut tx, event.as_ref())
                        .await
                        .map_err(DomainError::from)?;
                }

                tx.commit()
                    .await
                    .map_err(|e| TransactionError::Database(e.to_string()))?;

                debug!(appended = events.len(), "Unit of work committed");
                Ok(value)
            }
            // ctx.tx drops here, rolling the transaction back.
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // TransactionManager paths against a real database are covered by the
    // infrastructure crate's integration tests.

    #[test]
    fn database_error_display_keeps_the_cause() {
        let error = TransactionError::Database("connection refused".to_string());
        assert!(error.to_string().contains("connection refused"));
    }

    #[test]
    fn already_completed_display() {
        let error = TransactionError::AlreadyCompleted;
        assert_eq!(error.to_string(), "Transaction already completed");
    }

    #[test]
    fn domain_errors_pass_through_transparently() {
        let source = DomainError::InfrastructureError {
            message: "broker unreachable".to_string(),
        };
        let error = TransactionError::from(source);
        assert_eq!(error.to_string(), "Infrastructure error: broker unreachable");
    }
}
