// Faro - Application Layer
//
// Use-case orchestration over the domain seams:
// - transaction: unit-of-work executor (transaction + event capture scope)
// - notification_service: scheduler-facing publication entry point

pub mod notification_service;
pub mod transaction;

pub use notification_service::NotificationService;
pub use transaction::{
    PgTx, TransactionError, TransactionManager, TransactionResult, UnitOfWorkContext,
};
