//! PostgreSQL implementations of the event log and tracker store.

pub mod event_store;
pub mod tracker_store;

pub use event_store::PostgresEventStore;
pub use tracker_store::PostgresTrackerStore;
